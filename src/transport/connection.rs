//! Websocket connect/retry loop shared by the send and receive clients.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_tungstenite::tokio::{connect_async, ConnectStream};
use async_tungstenite::WebSocketStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::backoff::RetryPolicy;
use super::state::TransportState;
use crate::error::TransportError;

pub type WsStream = WebSocketStream<ConnectStream>;

/// How long `shutdown` waits for a session's close handshake
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// What a client does with an open socket
pub(crate) trait Session: Send {
    /// Runs before the state flips to `Open`.
    fn opened(&mut self, _url: &str) {}

    /// Runs after the socket is gone, whatever the reason.
    fn closed(&mut self) {}

    /// Drive the socket until it closes or `cancel` fires.
    fn run(
        &mut self,
        ws: WsStream,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A spawned connection loop. Stopping cancels the pending retry timer; a
/// live session sends its close frame before the task ends.
pub(crate) struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Running {
    pub(crate) fn spawn<S>(
        name: &'static str,
        candidates: Vec<String>,
        policy: RetryPolicy,
        state: Arc<watch::Sender<TransportState>>,
        session: S,
    ) -> Self
    where
        S: Session + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reconnect_loop(
            name,
            candidates,
            policy,
            state,
            cancel.clone(),
            session,
        ));
        Self { cancel, handle }
    }

    /// Cancel without waiting; the task finishes its close handshake alone.
    pub(crate) fn stop(self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the loop to wind down, aborting it after
    /// `CLOSE_TIMEOUT`.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        let mut handle = self.handle;
        match tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[ws] connection task failed: {e}"),
            Err(_) => {
                log::warn!("[ws] close handshake timed out");
                handle.abort();
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Try each candidate in order; after a session ends or every candidate
/// failed, wait out the policy delay and start over.
pub(crate) async fn reconnect_loop<S: Session>(
    name: &'static str,
    candidates: Vec<String>,
    mut policy: RetryPolicy,
    state: Arc<watch::Sender<TransportState>>,
    cancel: CancellationToken,
    mut session: S,
) {
    'cycle: loop {
        for url in &candidates {
            state.send_replace(TransportState::Connecting);
            log::info!("[{name}] connecting to {url}...");

            let attempt = tokio::select! {
                _ = cancel.cancelled() => break 'cycle,
                attempt = connect_async(url.as_str()) => attempt,
            };

            match attempt {
                Ok((ws, _)) => {
                    policy.reset();
                    session.opened(url);
                    state.send_replace(TransportState::Open);
                    log::info!("[{name}] connected to {url}");

                    match session.run(ws, &cancel).await {
                        Ok(()) => log::info!("[{name}] connection to {url} closed"),
                        Err(e) => log::warn!("[{name}] session error: {e}"),
                    }
                    session.closed();
                    break;
                }
                Err(e) => log::warn!("[{name}] connection to {url} failed: {e}"),
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        let delay = policy.next_delay();
        state.send_replace(TransportState::ClosedPendingRetry);
        log::info!("[{name}] reconnecting in {}ms...", delay.as_millis());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    state.send_replace(TransportState::Idle);
    log::info!("[{name}] stopped");
}
