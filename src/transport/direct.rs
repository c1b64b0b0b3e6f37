use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_tungstenite::tungstenite::Message;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::backoff::RetryPolicy;
use super::connection::{Running, Session, WsStream};
use super::state::TransportState;
use super::PacketSink;
use crate::config::StreamConfig;
use crate::error::TransportError;
use crate::packet::SkeletonPacket;

/// Sends packets over its own websocket, retrying on a fixed delay.
///
/// Only the newest packet is kept; a slow socket skips stale ones.
pub struct DirectSocketTransport {
    url: String,
    retry_delay: Duration,
    outbox: watch::Sender<Option<String>>,
    state: Arc<watch::Sender<TransportState>>,
    running: Mutex<Option<Running>>,
}

impl DirectSocketTransport {
    pub fn new(url: impl Into<String>, retry_delay: Duration) -> Self {
        let (outbox, _) = watch::channel(None);
        let (state, _) = watch::channel(TransportState::Idle);
        Self {
            url: url.into(),
            retry_delay,
            outbox,
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    pub fn from_config(stream: &StreamConfig) -> Self {
        Self::new(
            stream.socket_url(),
            Duration::from_millis(stream.reconnect_delay_ms),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start the connection loop; no-op when already running.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap();
        if running.as_ref().is_some_and(|r| !r.is_finished()) {
            return;
        }
        let session = SendSession {
            outbox: self.outbox.subscribe(),
        };
        *running = Some(Running::spawn(
            "ws",
            vec![self.url.clone()],
            RetryPolicy::Fixed(self.retry_delay),
            Arc::clone(&self.state),
            session,
        ));
    }

    /// Close the socket and cancel any pending reconnect.
    pub fn stop(&self) {
        if let Some(running) = self.running.lock().unwrap().take() {
            running.stop();
        }
        self.state.send_replace(TransportState::Idle);
    }

    /// Like `stop`, but waits until the close frame went out.
    pub async fn shutdown(&self) {
        let running = self.running.lock().unwrap().take();
        if let Some(running) = running {
            running.shutdown().await;
        }
        self.state.send_replace(TransportState::Idle);
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }
}

impl PacketSink for DirectSocketTransport {
    fn send(&self, packet: &SkeletonPacket) {
        if !self.state().is_open() {
            log::debug!("[ws] not connected, packet dropped");
            return;
        }
        match packet.to_json() {
            Ok(payload) => {
                self.outbox.send_replace(Some(payload));
            }
            Err(e) => log::error!("[ws] failed to serialize packet: {e}"),
        }
    }
}

impl Drop for DirectSocketTransport {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().ok().and_then(|r| r.take()) {
            running.stop();
        }
    }
}

struct SendSession {
    outbox: watch::Receiver<Option<String>>,
}

impl Session for SendSession {
    fn opened(&mut self, _url: &str) {
        // Whatever was queued for a previous socket is stale now
        self.outbox.borrow_and_update();
    }

    async fn run(&mut self, ws: WsStream, cancel: &CancellationToken) -> Result<(), TransportError> {
        let (mut sink, mut incoming) = ws.split();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.close(None).await;
                    return Ok(());
                }
                changed = self.outbox.changed() => {
                    if changed.is_err() {
                        let _ = sink.close(None).await;
                        return Ok(());
                    }
                    let payload = self.outbox.borrow_and_update().clone();
                    if let Some(payload) = payload {
                        sink.send(Message::text(payload)).await?;
                    }
                }
                msg = incoming.next() => match msg {
                    None | Some(Ok(Message::Close(_))) => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }
}
