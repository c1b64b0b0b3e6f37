use std::sync::{Arc, Mutex};

use async_tungstenite::tungstenite::Message;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::backoff::{Backoff, RetryPolicy};
use super::connection::{Running, Session, WsStream};
use super::endpoint::candidate_urls;
use super::latest::{LatestCell, PublishGate, PUBLISH_INTERVAL};
use super::state::TransportState;
use crate::config::DashboardConfig;
use crate::error::TransportError;
use crate::packet::RemoteFrame;

/// Slow-path snapshot for status displays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerStatus {
    pub connected: bool,
    pub frames_received: u64,
    pub joint_count: usize,
    pub device: Option<String>,
    pub active_url: Option<String>,
}

struct Tally {
    status: ConsumerStatus,
    gate: PublishGate,
    // Counts changed since the last publish
    dirty: bool,
}

impl Tally {
    fn publish(&mut self, to: &watch::Sender<ConsumerStatus>, now: Instant) {
        self.gate.mark(now);
        self.dirty = false;
        to.send_replace(self.status.clone());
    }
}

struct Shared {
    latest: LatestCell<RemoteFrame>,
    status: watch::Sender<ConsumerStatus>,
    tally: Mutex<Tally>,
}

impl Shared {
    fn new() -> Self {
        let (status, _) = watch::channel(ConsumerStatus::default());
        Self {
            latest: LatestCell::new(),
            status,
            tally: Mutex::new(Tally {
                status: ConsumerStatus::default(),
                gate: PublishGate::default(),
                dirty: false,
            }),
        }
    }

    fn on_open(&self, url: &str, now: Instant) {
        let mut tally = self.tally.lock().unwrap();
        tally.status.connected = true;
        tally.status.active_url = Some(url.to_string());
        tally.publish(&self.status, now);
    }

    fn on_close(&self, now: Instant) {
        let mut tally = self.tally.lock().unwrap();
        tally.status.connected = false;
        tally.status.active_url = None;
        tally.publish(&self.status, now);
    }

    /// Every frame lands in the latest cell; the status snapshot only
    /// moves when the publish gate opens.
    fn on_message(&self, text: &str, now: Instant) -> Result<(), serde_json::Error> {
        let frame: RemoteFrame = serde_json::from_str(text)?;

        let mut tally = self.tally.lock().unwrap();
        tally.status.frames_received += 1;
        tally.status.joint_count = frame.packet.joint_count();
        if !frame.packet.device.is_empty() {
            tally.status.device = Some(frame.packet.device.clone());
        }
        self.latest.store(frame);

        if tally.gate.ready(now) {
            tally.publish(&self.status, now);
        } else {
            tally.dirty = true;
        }
        Ok(())
    }

    /// Publish counts held back by the gate once the interval has passed,
    /// so a stream that goes quiet still shows its final numbers.
    fn flush(&self, now: Instant) {
        let mut tally = self.tally.lock().unwrap();
        if tally.dirty && tally.gate.ready(now) {
            tally.publish(&self.status, now);
        }
    }
}

struct ReceiveSession {
    shared: Arc<Shared>,
}

impl ReceiveSession {
    fn accept(&self, text: &str) {
        if let Err(e) = self.shared.on_message(text, Instant::now()) {
            log::warn!("[consumer] ignoring malformed frame: {e}");
        }
    }
}

impl Session for ReceiveSession {
    fn opened(&mut self, url: &str) {
        self.shared.on_open(url, Instant::now());
    }

    fn closed(&mut self) {
        self.shared.on_close(Instant::now());
    }

    async fn run(&mut self, mut ws: WsStream, cancel: &CancellationToken) -> Result<(), TransportError> {
        let mut flush = tokio::time::interval(PUBLISH_INTERVAL);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
                _ = flush.tick() => {
                    self.shared.flush(Instant::now());
                    continue;
                }
                msg = ws.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => self.accept(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.accept(text),
                    Err(e) => log::warn!("[consumer] binary frame is not utf-8: {e}"),
                },
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Receives remote frames, walking a candidate list with exponential backoff.
pub struct ConsumerClient {
    candidates: Vec<String>,
    policy: RetryPolicy,
    shared: Arc<Shared>,
    state: Arc<watch::Sender<TransportState>>,
    running: Mutex<Option<Running>>,
}

impl ConsumerClient {
    pub fn new(candidates: Vec<String>) -> Self {
        Self::with_policy(candidates, RetryPolicy::Exponential(Backoff::default()))
    }

    pub fn with_policy(candidates: Vec<String>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(TransportState::Idle);
        Self {
            candidates,
            policy,
            shared: Arc::new(Shared::new()),
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(candidate_urls(config))
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn start(&self) -> Result<(), TransportError> {
        if self.candidates.is_empty() {
            return Err(TransportError::NoCandidates);
        }
        let mut running = self.running.lock().unwrap();
        if running.as_ref().is_some_and(|r| !r.is_finished()) {
            return Ok(());
        }
        let session = ReceiveSession {
            shared: Arc::clone(&self.shared),
        };
        *running = Some(Running::spawn(
            "consumer",
            self.candidates.clone(),
            self.policy.clone(),
            Arc::clone(&self.state),
            session,
        ));
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(running) = self.running.lock().unwrap().take() {
            running.stop();
            self.shared.on_close(Instant::now());
        }
        self.state.send_replace(TransportState::Idle);
    }

    /// Like `stop`, but waits for the close handshake.
    pub async fn shutdown(&self) {
        let running = self.running.lock().unwrap().take();
        if let Some(running) = running {
            running.shutdown().await;
            self.shared.on_close(Instant::now());
        }
        self.state.send_replace(TransportState::Idle);
    }

    /// Newest frame, for per-tick rendering
    pub fn latest(&self) -> Option<Arc<RemoteFrame>> {
        self.shared.latest.get()
    }

    /// Throttled status snapshots
    pub fn subscribe(&self) -> watch::Receiver<ConsumerStatus> {
        self.shared.status.subscribe()
    }

    pub fn status(&self) -> ConsumerStatus {
        self.shared.status.borrow().clone()
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }
}

impl Drop for ConsumerClient {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().ok().and_then(|r| r.take()) {
            running.stop();
        }
    }
}
