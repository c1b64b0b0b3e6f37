//! Capture host capability bridge.
//!
//! Frames arrive as events and go to the single registered handler. Depth
//! correlation is a request/response exchange keyed by frame id: each request
//! registers a resolver that fires exactly once, either with the host's
//! samples or with an empty list when the timeout wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::frame::Frame;
use crate::protocol::{BridgeCommand, ControlAction, DepthQuery, DepthSample, FrameId, HostEvent};

/// Depth correlation deadline
pub const DEPTH_TIMEOUT: Duration = Duration::from_millis(150);

pub type FrameHandler = Arc<dyn Fn(Frame) + Send + Sync>;

struct PendingDepth {
    seq: u64,
    resolver: oneshot::Sender<Vec<DepthSample>>,
}

/// Drops this request's correlation entry however the wait ends, unless a
/// newer request for the same frame owns the slot by then.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<FrameId, PendingDepth>>,
    frame_id: &'a str,
    seq: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.get(self.frame_id).is_some_and(|p| p.seq == self.seq) {
            pending.remove(self.frame_id);
        }
    }
}

pub struct Bridge {
    outbox: mpsc::UnboundedSender<BridgeCommand>,
    frame_handler: Mutex<Option<FrameHandler>>,
    pending: Mutex<HashMap<FrameId, PendingDepth>>,
    next_seq: AtomicU64,
    depth_timeout: Duration,
}

impl Bridge {
    /// Returns the bridge and the outbound command stream the host link drains.
    pub fn new(depth_timeout: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<BridgeCommand>) {
        let (outbox, commands) = mpsc::unbounded_channel();
        let bridge = Arc::new(Self {
            outbox,
            frame_handler: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            depth_timeout,
        });
        (bridge, commands)
    }

    pub fn depth_timeout(&self) -> Duration {
        self.depth_timeout
    }

    /// Register the frame consumer, replacing any previous one.
    pub fn on_frame<F>(&self, handler: F)
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        let replaced = self
            .frame_handler
            .lock()
            .unwrap()
            .replace(Arc::new(handler))
            .is_some();
        log::info!("[bridge] frame handler registered (replaced={replaced})");
    }

    /// Dispatch one message from the host.
    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::Frame {
                frame_id,
                image,
                width,
                height,
            } => {
                // Clone out so the handler runs without the lock held
                let handler = self.frame_handler.lock().unwrap().clone();
                match handler {
                    Some(handler) => handler(Frame::new(frame_id, image, width, height)),
                    None => log::debug!("[bridge] frame {frame_id} without handler, ignored"),
                }
            }
            HostEvent::DepthResponse { frame_id, depths } => {
                self.resolve_depth(&frame_id, depths);
            }
        }
    }

    /// Ask the host for depth at the given landmarks.
    ///
    /// Resolves with the host's samples, or with an empty list once the
    /// timeout elapses. The correlation entry is gone either way.
    pub async fn request_depth(
        &self,
        frame_id: FrameId,
        landmarks: Vec<DepthQuery>,
    ) -> Vec<DepthSample> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (resolver, response) = oneshot::channel();

        let superseded = self
            .pending
            .lock()
            .unwrap()
            .insert(frame_id.clone(), PendingDepth { seq, resolver })
            .is_some();
        if superseded {
            log::warn!("[bridge] depth request for {frame_id} superseded an earlier one");
        }

        let _guard = PendingGuard {
            pending: &self.pending,
            frame_id: &frame_id,
            seq,
        };

        log::info!(
            "[bridge] depth request {frame_id} ({} landmarks)",
            landmarks.len()
        );
        self.send(BridgeCommand::DepthRequest {
            frame_id: frame_id.clone(),
            landmarks,
        });

        match tokio::time::timeout(self.depth_timeout, response).await {
            Ok(Ok(samples)) => samples,
            // Resolver dropped: a newer request for the same frame replaced it
            Ok(Err(_)) => Vec::new(),
            Err(_) => {
                log::info!(
                    "[bridge] depth request {frame_id} timed out after {}ms",
                    self.depth_timeout.as_millis()
                );
                Vec::new()
            }
        }
    }

    fn resolve_depth(&self, frame_id: &str, samples: Vec<DepthSample>) {
        let entry = self.pending.lock().unwrap().remove(frame_id);
        match entry {
            Some(entry) => {
                log::info!("[bridge] depth response {frame_id} ({} samples)", samples.len());
                // Receiver gone means the request already gave up
                let _ = entry.resolver.send(samples);
            }
            None => log::info!("[bridge] stale depth response {frame_id}, ignored"),
        }
    }

    pub fn send_control(&self, action: ControlAction, value: Option<serde_json::Value>) {
        log::info!("[bridge] control {action:?}");
        self.send(BridgeCommand::Control { action, value });
    }

    pub fn send_packet(&self, payload: String) {
        self.send(BridgeCommand::Packet { payload });
    }

    /// Outstanding depth correlations
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    fn send(&self, command: BridgeCommand) {
        if self.outbox.send(command).is_err() {
            log::error!("[bridge] host link closed, command dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn query() -> Vec<DepthQuery> {
        vec![DepthQuery { index: 11, x: 0.4, y: 0.5 }]
    }

    fn sample(depth: f32) -> DepthSample {
        DepthSample { landmark_index: 11, depth_meters: depth }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_empty_and_clears_entry() {
        let (bridge, mut commands) = Bridge::new(DEPTH_TIMEOUT);

        let b = bridge.clone();
        let request = tokio::spawn(async move { b.request_depth("f1".into(), query()).await });

        // Host sees the request but answers only after 200ms
        let cmd = commands.recv().await.unwrap();
        assert!(matches!(cmd, BridgeCommand::DepthRequest { ref frame_id, .. } if frame_id == "f1"));
        assert_eq!(bridge.pending_requests(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let samples = request.await.unwrap();
        assert!(samples.is_empty());
        assert_eq!(bridge.pending_requests(), 0);

        // The late answer is a silent no-op
        bridge.handle_event(HostEvent::DepthResponse {
            frame_id: "f1".into(),
            depths: vec![sample(0.8)],
        });
        assert_eq!(bridge.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_before_timeout_wins() {
        let (bridge, mut commands) = Bridge::new(DEPTH_TIMEOUT);

        let b = bridge.clone();
        let request = tokio::spawn(async move { b.request_depth("f2".into(), query()).await });
        commands.recv().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        bridge.handle_event(HostEvent::DepthResponse {
            frame_id: "f2".into(),
            depths: vec![sample(0.8)],
        });

        let samples = request.await.unwrap();
        assert_eq!(samples, vec![sample(0.8)]);
        assert_eq!(bridge.pending_requests(), 0);

        // Past the original deadline nothing else fires
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(bridge.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_supersedes_first() {
        let (bridge, mut commands) = Bridge::new(DEPTH_TIMEOUT);

        let b1 = bridge.clone();
        let first = tokio::spawn(async move { b1.request_depth("f3".into(), query()).await });
        commands.recv().await.unwrap();

        let b2 = bridge.clone();
        let second = tokio::spawn(async move { b2.request_depth("f3".into(), query()).await });
        commands.recv().await.unwrap();

        assert!(first.await.unwrap().is_empty());
        assert_eq!(bridge.pending_requests(), 1);

        bridge.handle_event(HostEvent::DepthResponse {
            frame_id: "f3".into(),
            depths: vec![sample(1.25)],
        });
        assert_eq!(second.await.unwrap(), vec![sample(1.25)]);
        assert_eq!(bridge.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_request_clears_entry() {
        let (bridge, mut commands) = Bridge::new(DEPTH_TIMEOUT);

        let b = bridge.clone();
        let request = tokio::spawn(async move { b.request_depth("f4".into(), query()).await });
        commands.recv().await.unwrap();
        assert_eq!(bridge.pending_requests(), 1);

        // Caller gives up before either the host or the timeout answers
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());
        assert_eq!(bridge.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_request_leaves_newer_entry() {
        let (bridge, mut commands) = Bridge::new(DEPTH_TIMEOUT);

        let b1 = bridge.clone();
        let first = tokio::spawn(async move { b1.request_depth("f5".into(), query()).await });
        commands.recv().await.unwrap();
        let b2 = bridge.clone();
        let second = tokio::spawn(async move { b2.request_depth("f5".into(), query()).await });
        commands.recv().await.unwrap();

        // The first wait already ended; its guard must not touch the second entry
        assert!(first.await.unwrap().is_empty());
        assert_eq!(bridge.pending_requests(), 1);

        second.abort();
        let _ = second.await;
        assert_eq!(bridge.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_frame_handler_replacement() {
        let (bridge, _commands) = Bridge::new(DEPTH_TIMEOUT);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        bridge.on_frame(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = second.clone();
        bridge.on_frame(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        bridge.handle_event(HostEvent::Frame {
            frame_id: "f".into(),
            image: String::new(),
            width: 640,
            height: 480,
        });
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_control_and_packet_are_forwarded() {
        let (bridge, mut commands) = Bridge::new(DEPTH_TIMEOUT);
        bridge.send_control(ControlAction::Start, None);
        bridge.send_packet("{}".into());

        assert_eq!(
            commands.recv().await.unwrap(),
            BridgeCommand::Control { action: ControlAction::Start, value: None }
        );
        assert_eq!(
            commands.recv().await.unwrap(),
            BridgeCommand::Packet { payload: "{}".into() }
        );
    }

    #[tokio::test]
    async fn test_send_after_host_link_closed_does_not_panic() {
        let (bridge, commands) = Bridge::new(DEPTH_TIMEOUT);
        drop(commands);
        bridge.send_packet("{}".into());
        bridge.send_control(ControlAction::Stop, None);
    }
}
