//! One-frame-in-flight orchestration: decode, detect, correlate depth,
//! build the packet, render and transmit.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::bridge::Bridge;
use crate::config::StreamConfig;
use crate::error::FrameError;
use crate::frame::Frame;
use crate::packet::{build_packet, depth_queries, now_seconds, FrameMeta, SkeletonPacket};
use crate::pose::PoseDetector;
use crate::render::PacketRenderer;
use crate::transport::PacketSink;

/// Wall time between diagnostic summaries
pub const DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Processing,
}

/// Counts accumulated over one diagnostics window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSummary {
    pub frames: u64,
    pub resolved_depths: usize,
    pub joints: usize,
}

#[derive(Debug, Default)]
struct FrameStats {
    window_start: Option<Instant>,
    frames: u64,
    resolved_depths: usize,
    joints: usize,
}

impl FrameStats {
    /// Returns a summary when the current window has run its course.
    fn record(&mut self, packet: &SkeletonPacket, now: Instant) -> Option<StatsSummary> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        self.resolved_depths = packet.resolved_depths();
        self.joints = packet.joint_count();

        if now.duration_since(start) < DIAGNOSTICS_INTERVAL {
            return None;
        }
        let summary = StatsSummary {
            frames: self.frames,
            resolved_depths: self.resolved_depths,
            joints: self.joints,
        };
        self.window_start = Some(now);
        self.frames = 0;
        Some(summary)
    }
}

struct Inner {
    bridge: Arc<Bridge>,
    detector: Mutex<PoseDetector>,
    stream: StreamConfig,
    renderer: Option<Arc<dyn PacketRenderer>>,
    sink: Arc<dyn PacketSink>,
    processing: AtomicBool,
    dropped: AtomicU64,
    stats: Mutex<FrameStats>,
}

/// Clears the busy flag when a pass ends, however it ends
struct InFlight(Arc<Inner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.processing.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct FramePipeline {
    inner: Arc<Inner>,
}

impl FramePipeline {
    /// `detector` must already be initialised.
    pub fn new(
        bridge: Arc<Bridge>,
        detector: PoseDetector,
        stream: StreamConfig,
        renderer: Option<Arc<dyn PacketRenderer>>,
        sink: Arc<dyn PacketSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                bridge,
                detector: Mutex::new(detector),
                stream,
                renderer,
                sink,
                processing: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
                stats: Mutex::new(FrameStats::default()),
            }),
        }
    }

    /// Become the bridge's frame handler.
    pub fn attach(&self) {
        // Weak: the bridge must not keep the pipeline alive
        let weak = Arc::downgrade(&self.inner);
        self.inner.bridge.on_frame(move |frame| {
            if let Some(inner) = weak.upgrade() {
                FramePipeline { inner }.submit(frame);
            }
        });
    }

    /// Start processing `frame` unless a pass is already running.
    /// Returns false when the frame was dropped.
    pub fn submit(&self, frame: Frame) -> bool {
        if self
            .inner
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!("[pipeline] busy, dropped frame {} ({dropped} total)", frame.id);
            return false;
        }

        let guard = InFlight(Arc::clone(&self.inner));
        tokio::spawn(async move {
            let id = frame.id.clone();
            match guard.0.process(frame).await {
                Ok(Some(_)) => {}
                Ok(None) => log::debug!("[pipeline] frame {id}: no pose"),
                Err(e) => log::warn!("[pipeline] {e}"),
            }
            drop(guard);
        });
        true
    }

    pub fn state(&self) -> PipelineState {
        if self.inner.processing.load(Ordering::Acquire) {
            PipelineState::Processing
        } else {
            PipelineState::Idle
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Inner {
    async fn process(&self, frame: Frame) -> Result<Option<SkeletonPacket>, FrameError> {
        let image = frame.decode()?;

        // A pass that panicked inside the engine must not take later frames with it
        let landmarks = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect(&image);
        let Some(landmarks) = landmarks else {
            return Ok(None);
        };

        let queries = depth_queries(&landmarks);
        let depths = if queries.is_empty() {
            Vec::new()
        } else {
            self.bridge.request_depth(frame.id.clone(), queries).await
        };

        let meta = FrameMeta {
            width: frame.width,
            height: frame.height,
            timestamp: now_seconds(),
        };
        let Some(packet) = build_packet(Some(&landmarks), &depths, &self.stream, meta) else {
            return Ok(None);
        };

        if let Some(renderer) = &self.renderer {
            renderer.render_packet(&packet);
        }
        self.sink.send(&packet);

        let summary = self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&packet, Instant::now());
        if let Some(s) = summary {
            log::info!(
                "[pipeline] {} frames in {}s, depths={} joints={}",
                s.frames,
                DIAGNOSTICS_INTERVAL.as_secs(),
                s.resolved_depths,
                s.joints
            );
        }
        Ok(Some(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::DEPTH_TIMEOUT;
    use crate::frame::tests::jpeg_bytes;
    use crate::packet::UNKNOWN_DISTANCE_CM;
    use crate::pose::detector::tests::FakeEngine;
    use crate::pose::{Landmark, LandmarkSet};
    use crate::protocol::{BridgeCommand, DepthSample, HostEvent};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    struct RecordingSink(mpsc::UnboundedSender<SkeletonPacket>);

    impl PacketSink for RecordingSink {
        fn send(&self, packet: &SkeletonPacket) {
            let _ = self.0.send(packet.clone());
        }
    }

    #[derive(Default)]
    struct CountingRenderer(AtomicUsize);

    impl PacketRenderer for CountingRenderer {
        fn render_packet(&self, _: &SkeletonPacket) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn shoulder_only() -> LandmarkSet {
        let mut landmarks = vec![Landmark::new(0.5, 0.5).with_scores(0.1, 0.1); 33];
        landmarks[11] = Landmark::new(0.4, 0.5).with_z(-0.2).with_scores(0.9, 0.9);
        LandmarkSet::new(landmarks)
    }

    fn jpeg_frame(id: &str) -> Frame {
        Frame::from_jpeg(id, &jpeg_bytes(64, 48), 64, 48)
    }

    struct Harness {
        pipeline: FramePipeline,
        bridge: Arc<Bridge>,
        commands: mpsc::UnboundedReceiver<BridgeCommand>,
        packets: mpsc::UnboundedReceiver<SkeletonPacket>,
        renderer: Arc<CountingRenderer>,
    }

    fn harness(answer: Option<LandmarkSet>) -> Harness {
        let (bridge, commands) = Bridge::new(DEPTH_TIMEOUT);
        let mut detector = PoseDetector::new(Box::new(FakeEngine::returning(answer)));
        detector.init().unwrap();
        let (tx, packets) = mpsc::unbounded_channel();
        let renderer = Arc::new(CountingRenderer::default());
        let pipeline = FramePipeline::new(
            Arc::clone(&bridge),
            detector,
            StreamConfig::default(),
            Some(renderer.clone() as Arc<dyn PacketRenderer>),
            Arc::new(RecordingSink(tx)),
        );
        Harness {
            pipeline,
            bridge,
            commands,
            packets,
            renderer,
        }
    }

    /// Host stand-in answering every depth request with 0.8 m
    fn answer_depth(bridge: Arc<Bridge>, mut commands: mpsc::UnboundedReceiver<BridgeCommand>) {
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                if let BridgeCommand::DepthRequest { frame_id, landmarks } = command {
                    let depths = landmarks
                        .iter()
                        .map(|q| DepthSample {
                            landmark_index: q.index,
                            depth_meters: 0.8,
                        })
                        .collect();
                    bridge.handle_event(HostEvent::DepthResponse { frame_id, depths });
                }
            }
        });
    }

    async fn wait_idle(pipeline: &FramePipeline) {
        while pipeline.state() == PipelineState::Processing {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_frame_to_packet_with_depth() {
        let Harness {
            pipeline,
            bridge,
            commands,
            mut packets,
            renderer,
        } = harness(Some(shoulder_only()));
        answer_depth(Arc::clone(&bridge), commands);
        pipeline.attach();

        bridge.handle_event(HostEvent::Frame {
            frame_id: "f-1".into(),
            image: jpeg_frame("f-1").payload,
            width: 64,
            height: 48,
        });

        let packet = packets.recv().await.unwrap();
        assert_eq!(packet.body_part_depths.len(), 1);
        let part = &packet.body_part_depths[0];
        assert_eq!(part.name, "LEFT_SHOULDER");
        assert!((part.distance_cm - 80.0).abs() < 1e-3);
        assert_eq!(packet.point_depths_m.len(), 1);
        assert_eq!(packet.camera_width, 64);

        wait_idle(&pipeline).await;
        assert_eq!(renderer.0.load(Ordering::Relaxed), 1);
        assert_eq!(bridge.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_host_gives_unknown_distance() {
        let mut h = harness(Some(shoulder_only()));
        let started = Instant::now();

        assert!(h.pipeline.submit(jpeg_frame("f-1")));
        let packet = h.packets.recv().await.unwrap();

        assert!(started.elapsed() >= DEPTH_TIMEOUT);
        assert_eq!(packet.body_part_depths[0].distance_cm, UNKNOWN_DISTANCE_CM);
        assert!(packet.point_depths_m.is_empty());
        // The request still went out
        assert!(matches!(
            h.commands.try_recv(),
            Ok(BridgeCommand::DepthRequest { .. })
        ));
        wait_idle(&h.pipeline).await;
        assert_eq!(h.bridge.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_pipeline_drops_frames() {
        let mut h = harness(Some(shoulder_only()));

        assert!(h.pipeline.submit(jpeg_frame("f-1")));
        assert_eq!(h.pipeline.state(), PipelineState::Processing);
        assert!(!h.pipeline.submit(jpeg_frame("f-2")));
        assert!(!h.pipeline.submit(jpeg_frame("f-3")));
        assert_eq!(h.pipeline.dropped_frames(), 2);

        let packet = h.packets.recv().await.unwrap();
        assert_eq!(packet.joint_count(), 1);
        wait_idle(&h.pipeline).await;

        // Accepting again once idle
        assert!(h.pipeline.submit(jpeg_frame("f-4")));
        h.packets.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_failure_returns_to_idle() {
        let mut h = harness(Some(shoulder_only()));

        assert!(h.pipeline.submit(Frame::new("bad", "%%%".into(), 64, 48)));
        wait_idle(&h.pipeline).await;

        assert!(h.packets.try_recv().is_err());
        assert!(h.commands.try_recv().is_err());
        assert!(h.pipeline.submit(jpeg_frame("next")));
    }

    #[tokio::test]
    async fn test_no_detection_sends_nothing() {
        let mut h = harness(None);

        assert!(h.pipeline.submit(jpeg_frame("f-1")));
        wait_idle(&h.pipeline).await;

        assert!(h.packets.try_recv().is_err());
        assert!(h.commands.try_recv().is_err());
        assert_eq!(h.renderer.0.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_all_landmarks_gated_skips_depth_request() {
        let gated_out = LandmarkSet::new(vec![Landmark::new(0.5, 0.5).with_scores(0.2, 0.9); 33]);
        let mut h = harness(Some(gated_out));

        assert!(h.pipeline.submit(jpeg_frame("f-1")));
        let packet = h.packets.recv().await.unwrap();
        assert_eq!(packet.joint_count(), 0);
        assert!(h.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_engine_panic_does_not_stall_later_frames() {
        let (bridge, commands) = Bridge::new(DEPTH_TIMEOUT);
        answer_depth(Arc::clone(&bridge), commands);
        let mut engine = FakeEngine::returning(Some(shoulder_only()));
        engine.panic_once = true;
        let mut detector = PoseDetector::new(Box::new(engine));
        detector.init().unwrap();
        let (tx, mut packets) = mpsc::unbounded_channel();
        let pipeline = FramePipeline::new(
            bridge,
            detector,
            StreamConfig::default(),
            None,
            Arc::new(RecordingSink(tx)),
        );

        assert!(pipeline.submit(jpeg_frame("f-0")));
        wait_idle(&pipeline).await;
        assert!(packets.try_recv().is_err());

        for id in ["f-1", "f-2"] {
            assert!(pipeline.submit(jpeg_frame(id)));
            let packet = packets.recv().await.unwrap();
            assert_eq!(packet.joint_count(), 1);
            wait_idle(&pipeline).await;
        }
    }

    #[test]
    fn test_stats_window() {
        let mut stats = FrameStats::default();
        let mut packet = SkeletonPacket::default();
        packet.joints.insert("nose".into(), [0.0; 3]);
        let t0 = Instant::now();

        assert!(stats.record(&packet, t0).is_none());
        assert!(stats.record(&packet, t0 + Duration::from_millis(900)).is_none());
        let summary = stats.record(&packet, t0 + Duration::from_millis(2000)).unwrap();
        assert_eq!(
            summary,
            StatsSummary {
                frames: 3,
                resolved_depths: 0,
                joints: 1
            }
        );
        assert!(stats.record(&packet, t0 + Duration::from_millis(2100)).is_none());
    }
}
