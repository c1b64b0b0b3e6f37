use image::RgbImage;

use super::landmark::LandmarkSet;
use crate::error::EngineError;

/// Timestamp advance per `detect` call (~30 fps)
pub const TIMESTAMP_STEP_MS: u64 = 33;

/// Opaque pose inference capability.
///
/// `timestamp_ms` is strictly increasing across calls; engines with
/// temporal smoothing rely on it.
pub trait PoseEngine: Send {
    fn load(&mut self) -> Result<(), EngineError>;

    fn infer(
        &mut self,
        image: &RgbImage,
        timestamp_ms: u64,
    ) -> Result<Option<LandmarkSet>, EngineError>;

    fn name(&self) -> &str;
}

/// Pose detector wrapping an engine with a synthetic monotonic clock
pub struct PoseDetector {
    engine: Box<dyn PoseEngine>,
    timestamp_ms: u64,
    ready: bool,
}

impl PoseDetector {
    pub fn new(engine: Box<dyn PoseEngine>) -> Self {
        Self {
            engine,
            timestamp_ms: 0,
            ready: false,
        }
    }

    /// Load the engine. A failure here means no tracking at all.
    pub fn init(&mut self) -> Result<(), EngineError> {
        self.engine.load()?;
        self.ready = true;
        log::info!("[pose] engine ready: {}", self.engine.name());
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Detect landmarks. Engine failures are logged and reported as no detection.
    pub fn detect(&mut self, image: &RgbImage) -> Option<LandmarkSet> {
        self.timestamp_ms += TIMESTAMP_STEP_MS;

        if !self.ready {
            log::warn!("[pose] detect called before init");
            return None;
        }

        match self.engine.infer(image, self.timestamp_ms) {
            Ok(Some(set)) if !set.is_empty() => Some(set),
            Ok(_) => None,
            Err(e) => {
                log::error!("[pose] {e}");
                None
            }
        }
    }
}

/// Engine used when the binary was built without an inference backend
pub struct UnavailableEngine {
    reason: String,
}

impl UnavailableEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PoseEngine for UnavailableEngine {
    fn load(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Unavailable(self.reason.clone()))
    }

    fn infer(&mut self, _: &RgbImage, _: u64) -> Result<Option<LandmarkSet>, EngineError> {
        Err(EngineError::NotInitialised)
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pose::landmark::Landmark;
    use std::sync::{Arc, Mutex};

    /// Engine replaying a fixed answer and recording timestamps
    pub(crate) struct FakeEngine {
        pub answer: Option<LandmarkSet>,
        pub fail_load: bool,
        pub fail_infer: bool,
        pub panic_once: bool,
        pub timestamps: Arc<Mutex<Vec<u64>>>,
    }

    impl FakeEngine {
        pub(crate) fn returning(answer: Option<LandmarkSet>) -> Self {
            Self {
                answer,
                fail_load: false,
                fail_infer: false,
                panic_once: false,
                timestamps: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl PoseEngine for FakeEngine {
        fn load(&mut self) -> Result<(), EngineError> {
            if self.fail_load {
                return Err(EngineError::Unavailable("no model".into()));
            }
            Ok(())
        }

        fn infer(&mut self, _: &RgbImage, ts: u64) -> Result<Option<LandmarkSet>, EngineError> {
            self.timestamps.lock().unwrap().push(ts);
            if std::mem::take(&mut self.panic_once) {
                panic!("engine failed once");
            }
            if self.fail_infer {
                return Err(EngineError::Inference("boom".into()));
            }
            Ok(self.answer.clone())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn one_landmark() -> LandmarkSet {
        LandmarkSet::new(vec![Landmark::new(0.5, 0.5)])
    }

    #[test]
    fn test_timestamp_advances_by_fixed_step() {
        let engine = FakeEngine::returning(Some(one_landmark()));
        let timestamps = engine.timestamps.clone();
        let mut detector = PoseDetector::new(Box::new(engine));
        detector.init().unwrap();

        let image = RgbImage::new(4, 4);
        for _ in 0..3 {
            detector.detect(&image);
        }
        assert_eq!(*timestamps.lock().unwrap(), vec![33, 66, 99]);
    }

    #[test]
    fn test_init_failure_is_reported() {
        let mut engine = FakeEngine::returning(None);
        engine.fail_load = true;
        let mut detector = PoseDetector::new(Box::new(engine));
        assert!(detector.init().is_err());
        assert!(!detector.is_ready());
    }

    #[test]
    fn test_unavailable_engine_fails_init() {
        let mut detector = PoseDetector::new(Box::new(UnavailableEngine::new("built without onnx")));
        assert!(matches!(detector.init(), Err(EngineError::Unavailable(_))));
    }

    #[test]
    fn test_engine_error_becomes_none() {
        let mut engine = FakeEngine::returning(Some(one_landmark()));
        engine.fail_infer = true;
        let mut detector = PoseDetector::new(Box::new(engine));
        detector.init().unwrap();
        assert!(detector.detect(&RgbImage::new(4, 4)).is_none());
    }

    #[test]
    fn test_empty_detection_becomes_none() {
        let engine = FakeEngine::returning(Some(LandmarkSet::default()));
        let mut detector = PoseDetector::new(Box::new(engine));
        detector.init().unwrap();
        assert!(detector.detect(&RgbImage::new(4, 4)).is_none());
    }

    #[test]
    fn test_detect_before_init_is_none() {
        let engine = FakeEngine::returning(Some(one_landmark()));
        let mut detector = PoseDetector::new(Box::new(engine));
        assert!(detector.detect(&RgbImage::new(4, 4)).is_none());
        assert_eq!(detector.timestamp_ms(), 33);
    }
}
