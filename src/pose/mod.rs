pub mod detector;
pub mod landmark;
#[cfg(feature = "onnx")]
pub mod ort_engine;

pub use detector::{PoseDetector, PoseEngine, UnavailableEngine, TIMESTAMP_STEP_MS};
pub use landmark::{Landmark, LandmarkIndex, LandmarkSet, WorldLandmark, LANDMARK_GATE, LANDMARK_NAMES};
#[cfg(feature = "onnx")]
pub use ort_engine::OrtPoseEngine;

use crate::config::PoseConfig;

/// The engine this build can offer
pub fn default_engine(config: &PoseConfig) -> Box<dyn PoseEngine> {
    #[cfg(feature = "onnx")]
    {
        Box::new(OrtPoseEngine::from_config(config))
    }
    #[cfg(not(feature = "onnx"))]
    {
        Box::new(UnavailableEngine::new(format!(
            "built without the `onnx` feature, cannot load {}",
            config.model
        )))
    }
}
