use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;

use super::detector::PoseEngine;
use super::landmark::{Landmark, LandmarkIndex, LandmarkSet, WorldLandmark};
use crate::config::PoseConfig;
use crate::error::EngineError;

/// BlazePose landmark model input size
pub const BLAZEPOSE_INPUT_SIZE: u32 = 256;

/// The model emits 39 points; the last 6 are auxiliary ROI points.
const MODEL_POINTS: usize = 39;
const LANDMARK_STRIDE: usize = 5;
const WORLD_STRIDE: usize = 3;

/// BlazePose landmark model on ONNX Runtime
pub struct OrtPoseEngine {
    model_path: PathBuf,
    input_name: String,
    landmark_output: String,
    world_output: String,
    session: Option<Session>,
}

impl OrtPoseEngine {
    pub fn from_config(config: &PoseConfig) -> Self {
        Self {
            model_path: PathBuf::from(&config.model),
            input_name: config.input_name.clone(),
            landmark_output: config.landmark_output.clone(),
            world_output: config.world_output.clone(),
            session: None,
        }
    }
}

/// RGB image -> [1, 256, 256, 3] f32 tensor in 0.0-1.0
pub fn preprocess_for_blazepose(image: &RgbImage) -> Array4<f32> {
    let size = BLAZEPOSE_INPUT_SIZE;
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let mut tensor = Array4::<f32>::zeros((1, size as usize, size as usize, 3));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }

    tensor
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Decode the flat `[x, y, z, visibility, presence] * 39` landmark output
pub fn decode_landmarks(raw: &[f32]) -> Option<Vec<Landmark>> {
    if raw.len() < MODEL_POINTS * LANDMARK_STRIDE {
        return None;
    }
    let scale = BLAZEPOSE_INPUT_SIZE as f32;
    let landmarks = raw
        .chunks_exact(LANDMARK_STRIDE)
        .take(LandmarkIndex::COUNT)
        .map(|p| {
            Landmark::new(p[0] / scale, p[1] / scale)
                .with_z(p[2] / scale)
                .with_scores(sigmoid(p[3]), sigmoid(p[4]))
        })
        .collect();
    Some(landmarks)
}

pub fn decode_world(raw: &[f32]) -> Option<Vec<WorldLandmark>> {
    if raw.len() < MODEL_POINTS * WORLD_STRIDE {
        return None;
    }
    let world = raw
        .chunks_exact(WORLD_STRIDE)
        .take(LandmarkIndex::COUNT)
        .map(|p| WorldLandmark::new(p[0], p[1], p[2]))
        .collect();
    Some(world)
}

fn inference_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Inference(e.to_string())
}

impl PoseEngine for OrtPoseEngine {
    fn load(&mut self) -> Result<(), EngineError> {
        let path = self.model_path.display().to_string();
        let unavailable = |e: &dyn std::fmt::Display| EngineError::Unavailable(format!("{path}: {e}"));
        let session = Session::builder()
            .map_err(|e| unavailable(&e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| unavailable(&e))?
            .commit_from_file(&self.model_path)
            .map_err(|e| unavailable(&e))?;
        self.session = Some(session);
        Ok(())
    }

    fn infer(
        &mut self,
        image: &RgbImage,
        _timestamp_ms: u64,
    ) -> Result<Option<LandmarkSet>, EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NotInitialised)?;

        let input_tensor = Tensor::from_array(preprocess_for_blazepose(image)).map_err(inference_err)?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(inference_err)?;

        let raw: ndarray::ArrayViewD<f32> = outputs
            .get(self.landmark_output.as_str())
            .ok_or_else(|| {
                EngineError::Inference(format!("model has no output {}", self.landmark_output))
            })?
            .try_extract_array()
            .map_err(inference_err)?;
        let raw: Vec<f32> = raw.iter().copied().collect();
        let Some(landmarks) = decode_landmarks(&raw) else {
            return Err(EngineError::Inference(format!(
                "landmark output too short: {} values",
                raw.len()
            )));
        };

        let world = match outputs.get(self.world_output.as_str()) {
            Some(value) => {
                let world: ndarray::ArrayViewD<f32> =
                    value.try_extract_array().map_err(inference_err)?;
                decode_world(&world.iter().copied().collect::<Vec<_>>())
            }
            None => None,
        };

        let mut set = LandmarkSet::new(landmarks);
        set.world = world;
        Ok(Some(set))
    }

    fn name(&self) -> &str {
        "onnx-blazepose"
    }
}
