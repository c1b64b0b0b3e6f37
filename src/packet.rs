//! Canonical skeleton packet and its builder.
//!
//! Every key of `joints`, `keypoints_2d` and `point_depths_m` comes from the
//! 33-entry landmark table. Landmarks failing the visibility/presence gate
//! appear nowhere in the packet.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::StreamConfig;
use crate::pose::{LandmarkIndex, LandmarkSet};
use crate::protocol::{DepthQuery, DepthSample};

/// `distance_cm` when no depth was resolved
pub const UNKNOWN_DISTANCE_CM: f32 = -1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyPartDepth {
    /// Landmark index
    pub id: usize,
    /// Upper-case landmark name
    pub name: String,
    /// Pixel coordinates in the camera frame
    pub x: f32,
    pub y: f32,
    /// Relative depth from the pose engine
    pub z: f32,
    pub distance_cm: f32,
}

impl BodyPartDepth {
    pub fn has_distance(&self) -> bool {
        self.distance_cm >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SkeletonPacket {
    pub device: String,
    /// Seconds since the unix epoch
    pub timestamp: f64,
    pub exercise: String,
    pub depth_mode: String,
    pub joints: BTreeMap<String, [f32; 3]>,
    pub keypoints_2d: BTreeMap<String, [f32; 2]>,
    pub point_depths_m: BTreeMap<String, f32>,
    pub body_part_depths: Vec<BodyPartDepth>,
    pub camera_width: u32,
    pub camera_height: u32,
    // Reserved for other producer devices; always null from this pipeline
    pub camera_pose: Option<serde_json::Value>,
    pub camera_intrinsics: Option<serde_json::Value>,
    pub arm_head_distance: Option<serde_json::Value>,
    pub video_frame: Option<serde_json::Value>,
}

impl SkeletonPacket {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn resolved_depths(&self) -> usize {
        self.point_depths_m.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }
}

/// Packet as received by consumers, with the topology the server embeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RemoteFrame {
    #[serde(flatten)]
    pub packet: SkeletonPacket,
    #[serde(default)]
    pub skeleton: Vec<[usize; 2]>,
}

/// Per-frame facts the builder needs besides the detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
    pub timestamp: f64,
}

pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Depth queries for the gated landmarks, coordinates clamped
pub fn depth_queries(landmarks: &LandmarkSet) -> Vec<DepthQuery> {
    landmarks
        .gated()
        .map(|(index, lm)| {
            let (x, y) = lm.clamped();
            DepthQuery {
                index: index.index(),
                x,
                y,
            }
        })
        .collect()
}

/// Assemble the wire packet. `None` when there is no detection to report.
pub fn build_packet(
    landmarks: Option<&LandmarkSet>,
    depths: &[DepthSample],
    stream: &StreamConfig,
    meta: FrameMeta,
) -> Option<SkeletonPacket> {
    let landmarks = landmarks.filter(|set| !set.is_empty())?;

    // Malformed samples degrade to unknown depth
    let depth_by_index: HashMap<usize, f32> = depths
        .iter()
        .filter(|s| s.depth_meters.is_finite() && s.depth_meters >= 0.0)
        .map(|s| (s.landmark_index, s.depth_meters))
        .collect();

    let mut packet = SkeletonPacket {
        device: stream.device().to_string(),
        timestamp: meta.timestamp,
        exercise: stream.exercise.clone(),
        depth_mode: stream.depth_mode().to_string(),
        camera_width: meta.width,
        camera_height: meta.height,
        ..SkeletonPacket::default()
    };

    for (index, lm) in landmarks.gated() {
        let name = index.name().to_string();
        let (nx, ny) = lm.clamped();
        let (px, py) = lm.to_pixel(meta.width, meta.height);
        let z = lm.z.unwrap_or(0.0);
        let depth_m = depth_by_index.get(&index.index()).copied();

        let joint = match landmarks.world_for(index) {
            Some(w) => [w.x, w.y, w.z],
            None => [nx, ny, z],
        };

        packet.joints.insert(name.clone(), joint);
        packet.keypoints_2d.insert(name.clone(), [nx, ny]);
        if let Some(d) = depth_m {
            packet.point_depths_m.insert(name, d);
        }
        packet.body_part_depths.push(BodyPartDepth {
            id: index.index(),
            name: index.label(),
            x: px,
            y: py,
            z,
            distance_cm: depth_m.map(|d| d * 100.0).unwrap_or(UNKNOWN_DISTANCE_CM),
        });
    }

    Some(packet)
}

/// Landmark index named by a packet key
pub fn landmark_for_key(key: &str) -> Option<LandmarkIndex> {
    LandmarkIndex::from_name(key)
}
