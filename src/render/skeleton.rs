use crate::pose::LandmarkIndex as L;

/// Skeleton edges (start landmark, end landmark)
pub const POSE_CONNECTIONS: [(L, L); 35] = [
    // face
    (L::Nose, L::LeftEyeInner),
    (L::LeftEyeInner, L::LeftEye),
    (L::LeftEye, L::LeftEyeOuter),
    (L::LeftEyeOuter, L::LeftEar),
    (L::Nose, L::RightEyeInner),
    (L::RightEyeInner, L::RightEye),
    (L::RightEye, L::RightEyeOuter),
    (L::RightEyeOuter, L::RightEar),
    (L::MouthLeft, L::MouthRight),
    // upper body
    (L::LeftShoulder, L::RightShoulder),
    (L::LeftShoulder, L::LeftElbow),
    (L::LeftElbow, L::LeftWrist),
    (L::LeftWrist, L::LeftPinky),
    (L::LeftWrist, L::LeftIndex),
    (L::LeftWrist, L::LeftThumb),
    (L::LeftPinky, L::LeftIndex),
    (L::RightShoulder, L::RightElbow),
    (L::RightElbow, L::RightWrist),
    (L::RightWrist, L::RightPinky),
    (L::RightWrist, L::RightIndex),
    (L::RightWrist, L::RightThumb),
    (L::RightPinky, L::RightIndex),
    // torso
    (L::LeftShoulder, L::LeftHip),
    (L::RightShoulder, L::RightHip),
    (L::LeftHip, L::RightHip),
    // lower body
    (L::LeftHip, L::LeftKnee),
    (L::RightHip, L::RightKnee),
    (L::LeftKnee, L::LeftAnkle),
    (L::RightKnee, L::RightAnkle),
    (L::LeftAnkle, L::LeftHeel),
    (L::RightAnkle, L::RightHeel),
    (L::LeftHeel, L::LeftFootIndex),
    (L::RightHeel, L::RightFootIndex),
    (L::LeftAnkle, L::LeftFootIndex),
    (L::RightAnkle, L::RightFootIndex),
];

/// Topology as index pairs, the form remote frames carry
pub fn topology() -> Vec<[usize; 2]> {
    POSE_CONNECTIONS
        .iter()
        .map(|(a, b)| [a.index(), b.index()])
        .collect()
}

/// Joint with a resolved distance (RGB)
pub const JOINT_COLOR: u32 = 0x00FF00;

/// Bone lines (RGB)
pub const SKELETON_COLOR: u32 = 0xFFFF00;

/// Joint whose distance is unknown (RGB)
pub const UNKNOWN_DEPTH_COLOR: u32 = 0xFF0000;

pub const LABEL_COLOR: u32 = 0xFFFFFF;

pub const BACKGROUND_COLOR: u32 = 0x101010;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_indices_in_range() {
        let edges = topology();
        assert_eq!(edges.len(), 35);
        assert!(edges.iter().all(|[a, b]| *a < L::COUNT && *b < L::COUNT && a != b));
        assert!(edges.contains(&[11, 13]));
        assert!(edges.contains(&[28, 32]));
    }
}
