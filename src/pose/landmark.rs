/// Minimum visibility and presence for a landmark to be used
pub const LANDMARK_GATE: f32 = 0.5;

/// The 33 BlazePose landmark indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// Wire names, indexed by landmark index
pub const LANDMARK_NAMES: [&str; LandmarkIndex::COUNT] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

impl LandmarkIndex {
    pub const COUNT: usize = 33;

    pub const ALL: [LandmarkIndex; LandmarkIndex::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// snake_case wire name, e.g. "left_shoulder"
    pub fn name(self) -> &'static str {
        LANDMARK_NAMES[self as usize]
    }

    /// Upper-case label used in `body_part_depths`, e.g. "LEFT_SHOULDER"
    pub fn label(self) -> String {
        self.name().to_ascii_uppercase()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        LANDMARK_NAMES
            .iter()
            .position(|n| *n == name)
            .and_then(Self::from_index)
    }
}

/// One detected landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// Normalized X (0.0-1.0, may overshoot)
    pub x: f32,
    /// Normalized Y (0.0-1.0, may overshoot)
    pub y: f32,
    /// Depth relative to the hips, same scale as x
    pub z: Option<f32>,
    pub visibility: Option<f32>,
    pub presence: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility: None,
            presence: None,
        }
    }

    pub fn with_z(mut self, z: f32) -> Self {
        self.z = Some(z);
        self
    }

    pub fn with_scores(mut self, visibility: f32, presence: f32) -> Self {
        self.visibility = Some(visibility);
        self.presence = Some(presence);
        self
    }

    /// Missing scores count as fully confident.
    pub fn passes_gate(&self) -> bool {
        self.visibility.unwrap_or(1.0) >= LANDMARK_GATE
            && self.presence.unwrap_or(1.0) >= LANDMARK_GATE
    }

    /// (x, y) clamped into [0, 1]
    pub fn clamped(&self) -> (f32, f32) {
        (clamp_unit(self.x), clamp_unit(self.y))
    }

    /// Pixel coordinate of the clamped point, `x * (width - 1)`
    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        let (x, y) = self.clamped();
        (
            x * width.saturating_sub(1) as f32,
            y * height.saturating_sub(1) as f32,
        )
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Metric landmark relative to the hip center
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl WorldLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Detector output for one frame. Position in `landmarks` is the landmark index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    pub landmarks: Vec<Landmark>,
    pub world: Option<Vec<WorldLandmark>>,
}

impl LandmarkSet {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self {
            landmarks,
            world: None,
        }
    }

    pub fn with_world(mut self, world: Vec<WorldLandmark>) -> Self {
        self.world = Some(world);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Landmarks with a known index that pass the visibility/presence gate
    pub fn gated(&self) -> impl Iterator<Item = (LandmarkIndex, &Landmark)> + '_ {
        self.landmarks
            .iter()
            .enumerate()
            .filter_map(|(i, lm)| LandmarkIndex::from_index(i).map(|idx| (idx, lm)))
            .filter(|(_, lm)| lm.passes_gate())
    }

    pub fn world_for(&self, index: LandmarkIndex) -> Option<&WorldLandmark> {
        self.world.as_ref().and_then(|w| w.get(index.index()))
    }
}
