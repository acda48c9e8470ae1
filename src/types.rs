use std::time::Instant;

use serde::Serialize;

pub const NUM_LANDMARKS: usize = 21;
pub const FEATURE_LEN: usize = NUM_LANDMARKS * 3;

/// Index of the wrist landmark, the normalization origin.
pub const WRIST: usize = 0;

/// One hand landmark in unit-range coordinates relative to the frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A full 21-point hand pose as produced by the detector.
///
/// Construction enforces the detector contract (exactly 21 landmarks or no
/// detection at all), so downstream consumers can index freely.
#[derive(Clone, Debug)]
pub struct HandPose {
    landmarks: [Landmark; NUM_LANDMARKS],
}

impl HandPose {
    pub fn new(landmarks: [Landmark; NUM_LANDMARKS]) -> Self {
        Self { landmarks }
    }

    pub fn from_slice(landmarks: &[Landmark]) -> Option<Self> {
        let landmarks: [Landmark; NUM_LANDMARKS] = landmarks.try_into().ok()?;
        Some(Self { landmarks })
    }

    pub fn wrist(&self) -> Landmark {
        self.landmarks[WRIST]
    }

    pub fn landmarks(&self) -> &[Landmark; NUM_LANDMARKS] {
        &self.landmarks
    }
}

/// Flattened wrist-relative coordinates, `[x0, y0, z0, ..., x20, y20, z20]`.
pub type FeatureVector = [f32; FEATURE_LEN];

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

/// Per-frame classification of a single reconstruction error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GripAssessment {
    pub is_correct: bool,
    pub confidence: f64,
}

/// The decision published for display: majority-vote correctness over the
/// smoothing window, with the most recent frame's confidence and raw error.
#[derive(Clone, Debug)]
pub struct FrameVerdict {
    pub is_correct: bool,
    pub confidence: f64,
    pub reconstruction_error: f64,
    pub timestamp: Instant,
}

/// Events on the published-decision stream.
#[derive(Clone, Debug)]
pub enum DecisionEvent {
    Verdict(FrameVerdict),
    /// No hand in the current frame; the displayed decision should clear.
    HandLost,
    /// The scheduler stopped; all displayed state should clear.
    Cleared,
}

/// Frozen result of one practice interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub elapsed_seconds: u64,
    pub correct_frames: u32,
    pub total_frames: u32,
}

impl SessionSummary {
    /// Percentage of correct frames, rounded to the nearest whole percent.
    /// Zero when no frames were recorded.
    pub fn correct_rate(&self) -> u8 {
        if self.total_frames == 0 {
            return 0;
        }
        (f64::from(self.correct_frames) * 100.0 / f64::from(self.total_frames)).round() as u8
    }
}

/// Record handed to the backend when a session stops.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeRecord {
    pub is_correct: bool,
    pub mse_score: f64,
    pub confidence: f64,
    pub duration_seconds: u32,
    pub correct_rate: u8,
}
