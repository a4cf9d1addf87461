//! Normalized landmark types and skeleton topology
//!
//! Landmarks are produced by the external inference engine in
//! [0,1]-normalized image space and are read-only to this crate.

use serde::{Deserialize, Serialize};

/// Confidence gate applied before drawing or publishing a landmark.
/// The boundary is inclusive: exactly 0.5 counts as confident.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// A single landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: Option<f32>,
    pub presence: Option<f32>,
}

impl NormalizedLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
            presence: None,
        }
    }

    pub fn with_confidence(x: f32, y: f32, z: f32, visibility: f32, presence: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: Some(visibility),
            presence: Some(presence),
        }
    }

    /// Effective confidence: the better of visibility and presence,
    /// missing scores count as zero
    pub fn confidence(&self) -> f32 {
        let visibility = self.visibility.unwrap_or(0.0);
        let presence = self.presence.unwrap_or(0.0);
        visibility.max(presence)
    }

    pub fn is_confident(&self) -> bool {
        self.confidence() >= CONFIDENCE_THRESHOLD
    }

    /// Wire representation used by the `pose` signaling message:
    /// `[x, y, z, visibility, presence]`
    pub fn to_wire(&self) -> [f32; 5] {
        [
            self.x,
            self.y,
            self.z,
            self.visibility.unwrap_or(0.0),
            self.presence.unwrap_or(0.0),
        ]
    }
}

/// Bone connections of the 33-point pose graph
pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (27, 29),
    (29, 31),
    (26, 28),
    (28, 30),
    (30, 32),
    (27, 31),
    (28, 32),
];

/// Bone connections of the 21-point hand graph
pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

/// Pose indices 0..=10 cover nose, eyes, ears and mouth; the label is
/// anchored to these.
pub const HEAD_LANDMARKS: &[usize] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

/// Which landmark graph a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkeletonKind {
    Pose,
    Face,
    Hand,
}

impl SkeletonKind {
    /// Bone connection index pairs; faces are drawn as points only
    pub fn connections(&self) -> &'static [(usize, usize)] {
        match self {
            SkeletonKind::Pose => POSE_CONNECTIONS,
            SkeletonKind::Face => &[],
            SkeletonKind::Hand => HAND_CONNECTIONS,
        }
    }

    /// Point radius in canvas pixels
    pub fn point_radius(&self) -> f32 {
        match self {
            SkeletonKind::Pose => 6.0,
            SkeletonKind::Face => 3.0,
            SkeletonKind::Hand => 7.0,
        }
    }
}

/// Overlay selection toggled by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Pose,
    PoseHand,
    Face,
    Hand,
}

impl RenderMode {
    pub fn kinds(&self) -> &'static [SkeletonKind] {
        match self {
            RenderMode::Pose => &[SkeletonKind::Pose],
            RenderMode::PoseHand => &[SkeletonKind::Pose, SkeletonKind::Hand],
            RenderMode::Face => &[SkeletonKind::Face],
            RenderMode::Hand => &[SkeletonKind::Hand],
        }
    }
}

impl std::str::FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pose" => Ok(RenderMode::Pose),
            "pose-hand" | "pose_hand" => Ok(RenderMode::PoseHand),
            "face" => Ok(RenderMode::Face),
            "hand" => Ok(RenderMode::Hand),
            _ => Err(format!("unknown render mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_max_of_scores() {
        let lm = NormalizedLandmark::with_confidence(0.5, 0.5, 0.0, 0.3, 0.7);
        assert_eq!(lm.confidence(), 0.7);
        let lm = NormalizedLandmark::new(0.5, 0.5, 0.0);
        assert_eq!(lm.confidence(), 0.0);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let at = NormalizedLandmark::with_confidence(0.1, 0.1, 0.0, 0.5, 0.0);
        assert!(at.is_confident());
        let below = NormalizedLandmark::with_confidence(0.1, 0.1, 0.0, 0.4999, 0.0);
        assert!(!below.is_confident());
    }

    #[test]
    fn test_wire_format_fills_missing_scores() {
        let lm = NormalizedLandmark::new(0.25, 0.75, -0.1);
        assert_eq!(lm.to_wire(), [0.25, 0.75, -0.1, 0.0, 0.0]);
    }

    #[test]
    fn test_pose_graph_stays_in_range() {
        for &(a, b) in POSE_CONNECTIONS {
            assert!(a < 33 && b < 33);
        }
        for &(a, b) in HAND_CONNECTIONS {
            assert!(a < 21 && b < 21);
        }
    }
}
