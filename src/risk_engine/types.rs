//! RiskEngine types

use crate::identity_resolver::IdentityId;
use crate::models::{BBox, CameraRole};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered alert level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    #[default]
    Normal,
    Watch,
    Critical,
}

impl AlertLevel {
    /// Highest level present; `Normal` when empty
    pub fn aggregate<I>(levels: I) -> AlertLevel
    where
        I: IntoIterator<Item = AlertLevel>,
    {
        levels.into_iter().max().unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Normal => "normal",
            AlertLevel::Watch => "watch",
            AlertLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotation color for a score
pub const COLOR_RED: [u8; 3] = [255, 0, 0];
pub const COLOR_YELLOW: [u8; 3] = [255, 255, 0];
pub const COLOR_GREEN: [u8; 3] = [0, 255, 0];

/// Per-identity scoring result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub identity_id: IdentityId,
    pub camera: CameraRole,
    pub score: i32,
    pub level: AlertLevel,
    /// `face_covered`, the reported emotion, or `no_face`
    pub emotion_label: String,
    pub behavior_label: String,
    pub loitering: bool,
    /// Box large enough in frame for a usable capture
    pub close_range: bool,
    pub snapshot_worthy: bool,
    pub bbox: Option<BBox>,
    /// Score color (box outline)
    pub color: [u8; 3],
    /// Behavior severity color (label background)
    pub behavior_color: [u8; 3],
}

/// Side effect requested from the outside world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum ActuationIntent {
    DrawAnnotations {
        identity_id: IdentityId,
        camera: CameraRole,
        bbox: Option<BBox>,
        score: i32,
        color: [u8; 3],
        behavior_color: [u8; 3],
        label: String,
    },
    CaptureSnapshot {
        identity_id: IdentityId,
        camera: CameraRole,
        score: i32,
    },
    RaiseAlarm {
        level: AlertLevel,
    },
}
