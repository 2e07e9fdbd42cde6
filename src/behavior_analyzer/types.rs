//! BehaviorAnalyzer types

use crate::models::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Motion pattern recognized for one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    Normal,
    SuddenMotion,
    StaticAnomaly,
    LoiteringPattern,
}

impl BehaviorKind {
    pub fn label(self) -> &'static str {
        match self {
            BehaviorKind::Normal => "normal",
            BehaviorKind::SuddenMotion => "sudden motion",
            BehaviorKind::StaticAnomaly => "static anomaly",
            BehaviorKind::LoiteringPattern => "loitering pattern",
        }
    }

    pub fn is_anomalous(self) -> bool {
        !matches!(self, BehaviorKind::Normal)
    }
}

/// Display / priority class, one per distinct verdict color
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Gaze,
    Static,
    Loitering,
    Sudden,
    GazeAnomalous,
}

impl Severity {
    /// RGB color used when annotating the identity
    pub fn color(self) -> [u8; 3] {
        match self {
            Severity::Normal => [0, 255, 0],
            Severity::Gaze => [0, 165, 255],
            Severity::Static => [255, 255, 0],
            Severity::Loitering => [255, 165, 0],
            Severity::Sudden => [255, 0, 0],
            Severity::GazeAnomalous => [255, 0, 255],
        }
    }
}

impl From<BehaviorKind> for Severity {
    fn from(kind: BehaviorKind) -> Self {
        match kind {
            BehaviorKind::Normal => Severity::Normal,
            BehaviorKind::SuddenMotion => Severity::Sudden,
            BehaviorKind::StaticAnomaly => Severity::Static,
            BehaviorKind::LoiteringPattern => Severity::Loitering,
        }
    }
}

/// Analyzer output for one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorVerdict {
    pub kind: BehaviorKind,
    pub severity: Severity,
    pub label: String,
    pub anomalous: bool,
    pub looking_at_camera: bool,
}

impl BehaviorVerdict {
    pub fn from_kind(kind: BehaviorKind) -> Self {
        Self {
            kind,
            severity: kind.into(),
            label: kind.label().to_string(),
            anomalous: kind.is_anomalous(),
            looking_at_camera: false,
        }
    }

    pub fn normal() -> Self {
        Self::from_kind(BehaviorKind::Normal)
    }

    /// Fold in the external gaze signal
    pub fn with_gaze(mut self, looking_at_camera: bool) -> Self {
        if !looking_at_camera {
            return self;
        }
        self.looking_at_camera = true;
        if self.anomalous {
            self.label = format!("{} + looking at camera", self.label);
            self.severity = Severity::GazeAnomalous;
        } else {
            self.label = "looking at camera".to_string();
            self.severity = Severity::Gaze;
            self.anomalous = true;
        }
        self
    }
}

impl Default for BehaviorVerdict {
    fn default() -> Self {
        Self::normal()
    }
}

/// Per-identity motion state carried across observations
#[derive(Debug, Clone, Default)]
pub struct MotionState {
    /// Bounded FIFO of positions, most recent last
    pub(crate) history: VecDeque<Position>,
    pub(crate) last_position: Option<Position>,
    pub(crate) static_frames: u32,
    pub(crate) loiter_frames: u32,
    pub(crate) last_observed_at: Option<DateTime<Utc>>,
}

impl MotionState {
    pub fn history(&self) -> impl Iterator<Item = &Position> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn static_frames(&self) -> u32 {
        self.static_frames
    }

    pub fn loiter_frames(&self) -> u32 {
        self.loiter_frames
    }

    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.last_observed_at
    }
}

/// Sighting timestamps inside the trailing presence window
#[derive(Debug, Clone, Default)]
pub struct PresenceWindow {
    pub(crate) samples: Vec<DateTime<Utc>>,
}

impl PresenceWindow {
    pub fn samples(&self) -> &[DateTime<Utc>] {
        &self.samples
    }
}
