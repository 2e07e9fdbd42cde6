//! ConfigStore data types
//!
//! Every threshold and weight used by the fusion pipeline, with the
//! defaults of the reference two-camera deployment.

use crate::error::{Error, Result};
use crate::models::{Emotion, RiskClass};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest accepted time setting (seconds); keeps every derived `Duration` in range
pub const MAX_DURATION_SEC: i64 = i64::MAX / 1000;

/// Largest accepted magnitude for a score weight or threshold
pub const MAX_SCORE_WEIGHT: i32 = 1_000_000;

fn seconds(value: i64) -> Duration {
    Duration::try_seconds(value.clamp(0, MAX_DURATION_SEC)).unwrap_or_else(Duration::zero)
}

/// Complete fusion policy
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct FusionPolicy {
    pub reid: ReidPolicy,
    pub behavior: BehaviorPolicy,
    pub presence: PresencePolicy,
    pub scoring: ScoringPolicy,
    pub retention: RetentionPolicy,
    pub classes: ClassMap,
}

impl FusionPolicy {
    /// Reject policies that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        let finite_non_negative = [
            ("reid.match_threshold", self.reid.match_threshold),
            ("behavior.sudden_motion_threshold", self.behavior.sudden_motion_threshold),
            ("behavior.depth_correction_factor", self.behavior.depth_correction_factor),
            ("behavior.static_epsilon", self.behavior.static_epsilon),
            ("behavior.loiter_radius", self.behavior.loiter_radius),
            ("scoring.close_range_area_ratio", self.scoring.close_range_area_ratio),
        ];
        for (name, value) in finite_non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Validation(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }

        if self.behavior.history_length == 0 {
            return Err(Error::Validation(
                "behavior.history_length must be at least 1".to_string(),
            ));
        }
        if self.reid.histogram_bins.iter().any(|b| *b == 0) {
            return Err(Error::Validation(
                "reid.histogram_bins must be non-zero".to_string(),
            ));
        }
        if self.scoring.watch_threshold > self.scoring.critical_threshold {
            return Err(Error::Validation(format!(
                "scoring.watch_threshold ({}) exceeds scoring.critical_threshold ({})",
                self.scoring.watch_threshold, self.scoring.critical_threshold
            )));
        }
        if self.presence.min_samples == 0 {
            return Err(Error::Validation(
                "presence.min_samples must be at least 1".to_string(),
            ));
        }

        let durations = [
            ("presence.window_sec", Some(self.presence.window_sec)),
            ("presence.sample_gap_sec", Some(self.presence.sample_gap_sec)),
            ("retention.identity_ttl_sec", self.retention.identity_ttl_sec),
        ];
        for (name, value) in durations {
            if let Some(value) = value {
                if !(0..=MAX_DURATION_SEC).contains(&value) {
                    return Err(Error::Validation(format!(
                        "{} must be between 0 and {}, got {}",
                        name, MAX_DURATION_SEC, value
                    )));
                }
            }
        }

        let scores = [
            ("scoring.face_covering_weight", self.scoring.face_covering_weight),
            ("scoring.headwear_weight", self.scoring.headwear_weight),
            ("scoring.eyewear_weight", self.scoring.eyewear_weight),
            ("scoring.loitering_weight", self.scoring.loitering_weight),
            ("scoring.negative_emotion_weight", self.scoring.negative_emotion_weight),
            ("scoring.critical_threshold", self.scoring.critical_threshold),
            ("scoring.watch_threshold", self.scoring.watch_threshold),
        ];
        for (name, value) in scores {
            if !(-MAX_SCORE_WEIGHT..=MAX_SCORE_WEIGHT).contains(&value) {
                return Err(Error::Validation(format!(
                    "{} must be within +/-{}, got {}",
                    name, MAX_SCORE_WEIGHT, value
                )));
            }
        }

        Ok(())
    }
}

/// Re-identification matching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReidPolicy {
    /// Maximum descriptor distance (exclusive) for a match
    pub match_threshold: f32,
    /// Hue x saturation histogram bins
    pub histogram_bins: [usize; 2],
}

impl Default for ReidPolicy {
    fn default() -> Self {
        Self {
            match_threshold: 100_000.0,
            histogram_bins: [8, 8],
        }
    }
}

/// Temporal motion analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorPolicy {
    /// Base displacement per observation flagged as sudden motion
    pub sudden_motion_threshold: f32,
    /// Threshold growth per unit of normalized y (perspective correction)
    pub depth_correction_factor: f32,
    /// Displacement below which an observation counts as static
    pub static_epsilon: f32,
    /// Consecutive static observations before flagging
    pub static_frames: u32,
    /// Maximum displacement from the oldest buffered position for loitering
    pub loiter_radius: f32,
    /// Consecutive in-radius observations before flagging
    pub loiter_frames: u32,
    /// Position history capacity
    pub history_length: usize,
}

impl Default for BehaviorPolicy {
    fn default() -> Self {
        Self {
            sudden_motion_threshold: 0.10,
            depth_correction_factor: 0.5,
            static_epsilon: 0.001,
            static_frames: 75,
            loiter_radius: 0.02,
            loiter_frames: 150,
            history_length: 30,
        }
    }
}

/// Presence-window loitering (repeated sightings over a long window)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PresencePolicy {
    /// Trailing window length
    pub window_sec: i64,
    /// Minimum gap between recorded sightings
    pub sample_gap_sec: i64,
    /// Sightings inside the window that make loitering active
    pub min_samples: usize,
}

impl PresencePolicy {
    pub fn window(&self) -> Duration {
        seconds(self.window_sec)
    }

    pub fn sample_gap(&self) -> Duration {
        seconds(self.sample_gap_sec)
    }
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self {
            window_sec: 300,
            sample_gap_sec: 10,
            min_samples: 3,
        }
    }
}

/// Risk score weights and alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringPolicy {
    pub face_covering_weight: i32,
    pub headwear_weight: i32,
    pub eyewear_weight: i32,
    pub loitering_weight: i32,
    pub negative_emotion_weight: i32,
    /// Score at or above which an identity is critical
    pub critical_threshold: i32,
    /// Score at or above which an identity is under watch
    pub watch_threshold: i32,
    /// Box area / frame area above which a subject is close enough to photograph
    pub close_range_area_ratio: f32,
    pub negative_emotions: Vec<Emotion>,
}

impl ScoringPolicy {
    pub fn risk_weight(&self, class: RiskClass) -> i32 {
        match class {
            RiskClass::FaceCovering => self.face_covering_weight,
            RiskClass::Headwear => self.headwear_weight,
            RiskClass::Eyewear => self.eyewear_weight,
        }
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            face_covering_weight: 50,
            headwear_weight: 20,
            eyewear_weight: 5,
            loitering_weight: 30,
            negative_emotion_weight: 20,
            critical_threshold: 50,
            watch_threshold: 1,
            // 300x300 px on a 1280x720 capture
            close_range_area_ratio: 0.0977,
            negative_emotions: vec![Emotion::Angry, Emotion::Disgust, Emotion::Fear, Emotion::Sad],
        }
    }
}

/// Identity table retention
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Evict identities unseen by every camera for this long; `None` keeps them forever
    pub identity_ttl_sec: Option<i64>,
}

impl RetentionPolicy {
    /// Eviction age, `None` when GC is disabled
    pub fn identity_ttl(&self) -> Option<Duration> {
        self.identity_ttl_sec.map(seconds)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            identity_ttl_sec: Some(300),
        }
    }
}

/// Role of a detector class id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "class", rename_all = "snake_case")]
pub enum ClassRole {
    /// Body part: unioned into the person box and used for appearance
    BodyPart,
    /// Auxiliary risk object
    Risk(RiskClass),
    /// Dropped
    Ignored,
}

/// Detector class id -> role mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ClassMap(HashMap<u32, ClassRole>);

impl ClassMap {
    pub fn new(roles: HashMap<u32, ClassRole>) -> Self {
        Self(roles)
    }

    /// Unknown class ids are ignored
    pub fn role(&self, class_id: u32) -> ClassRole {
        self.0.get(&class_id).copied().unwrap_or(ClassRole::Ignored)
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        Self(HashMap::from([
            (0, ClassRole::Risk(RiskClass::FaceCovering)),
            (1, ClassRole::Ignored), // uncovered face
            (2, ClassRole::Risk(RiskClass::Eyewear)),
            (3, ClassRole::Risk(RiskClass::Headwear)),
            (4, ClassRole::BodyPart), // upper body
            (5, ClassRole::BodyPart), // lower body
        ]))
    }
}
