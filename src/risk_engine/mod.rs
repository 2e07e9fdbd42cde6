//! RiskEngine - Scoring & Alert Decision
//!
//! ## Responsibilities
//!
//! - Additive per-identity risk score
//! - Individual and global alert levels
//! - Snapshot gating (critical AND close range)
//! - Actuation intents (never performs the I/O itself)
//!
//! Contributions:
//! - loitering (presence window or loitering pattern)
//! - each risk object by class weight
//! - negative emotion, skipped when the face is covered

mod types;

pub use types::*;

use crate::behavior_analyzer::BehaviorKind;
use crate::config_store::ScoringPolicy;
use crate::error::{Error, Result};
use crate::identity_store::TrackedPerson;
use crate::models::{BBox, FrameSize, RiskClass};

pub const EMOTION_FACE_COVERED: &str = "face_covered";
pub const EMOTION_NO_FACE: &str = "no_face";

/// RiskEngine instance
#[derive(Debug, Clone)]
pub struct RiskEngine {
    policy: ScoringPolicy,
}

impl RiskEngine {
    /// Create new RiskEngine
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    /// Score one identity
    ///
    /// Fails only on malformed geometry; a missing or degenerate box simply
    /// never counts as close range.
    pub fn score(&self, person: &TrackedPerson) -> Result<RiskAssessment> {
        let detection = &person.detection;
        if let Some(bbox) = detection.bbox {
            if !bbox.is_finite() {
                return Err(Error::Scoring {
                    identity_id: person.identity_id.to_string(),
                    message: format!("non-finite bounding box {:?}", bbox),
                });
            }
        }

        let mut score: i32 = 0;

        let loitering =
            person.loitering_active || person.behavior.kind == BehaviorKind::LoiteringPattern;
        if loitering {
            score = score.saturating_add(self.policy.loitering_weight);
        }

        let mut face_covered = false;
        for object in &detection.risk_objects {
            score = score.saturating_add(self.policy.risk_weight(object.class));
            if object.class == RiskClass::FaceCovering {
                face_covered = true;
            }
        }

        let emotion_label = if face_covered {
            EMOTION_FACE_COVERED.to_string()
        } else {
            match detection.emotion {
                Some(emotion) => {
                    if self.policy.negative_emotions.contains(&emotion) {
                        score = score.saturating_add(self.policy.negative_emotion_weight);
                    }
                    emotion.as_str().to_string()
                }
                None => EMOTION_NO_FACE.to_string(),
            }
        };

        let level = self.level_for(score);
        let close_range = detection
            .bbox
            .map(|bbox| self.is_close_range(&bbox, person.frame_size))
            .unwrap_or(false);

        Ok(RiskAssessment {
            identity_id: person.identity_id.clone(),
            camera: person.camera,
            score,
            level,
            emotion_label,
            behavior_label: person.behavior.label.clone(),
            loitering,
            close_range,
            snapshot_worthy: level == AlertLevel::Critical && close_range,
            bbox: detection.bbox,
            color: self.color_for(score),
            behavior_color: person.behavior.severity.color(),
        })
    }

    /// Global alert across assessments
    pub fn aggregate(assessments: &[RiskAssessment]) -> AlertLevel {
        AlertLevel::aggregate(assessments.iter().map(|a| a.level))
    }

    pub fn level_for(&self, score: i32) -> AlertLevel {
        if score >= self.policy.critical_threshold {
            AlertLevel::Critical
        } else if score >= self.policy.watch_threshold {
            AlertLevel::Watch
        } else {
            AlertLevel::Normal
        }
    }

    pub fn color_for(&self, score: i32) -> [u8; 3] {
        if score >= self.policy.critical_threshold {
            COLOR_RED
        } else if score > 0 {
            COLOR_YELLOW
        } else {
            COLOR_GREEN
        }
    }

    /// Box covers more than the configured share of the frame
    pub fn is_close_range(&self, bbox: &BBox, frame: FrameSize) -> bool {
        let frame_area = frame.area();
        if frame_area <= 0.0 {
            return false;
        }
        bbox.area() / frame_area > self.policy.close_range_area_ratio
    }

    /// Intents for one cycle's assessments
    pub fn plan_actuation(
        &self,
        assessments: &[RiskAssessment],
        global: AlertLevel,
    ) -> Vec<ActuationIntent> {
        let mut intents = Vec::with_capacity(assessments.len() + 1);
        for assessment in assessments {
            intents.push(ActuationIntent::DrawAnnotations {
                identity_id: assessment.identity_id.clone(),
                camera: assessment.camera,
                bbox: assessment.bbox,
                score: assessment.score,
                color: assessment.color,
                behavior_color: assessment.behavior_color,
                label: format!(
                    "{} {} {}",
                    assessment.score, assessment.emotion_label, assessment.behavior_label
                ),
            });
            if assessment.snapshot_worthy {
                intents.push(ActuationIntent::CaptureSnapshot {
                    identity_id: assessment.identity_id.clone(),
                    camera: assessment.camera,
                    score: assessment.score,
                });
            }
        }
        if global == AlertLevel::Critical {
            intents.push(ActuationIntent::RaiseAlarm { level: global });
        }
        intents
    }
}
