//! BehaviorAnalyzer - Temporal Motion Patterns
//!
//! ## Responsibilities
//!
//! - Sudden motion with perspective-corrected threshold
//! - Static (frozen) subject detection
//! - Loitering: bounded wandering over the full history window
//! - Presence window: repeated sightings over a long time span
//!
//! Rules are evaluated in priority order against the previous position:
//! sudden motion, then static, then loitering. Counters never go negative
//! and are only ever reset to zero.

mod types;

pub use types::*;

use crate::config_store::{BehaviorPolicy, PresencePolicy};
use crate::models::Position;
use chrono::{DateTime, Utc};

/// BehaviorAnalyzer instance
#[derive(Debug, Clone)]
pub struct BehaviorAnalyzer {
    policy: BehaviorPolicy,
}

impl BehaviorAnalyzer {
    /// Create new BehaviorAnalyzer
    pub fn new(policy: BehaviorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BehaviorPolicy {
        &self.policy
    }

    /// Sudden-motion threshold at normalized height `y`
    ///
    /// Subjects lower in the frame are closer to the camera and move more
    /// pixels per meter, so the threshold grows with `y`.
    pub fn dynamic_threshold(&self, y: f32) -> f32 {
        self.policy.sudden_motion_threshold * (1.0 + y * self.policy.depth_correction_factor)
    }

    /// Record one observation and classify it
    pub fn analyze(
        &self,
        state: &mut MotionState,
        position: Position,
        observed_at: DateTime<Utc>,
    ) -> BehaviorVerdict {
        if !position.x.is_finite() || !position.y.is_finite() {
            tracing::debug!(x = position.x, y = position.y, "Ignoring non-finite position");
            return BehaviorVerdict::normal();
        }

        let capacity = self.policy.history_length.max(1);
        while state.history.len() >= capacity {
            state.history.pop_front();
        }
        state.history.push_back(position);
        state.last_observed_at = Some(observed_at);

        let previous = state.last_position.replace(position);
        let Some(previous) = previous else {
            return BehaviorVerdict::normal();
        };

        let displacement = position.distance(&previous);

        if displacement > self.dynamic_threshold(position.y) {
            state.static_frames = 0;
            state.loiter_frames = 0;
            return BehaviorVerdict::from_kind(BehaviorKind::SuddenMotion);
        }

        if displacement < self.policy.static_epsilon {
            state.static_frames = state.static_frames.saturating_add(1);
            if state.static_frames >= self.policy.static_frames {
                state.loiter_frames = 0;
                return BehaviorVerdict::from_kind(BehaviorKind::StaticAnomaly);
            }
            return BehaviorVerdict::normal();
        }

        state.static_frames = 0;

        if state.history.len() == capacity {
            if let Some(oldest) = state.history.front() {
                if position.distance(oldest) < self.policy.loiter_radius {
                    state.loiter_frames = state.loiter_frames.saturating_add(1);
                    if state.loiter_frames >= self.policy.loiter_frames {
                        return BehaviorVerdict::from_kind(BehaviorKind::LoiteringPattern);
                    }
                } else {
                    state.loiter_frames = 0;
                }
            }
        }

        BehaviorVerdict::normal()
    }
}

/// Record a sighting and prune samples outside the trailing window
pub fn record_presence(window: &mut PresenceWindow, policy: &PresencePolicy, now: DateTime<Utc>) {
    let gap = policy.sample_gap();
    let should_sample = match window.samples.last() {
        None => true,
        Some(last) => now - *last > gap,
    };
    if should_sample {
        window.samples.push(now);
    }

    let span = policy.window();
    window.samples.retain(|t| now - *t < span);
}

/// Enough sightings inside the window to count as loitering
pub fn presence_loitering(window: &PresenceWindow, policy: &PresencePolicy) -> bool {
    window.samples.len() >= policy.min_samples
}
