//! IdentityStore types

use crate::appearance::Descriptor;
use crate::behavior_analyzer::{BehaviorVerdict, MotionState, PresenceWindow};
use crate::identity_resolver::IdentityId;
use crate::models::{CameraRole, Detection, FrameSize};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Persistent cross-camera identity
///
/// Motion is tracked per camera: each view has its own coordinate frame,
/// so positions from different cameras never share a history.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub id: IdentityId,
    /// Camera that first produced the identity
    pub origin: CameraRole,
    /// Latest accepted descriptor
    pub descriptor: Option<Arc<Descriptor>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Latest sighting per camera (historical, not current visibility)
    pub last_seen_by: HashMap<CameraRole, DateTime<Utc>>,
    pub motion: HashMap<CameraRole, MotionState>,
    pub presence: PresenceWindow,
    pub loitering_active: bool,
    /// Most recent analyzer verdict per camera (gaze applied)
    pub behavior: HashMap<CameraRole, BehaviorVerdict>,
    pub score: i32,
    pub emotion_label: Option<String>,
}

impl IdentityRecord {
    pub fn new(id: IdentityId, origin: CameraRole, at: DateTime<Utc>) -> Self {
        Self {
            id,
            origin,
            descriptor: None,
            first_seen_at: at,
            last_seen_at: at,
            last_seen_by: HashMap::new(),
            motion: HashMap::new(),
            presence: PresenceWindow::default(),
            loitering_active: false,
            behavior: HashMap::new(),
            score: 0,
            emotion_label: None,
        }
    }

    /// Verdict from one camera's view; normal when that camera has none
    pub fn behavior_on(&self, camera: CameraRole) -> BehaviorVerdict {
        self.behavior.get(&camera).cloned().unwrap_or_default()
    }

    /// Highest-precedence camera that has motion state
    pub fn primary_camera(&self) -> Option<CameraRole> {
        self.motion.keys().copied().max_by_key(|c| c.precedence())
    }

    /// Snapshot with `seen_by` taken from the live tables
    pub fn snapshot(&self, seen_by: Vec<CameraRole>) -> IdentitySnapshot {
        let mut motion: Vec<CameraMotion> = self
            .motion
            .iter()
            .map(|(camera, state)| CameraMotion {
                camera: *camera,
                history_len: state.history_len(),
                static_frames: state.static_frames(),
                loiter_frames: state.loiter_frames(),
                behavior: self.behavior_on(*camera),
            })
            .collect();
        motion.sort_by_key(|m| m.camera);

        let primary = self
            .primary_camera()
            .and_then(|camera| motion.iter().find(|m| m.camera == camera));

        IdentitySnapshot {
            identity_id: self.id.clone(),
            origin: self.origin,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
            seen_by,
            has_descriptor: self.descriptor.is_some(),
            history_len: primary.map(|m| m.history_len).unwrap_or(0),
            static_frames: primary.map(|m| m.static_frames).unwrap_or(0),
            loiter_frames: primary.map(|m| m.loiter_frames).unwrap_or(0),
            presence_samples: self.presence.samples().len(),
            loitering_active: self.loitering_active,
            behavior: primary.map(|m| m.behavior.clone()).unwrap_or_default(),
            score: self.score,
            emotion_label: self.emotion_label.clone(),
            motion,
        }
    }
}

/// Motion counters of one camera's view
#[derive(Debug, Clone, Serialize)]
pub struct CameraMotion {
    pub camera: CameraRole,
    pub history_len: usize,
    pub static_frames: u32,
    pub loiter_frames: u32,
    pub behavior: BehaviorVerdict,
}

/// Read-only copy of an identity's state
///
/// Motion fields describe the highest-precedence camera; `motion` lists every view.
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySnapshot {
    pub identity_id: IdentityId,
    pub origin: CameraRole,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Cameras whose live table currently holds the identity
    pub seen_by: Vec<CameraRole>,
    pub has_descriptor: bool,
    pub history_len: usize,
    pub static_frames: u32,
    pub loiter_frames: u32,
    pub presence_samples: usize,
    pub loitering_active: bool,
    pub behavior: BehaviorVerdict,
    pub score: i32,
    pub emotion_label: Option<String>,
    pub motion: Vec<CameraMotion>,
}

/// Latest detection of an identity on one camera
#[derive(Debug, Clone)]
pub struct LiveEntry {
    pub detection: Detection,
    pub frame_size: FrameSize,
    pub captured_at: DateTime<Utc>,
}

/// One canonical entry per visible identity
#[derive(Debug, Clone, Serialize)]
pub struct TrackedPerson {
    pub identity_id: IdentityId,
    /// Camera whose detection was chosen
    pub camera: CameraRole,
    /// Every camera currently seeing the identity
    pub seen_by: Vec<CameraRole>,
    pub frame_size: FrameSize,
    pub captured_at: DateTime<Utc>,
    pub detection: Detection,
    pub behavior: BehaviorVerdict,
    pub loitering_active: bool,
}
