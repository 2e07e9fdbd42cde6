//! Camera Status Tracker
//!
//! Tracks each camera feed's availability to detect lost/recovered events.
//! Only transitions are logged; steady-state polls stay quiet.

use crate::models::CameraRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Camera connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraConnectionStatus {
    /// Initial state (never polled)
    #[default]
    Unknown,
    /// Feed is delivering frames
    Online,
    /// Feed failed its last read
    Offline,
}

/// Camera status transition event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatusEvent {
    /// Camera went from Online to Offline
    Lost,
    /// Camera went from Offline to Online
    Recovered,
}

/// Status view for the API
#[derive(Debug, Clone, Serialize)]
pub struct CameraStatusView {
    pub camera: CameraRole,
    pub connection: CameraConnectionStatus,
    pub changed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct CameraTrackerEntry {
    connection: CameraConnectionStatus,
    changed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Tracks camera connection status and detects transitions
pub struct CameraStatusTracker {
    statuses: RwLock<HashMap<CameraRole, CameraTrackerEntry>>,
}

impl CameraStatusTracker {
    /// Create new tracker
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Successful read
    pub async fn mark_online(&self, camera: CameraRole) -> Option<CameraStatusEvent> {
        self.update_status(camera, true, None).await
    }

    /// Failed read
    pub async fn mark_offline(&self, camera: CameraRole, error: &str) -> Option<CameraStatusEvent> {
        self.update_status(camera, false, Some(error.to_string())).await
    }

    /// Update camera status and return transition event if any
    ///
    /// Returns:
    /// - `Some(Lost)` if camera transitioned from Online to Offline
    /// - `Some(Recovered)` if camera transitioned from Offline to Online
    /// - `Some(Lost)` if camera's first status is Offline (initial lost)
    /// - `None` if no transition occurred
    pub async fn update_status(
        &self,
        camera: CameraRole,
        is_online: bool,
        error: Option<String>,
    ) -> Option<CameraStatusEvent> {
        let mut statuses = self.statuses.write().await;
        let entry = statuses.entry(camera).or_default();
        let prev = entry.connection;

        let new_status = if is_online {
            CameraConnectionStatus::Online
        } else {
            CameraConnectionStatus::Offline
        };

        if prev != new_status {
            entry.changed_at = Some(Utc::now());
        }
        entry.connection = new_status;
        entry.last_error = if is_online { None } else { error };

        match (prev, new_status) {
            // Online -> Offline = Lost
            (CameraConnectionStatus::Online, CameraConnectionStatus::Offline) => {
                tracing::warn!(
                    camera = %camera,
                    error = ?entry.last_error,
                    "Camera feed lost"
                );
                Some(CameraStatusEvent::Lost)
            }
            // Offline -> Online = Recovered
            (CameraConnectionStatus::Offline, CameraConnectionStatus::Online) => {
                tracing::info!(camera = %camera, "Camera feed recovered");
                Some(CameraStatusEvent::Recovered)
            }
            // Unknown -> Offline = Initial Lost (first poll failed)
            (CameraConnectionStatus::Unknown, CameraConnectionStatus::Offline) => {
                tracing::warn!(
                    camera = %camera,
                    error = ?entry.last_error,
                    "Camera initial read failed - marking as lost"
                );
                Some(CameraStatusEvent::Lost)
            }
            _ => None,
        }
    }

    /// Get current status for a camera
    pub async fn get_status(&self, camera: CameraRole) -> CameraConnectionStatus {
        self.statuses
            .read()
            .await
            .get(&camera)
            .map(|e| e.connection)
            .unwrap_or_default()
    }

    /// Get all offline cameras
    pub async fn get_offline_cameras(&self) -> Vec<CameraRole> {
        let mut offline: Vec<CameraRole> = self
            .statuses
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.connection == CameraConnectionStatus::Offline)
            .map(|(camera, _)| *camera)
            .collect();
        offline.sort();
        offline
    }

    /// All tracked cameras
    pub async fn get_all(&self) -> Vec<CameraStatusView> {
        let statuses = self.statuses.read().await;
        let mut views: Vec<CameraStatusView> = statuses
            .iter()
            .map(|(camera, e)| CameraStatusView {
                camera: *camera,
                connection: e.connection,
                changed_at: e.changed_at,
                last_error: e.last_error.clone(),
            })
            .collect();
        views.sort_by_key(|v| v.camera);
        views
    }
}

impl Default for CameraStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
