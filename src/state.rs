//! Application state
//!
//! Holds all shared components and state

use crate::alert_log_service::AlertLogService;
use crate::camera_status_tracker::CameraStatusTracker;
use crate::capture_orchestrator::ProducerSettings;
use crate::config_store::ConfigStore;
use crate::decision_cycle::CycleReport;
use crate::identity_store::IdentityStore;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Fusion policy override (JSON)
    pub policy_path: Option<PathBuf>,
    /// Wide camera detector feed (JSON Lines replay)
    pub wide_feed: Option<PathBuf>,
    /// Close camera detector feed (JSON Lines replay)
    pub close_feed: Option<PathBuf>,
    /// Decision cycle period
    pub cycle_interval_ms: u64,
    /// Producer sleep after an empty read
    pub producer_idle_ms: u64,
    /// Producer sleep after a delivered frame
    pub producer_frame_ms: u64,
    /// Producer sleep after a failed read
    pub source_retry_backoff_ms: u64,
    /// Actuation queue capacity
    pub intent_queue_capacity: usize,
    /// Identity GC period
    pub gc_interval_sec: u64,
}

impl AppConfig {
    pub fn producer_settings(&self) -> ProducerSettings {
        ProducerSettings {
            idle: Duration::from_millis(self.producer_idle_ms),
            frame_interval: Duration::from_millis(self.producer_frame_ms),
            retry_backoff: Duration::from_millis(self.source_retry_backoff_ms),
        }
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms.max(1))
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_sec.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8090),
            policy_path: std::env::var("FUSION_POLICY_PATH").ok().map(PathBuf::from),
            wide_feed: std::env::var("CAMERA_WIDE_FEED").ok().map(PathBuf::from),
            close_feed: std::env::var("CAMERA_CLOSE_FEED").ok().map(PathBuf::from),
            cycle_interval_ms: env_u64("CYCLE_INTERVAL_MS", 100),
            producer_idle_ms: env_u64("PRODUCER_IDLE_MS", 100),
            producer_frame_ms: env_u64("PRODUCER_FRAME_MS", 33),
            source_retry_backoff_ms: env_u64("SOURCE_RETRY_BACKOFF_MS", 1000),
            intent_queue_capacity: env_u64("INTENT_QUEUE_CAPACITY", 64).max(1) as usize,
            gc_interval_sec: env_u64("GC_INTERVAL_SEC", 10),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// ConfigStore (fusion policy)
    pub config_store: Arc<ConfigStore>,
    /// IdentityStore (global + per-camera tables)
    pub identities: Arc<IdentityStore>,
    /// Camera feed health
    pub camera_status: Arc<CameraStatusTracker>,
    /// AlertLogService (ring buffer)
    pub alert_log: Arc<AlertLogService>,
    /// Latest decision cycle report
    pub reports: watch::Receiver<CycleReport>,
    pub started_at: DateTime<Utc>,
}
