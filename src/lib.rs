//! Sentinel Fusion Library
//!
//! Multi-camera identity fusion, temporal behavior analysis and risk alerting.
//!
//! ## Architecture
//!
//! 1. ConfigStore - FusionPolicy (thresholds, weights, class map)
//! 2. Perception - detector records -> person detections
//! 3. Appearance - clothing color descriptors
//! 4. IdentityResolver - greedy cross-camera re-identification
//! 5. BehaviorAnalyzer - sudden motion / static / loitering
//! 6. IdentityStore - global identities + per-camera live tables
//! 7. RiskEngine - scores, alert levels, actuation intents
//! 8. DecisionCycle - consumer loop with failure isolation
//! 9. CaptureOrchestrator - one producer per camera feed
//! 10. Actuation - intent execution
//! 11. AlertLogService - alert history (ring buffer)
//! 12. WebAPI - status endpoints
//!
//! ## Data Flow
//!
//! producer -> IdentityStore::update (resolve, analyze) -> merged snapshot
//! -> DecisionCycle (score, aggregate) -> intents -> ActuationWorker

pub mod actuation;
pub mod alert_log_service;
pub mod appearance;
pub mod behavior_analyzer;
pub mod camera_status_tracker;
pub mod capture_orchestrator;
pub mod config_store;
pub mod decision_cycle;
pub mod error;
pub mod identity_resolver;
pub mod identity_store;
pub mod models;
pub mod perception;
pub mod risk_engine;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
