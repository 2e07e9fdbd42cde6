//! ConfigStore - Single Source of Truth for the fusion policy
//!
//! ## Responsibilities
//!
//! - Hold the active `FusionPolicy` (thresholds, weights, class map)
//! - Load an override file at startup
//! - Validate and swap the policy at runtime
//!
//! Components read a cloned snapshot of the policy once per call, so a
//! policy swap never tears a single operation.

mod types;

pub use types::*;

use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// ConfigStore instance
pub struct ConfigStore {
    policy: Arc<RwLock<FusionPolicy>>,
}

impl ConfigStore {
    /// Create with an explicit policy
    pub fn new(policy: FusionPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            policy: Arc::new(RwLock::new(policy)),
        })
    }

    /// Create with default policy
    pub fn with_defaults() -> Self {
        Self {
            policy: Arc::new(RwLock::new(FusionPolicy::default())),
        }
    }

    /// Load policy from a JSON file; missing keys keep their defaults
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Failed to read policy file {}: {}", path.display(), e))
        })?;
        let policy: FusionPolicy = serde_json::from_str(&raw)?;
        tracing::info!(path = %path.display(), "Fusion policy loaded");
        Self::new(policy)
    }

    /// Current policy
    pub async fn policy(&self) -> FusionPolicy {
        self.policy.read().await.clone()
    }

    /// Replace policy (validated)
    pub async fn update_policy(&self, policy: FusionPolicy) -> Result<()> {
        policy.validate()?;
        *self.policy.write().await = policy;
        tracing::info!("Fusion policy updated");
        Ok(())
    }
}
