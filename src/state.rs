use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::Cluster;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// State Structures
// ============================================================================

/// Last rendered cluster, written after every apply and delete
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterState {
    pub cluster: Cluster,

    /// Command that produced this state ("apply" or "delete")
    pub operation: String,

    /// Pools whose reconciliation failed in that run
    #[serde(default)]
    pub failed_pools: Vec<(String, String)>,

    pub last_updated: DateTime<Utc>,
}

impl ClusterState {
    pub fn new(cluster: Cluster, operation: &str) -> Self {
        Self {
            cluster,
            operation: operation.to_string(),
            failed_pools: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Record a pool that failed to reconcile
    pub fn mark_failed(&mut self, pool: &str, error: &str) {
        self.failed_pools.retain(|(name, _)| name != pool);
        self.failed_pools.push((pool.to_string(), error.to_string()));
    }

    /// Load the state of `cluster`, if any was saved
    pub fn load(cluster: &str) -> Result<Option<Self>> {
        Self::load_from(&crate::paths::cluster_state_file(cluster)?)
    }

    /// Save under the state directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&crate::paths::cluster_state_file(&self.cluster.name)?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            log::debug!("No cluster state at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(Some(state))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state to JSON")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }
}
