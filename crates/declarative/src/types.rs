//! Core types for declarative resource reconciliation

use crate::cluster::Cluster;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Resource tags, ordered by key
pub type Tags = BTreeMap<String, String>;

/// Identity fields carried by every resource kind
///
/// An empty `identifier` means the resource has not been created remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shared {
    pub name: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub tags: Tags,
}

impl Shared {
    /// Create shared fields for a resource that does not exist yet
    pub fn new(name: impl Into<String>, tags: Tags) -> Self {
        Self {
            name: name.into(),
            identifier: String::new(),
            tags,
        }
    }

    /// Set the provider-assigned identifier
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Whether the provider has assigned an identifier
    pub fn exists(&self) -> bool {
        !self.identifier.is_empty()
    }
}

/// A reconciliation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Expected,
    Actual,
    Apply,
    Delete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Expected => write!(f, "expected"),
            Phase::Actual => write!(f, "actual"),
            Phase::Apply => write!(f, "apply"),
            Phase::Delete => write!(f, "delete"),
        }
    }
}

/// A non-fatal condition noticed while rendering a resource into a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Warning {
    /// No server pool matched the resource's pool name; the cluster was left as is
    OrphanedResource { resource: String, server_pool: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::OrphanedResource {
                resource,
                server_pool,
            } => write!(
                f,
                "{resource} references server pool '{server_pool}' which is not in the cluster"
            ),
        }
    }
}

/// Value returned by every phase: the next cluster and the resource snapshot
#[derive(Debug, Clone)]
pub struct Rendered<S> {
    /// Cluster to thread into the next call
    pub cluster: Cluster,
    /// Snapshot of the resource produced by the phase
    pub resource: S,
    /// Non-fatal conditions noticed while rendering
    pub warnings: Vec<Warning>,
}

impl<S> Rendered<S> {
    /// Rendered value with no warnings
    pub fn new(cluster: Cluster, resource: S) -> Self {
        Self {
            cluster,
            resource,
            warnings: Vec::new(),
        }
    }

    /// Attach a warning
    pub fn with_warning(mut self, warning: Warning) -> Self {
        self.warnings.push(warning);
        self
    }
}

/// Result of reconciling a single resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileResult {
    /// Actual already matched expected
    NoChange,
    /// The converge sequence ran
    Applied,
    /// The resource was torn down
    Deleted,
    /// Reconciliation failed
    Failed { error: String },
}

impl ReconcileResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Applied | Self::Deleted)
    }
}

/// Summary of reconciliation results across resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub applied: usize,
    pub deleted: usize,
    pub failed: usize,
    pub no_change: usize,
    pub warnings: usize,
}

impl ReconcileSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.applied + self.deleted
    }

    /// Check if reconciliation was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.applied + self.deleted + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ReconcileResult) {
        match result {
            ReconcileResult::NoChange => self.no_change += 1,
            ReconcileResult::Applied => self.applied += 1,
            ReconcileResult::Deleted => self.deleted += 1,
            ReconcileResult::Failed { .. } => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_exists() {
        let shared = Shared::new("demo", Tags::new());
        assert!(!shared.exists());
        assert!(shared.with_identifier("AIPA123").exists());
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ReconcileSummary::default();
        summary.add_result(&ReconcileResult::Applied);
        summary.add_result(&ReconcileResult::NoChange);
        summary.add_result(&ReconcileResult::Failed {
            error: "boom".into(),
        });
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.total_changes(), 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::OrphanedResource {
            resource: "instance_profile.demo".into(),
            server_pool: "nodes".into(),
        };
        assert_eq!(
            warning.to_string(),
            "instance_profile.demo references server pool 'nodes' which is not in the cluster"
        );
    }
}
