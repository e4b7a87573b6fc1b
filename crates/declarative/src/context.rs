//! Observer callbacks for reconciliation
//!
//! The driver reports what it does through an [`Observer`], so the crate
//! can be used without depending on a particular UI or logger.

use crate::diff::DiffReport;
use crate::types::{Phase, ReconcileResult, Warning};
use std::time::Duration;

/// Receives progress updates while a resource is reconciled
///
/// All methods default to doing nothing.
pub trait Observer {
    /// Called when a phase starts
    fn on_phase(&mut self, _resource: &str, _phase: Phase) {}

    /// Called with the differences found between actual and expected
    fn on_diff(&mut self, _resource: &str, _report: &DiffReport) {}

    /// Called for every non-fatal warning a phase produced
    fn on_warning(&mut self, _resource: &str, _warning: &Warning) {}

    /// Called before a failed pass is retried
    fn on_retry(&mut self, _resource: &str, _attempt: u32, _error: &str, _delay: Duration) {}

    /// Called once the resource has been reconciled
    fn on_complete(&mut self, _resource: &str, _result: &ReconcileResult) {}
}

/// No-op observer
pub struct NoProgress;

impl Observer for NoProgress {}

/// Observer that forwards everything to the `log` crate
pub struct LogProgress;

impl Observer for LogProgress {
    fn on_phase(&mut self, resource: &str, phase: Phase) {
        log::debug!("{resource}: {phase}");
    }

    fn on_diff(&mut self, resource: &str, report: &DiffReport) {
        for entry in report.entries() {
            log::debug!("{resource}: {entry}");
        }
    }

    fn on_warning(&mut self, resource: &str, warning: &Warning) {
        log::warn!("{resource}: {warning}");
    }

    fn on_retry(&mut self, resource: &str, attempt: u32, error: &str, delay: Duration) {
        log::warn!(
            "{resource}: attempt {attempt} failed: {error}. Retrying in {}s",
            delay.as_secs()
        );
    }

    fn on_complete(&mut self, resource: &str, result: &ReconcileResult) {
        log::info!("{resource}: {result:?}");
    }
}

/// Collects warnings, for callers that want to surface them after the fact
#[derive(Debug, Default)]
pub struct CollectWarnings {
    pub warnings: Vec<(String, Warning)>,
}

impl Observer for CollectWarnings {
    fn on_warning(&mut self, resource: &str, warning: &Warning) {
        self.warnings.push((resource.to_string(), warning.clone()));
    }
}
