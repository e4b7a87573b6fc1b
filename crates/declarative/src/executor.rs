//! Reconciliation driver - runs the four phases and repeats them until the
//! provider matches the desired state
//!
//! [`reconcile`] runs one pass: expected, actual, diff, apply. [`converge`]
//! repeats passes until one of them finds nothing to do, and retries failed
//! passes whose error the caller deems transient. [`teardown`] reads the
//! actual state and deletes it.

use crate::cluster::Cluster;
use crate::context::Observer;
use crate::diff::diff;
use crate::error::{Error, Result};
use crate::resource::{Resource, Snapshot};
use crate::retry::{RetryConfig, with_retry};
use crate::types::{Phase, ReconcileResult, Rendered, Warning};
use std::cell::RefCell;

/// Options for [`converge`] and [`teardown`]
#[derive(Debug, Clone)]
pub struct ConvergeOptions {
    /// Maximum number of passes, including the one that confirms convergence
    pub max_passes: u32,
    /// Backoff between attempts of a failed pass
    pub retry: RetryConfig,
}

impl Default for ConvergeOptions {
    fn default() -> Self {
        Self {
            max_passes: 3,
            retry: RetryConfig::default(),
        }
    }
}

/// What reconciling one resource produced
#[derive(Debug, Clone)]
pub struct Outcome<S> {
    /// Cluster to thread into the next reconciliation
    pub cluster: Cluster,
    /// Last snapshot of the resource
    pub resource: S,
    /// What happened
    pub result: ReconcileResult,
    /// Warnings raised by any phase
    pub warnings: Vec<Warning>,
    /// Passes run
    pub passes: u32,
}

fn run_phase<R, O>(
    resource: &R,
    phase: Phase,
    observer: &mut O,
    warnings: &mut Vec<Warning>,
    call: impl FnOnce() -> std::result::Result<Rendered<R::Snapshot>, R::Error>,
) -> Result<Rendered<R::Snapshot>, R::Error>
where
    R: Resource,
    O: Observer,
{
    let label = resource.label();
    observer.on_phase(&label, phase);
    let rendered = call().map_err(|source| Error::Phase {
        resource: label.clone(),
        phase,
        source,
    })?;
    for warning in &rendered.warnings {
        observer.on_warning(&label, warning);
        if !warnings.contains(warning) {
            warnings.push(warning.clone());
        }
    }
    Ok(rendered)
}

/// Run a single pass: expected, actual, diff, apply.
///
/// The cluster returned by each phase is threaded into the next one. When
/// actual already matches expected, apply is still invoked and is expected
/// to return without provider calls.
pub fn reconcile<R, O>(
    resource: &R,
    provider: &R::Provider,
    cluster: &Cluster,
    observer: &mut O,
) -> Result<Outcome<R::Snapshot>, R::Error>
where
    R: Resource,
    O: Observer,
{
    let label = resource.label();
    let mut warnings = Vec::new();

    let expected = run_phase(resource, Phase::Expected, observer, &mut warnings, || {
        resource.expected(cluster)
    })?;
    let actual = run_phase(resource, Phase::Actual, observer, &mut warnings, || {
        resource.actual(provider, &expected.cluster)
    })?;

    let report = diff(&actual.resource, &expected.resource);
    observer.on_diff(&label, &report);
    let result = if report.is_empty() {
        ReconcileResult::NoChange
    } else {
        ReconcileResult::Applied
    };

    let applied = run_phase(resource, Phase::Apply, observer, &mut warnings, || {
        resource.apply(provider, &actual.resource, &expected.resource, &actual.cluster)
    })?;

    Ok(Outcome {
        cluster: applied.cluster,
        resource: applied.resource,
        result,
        warnings,
        passes: 1,
    })
}

/// Repeat passes until one finds actual equal to expected.
///
/// A pass that fails with an error accepted by `is_retryable` is re-run
/// after a backoff; any other error ends convergence. Blind re-runs are safe
/// because the apply sequence tolerates steps that already happened.
pub fn converge<R, O, F>(
    resource: &R,
    provider: &R::Provider,
    cluster: &Cluster,
    opts: &ConvergeOptions,
    is_retryable: F,
    observer: &mut O,
) -> Result<Outcome<R::Snapshot>, R::Error>
where
    R: Resource,
    O: Observer,
    F: Fn(&R::Error) -> bool,
{
    let label = resource.label();
    let observer = RefCell::new(observer);
    let mut current = cluster.clone();
    let mut changed = false;
    let mut warnings: Vec<Warning> = Vec::new();

    for pass in 1..=opts.max_passes.max(1) {
        log::debug!("{label}: pass {pass}");
        let outcome = with_retry(
            &opts.retry,
            |e: &Error<R::Error>| e.resource_error().is_some_and(&is_retryable),
            |attempt, e, delay| {
                observer
                    .borrow_mut()
                    .on_retry(&label, attempt, &error_chain(e), delay);
            },
            || reconcile(resource, provider, &current, &mut **observer.borrow_mut()),
        );
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let result = ReconcileResult::Failed {
                    error: error_chain(&e),
                };
                observer.borrow_mut().on_complete(&label, &result);
                return Err(e);
            }
        };

        for warning in &outcome.warnings {
            if !warnings.contains(warning) {
                warnings.push(warning.clone());
            }
        }
        current = outcome.cluster.clone();

        if outcome.result == ReconcileResult::NoChange {
            let result = if changed {
                ReconcileResult::Applied
            } else {
                ReconcileResult::NoChange
            };
            observer.borrow_mut().on_complete(&label, &result);
            return Ok(Outcome {
                cluster: outcome.cluster,
                resource: outcome.resource,
                result,
                warnings,
                passes: pass,
            });
        }
        changed = true;
    }

    let e = Error::NotConverged {
        resource: label.clone(),
        passes: opts.max_passes.max(1),
    };
    observer.borrow_mut().on_complete(
        &label,
        &ReconcileResult::Failed {
            error: e.to_string(),
        },
    );
    Err(e)
}

/// Read the actual state and delete it.
///
/// Delete runs even when nothing exists remotely, so leftovers of an
/// interrupted teardown are still cleaned up.
pub fn teardown<R, O, F>(
    resource: &R,
    provider: &R::Provider,
    cluster: &Cluster,
    opts: &ConvergeOptions,
    is_retryable: F,
    observer: &mut O,
) -> Result<Outcome<R::Snapshot>, R::Error>
where
    R: Resource,
    O: Observer,
    F: Fn(&R::Error) -> bool,
{
    let label = resource.label();
    let observer = RefCell::new(observer);

    let attempt = || -> Result<Outcome<R::Snapshot>, R::Error> {
        let mut observer = observer.borrow_mut();
        let mut warnings = Vec::new();
        let actual = run_phase(resource, Phase::Actual, &mut **observer, &mut warnings, || {
            resource.actual(provider, cluster)
        })?;
        let existed = actual.resource.exists();
        let deleted = run_phase(resource, Phase::Delete, &mut **observer, &mut warnings, || {
            resource.delete(provider, &actual.resource, &actual.cluster)
        })?;
        Ok(Outcome {
            cluster: deleted.cluster,
            resource: deleted.resource,
            result: if existed {
                ReconcileResult::Deleted
            } else {
                ReconcileResult::NoChange
            },
            warnings,
            passes: 1,
        })
    };

    let outcome = with_retry(
        &opts.retry,
        |e: &Error<R::Error>| e.resource_error().is_some_and(&is_retryable),
        |n, e, delay| {
            observer
                .borrow_mut()
                .on_retry(&label, n, &error_chain(e), delay);
        },
        attempt,
    );

    match outcome {
        Ok(outcome) => {
            observer.borrow_mut().on_complete(&label, &outcome.result);
            Ok(outcome)
        }
        Err(e) => {
            observer.borrow_mut().on_complete(
                &label,
                &ReconcileResult::Failed {
                    error: error_chain(&e),
                },
            );
            Err(e)
        }
    }
}

/// Render an error and its sources on one line
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{IamInstanceProfile, PoolKind, ServerPool};
    use crate::context::{CollectWarnings, NoProgress};
    use crate::diff::{Compare, DiffReport};
    use crate::types::Shared;
    use std::cell::Cell;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
    }

    #[derive(Debug, Clone, Default)]
    struct Thing {
        shared: Shared,
        pool: String,
    }

    impl Compare for Thing {
        fn compare(&self, expected: &Self, report: &mut DiffReport) {
            self.shared.compare(&expected.shared, report);
        }
    }

    impl Snapshot for Thing {
        fn exists(&self) -> bool {
            self.shared.exists()
        }
    }

    /// Provider holding at most one thing, counting writes
    #[derive(Default)]
    struct Store {
        present: Cell<bool>,
        writes: Cell<u32>,
        failures: Cell<u32>,
        fatal: Cell<bool>,
    }

    impl Store {
        fn fail(&self) -> std::result::Result<(), TestError> {
            if self.fatal.get() {
                return Err(TestError::Fatal);
            }
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(TestError::Transient);
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct ThingResource {
        name: String,
        pool: String,
    }

    impl ThingResource {
        fn render(&self, thing: Thing, cluster: &Cluster) -> Rendered<Thing> {
            let reference = thing.shared.exists().then(|| IamInstanceProfile {
                name: thing.shared.name.clone(),
                identifier: thing.shared.identifier.clone(),
                role: None,
            });
            match cluster.update_server_pool(&self.pool, |p| p.instance_profile = reference) {
                Some(next) => Rendered::new(next, thing),
                None => Rendered::new(cluster.clone(), thing).with_warning(
                    Warning::OrphanedResource {
                        resource: self.label(),
                        server_pool: self.pool.clone(),
                    },
                ),
            }
        }
    }

    impl Resource for ThingResource {
        type Snapshot = Thing;
        type Provider = Store;
        type Error = TestError;

        fn resource_type(&self) -> &'static str {
            "thing"
        }

        fn id(&self) -> String {
            self.name.clone()
        }

        fn expected(&self, cluster: &Cluster) -> std::result::Result<Rendered<Thing>, TestError> {
            Ok(Rendered::new(
                cluster.clone(),
                Thing {
                    shared: Shared::new(&self.name, Default::default()),
                    pool: self.pool.clone(),
                },
            ))
        }

        fn actual(
            &self,
            store: &Store,
            cluster: &Cluster,
        ) -> std::result::Result<Rendered<Thing>, TestError> {
            store.fail()?;
            let thing = if store.present.get() {
                Thing {
                    shared: Shared::new(&self.name, Default::default()).with_identifier("ID-1"),
                    pool: self.pool.clone(),
                }
            } else {
                Thing::default()
            };
            Ok(self.render(thing, cluster))
        }

        fn apply(
            &self,
            store: &Store,
            actual: &Thing,
            expected: &Thing,
            cluster: &Cluster,
        ) -> std::result::Result<Rendered<Thing>, TestError> {
            if crate::diff::is_equal(actual, expected) {
                return Ok(Rendered::new(cluster.clone(), actual.clone()));
            }
            store.present.set(true);
            store.writes.set(store.writes.get() + 1);
            let mut applied = expected.clone();
            applied.shared.identifier = "ID-1".into();
            Ok(self.render(applied, cluster))
        }

        fn delete(
            &self,
            store: &Store,
            _actual: &Thing,
            cluster: &Cluster,
        ) -> std::result::Result<Rendered<Thing>, TestError> {
            store.present.set(false);
            Ok(self.render(Thing::default(), cluster))
        }
    }

    fn cluster() -> Cluster {
        Cluster::new("demo").with_server_pool(ServerPool::new("demo-node", PoolKind::Node))
    }

    fn thing(pool: &str) -> ThingResource {
        ThingResource {
            name: "demo-thing".into(),
            pool: pool.into(),
        }
    }

    fn fast() -> ConvergeOptions {
        ConvergeOptions {
            max_passes: 3,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                backoff_factor: 1.0,
                max_delay: Duration::from_millis(1),
            },
        }
    }

    #[test]
    fn test_converge_cold_start_takes_two_passes() {
        let store = Store::default();
        let outcome = converge(
            &thing("demo-node"),
            &store,
            &cluster(),
            &fast(),
            |_| false,
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(outcome.result, ReconcileResult::Applied);
        assert_eq!(outcome.passes, 2);
        assert_eq!(store.writes.get(), 1);
        assert!(
            outcome
                .cluster
                .server_pool("demo-node")
                .unwrap()
                .instance_profile
                .is_some()
        );
    }

    #[test]
    fn test_converge_already_converged_is_no_change() {
        let store = Store::default();
        store.present.set(true);
        let outcome = converge(
            &thing("demo-node"),
            &store,
            &cluster(),
            &fast(),
            |_| false,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(outcome.result, ReconcileResult::NoChange);
        assert_eq!(store.writes.get(), 0);
    }

    #[test]
    fn test_converge_retries_transient_errors() {
        let store = Store::default();
        store.failures.set(2);
        let outcome = converge(
            &thing("demo-node"),
            &store,
            &cluster(),
            &fast(),
            |e| matches!(e, TestError::Transient),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(outcome.result, ReconcileResult::Applied);
    }

    #[test]
    fn test_converge_surfaces_fatal_error_with_phase() {
        let store = Store::default();
        store.fatal.set(true);
        let err = converge(
            &thing("demo-node"),
            &store,
            &cluster(),
            &fast(),
            |e| matches!(e, TestError::Transient),
            &mut NoProgress,
        )
        .unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Actual));
        assert!(matches!(err.resource_error(), Some(TestError::Fatal)));
    }

    #[test]
    fn test_orphan_warning_is_surfaced() {
        let store = Store::default();
        let mut collect = CollectWarnings::default();
        let before = cluster();
        let outcome = converge(
            &thing("missing-pool"),
            &store,
            &before,
            &fast(),
            |_| false,
            &mut collect,
        )
        .unwrap();
        assert_eq!(outcome.cluster, before);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(!collect.warnings.is_empty());
    }

    #[test]
    fn test_teardown_then_teardown_again() {
        let store = Store::default();
        store.present.set(true);
        let first = teardown(
            &thing("demo-node"),
            &store,
            &cluster(),
            &fast(),
            |_| false,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(first.result, ReconcileResult::Deleted);

        let second = teardown(
            &thing("demo-node"),
            &store,
            &first.cluster,
            &fast(),
            |_| false,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(second.result, ReconcileResult::NoChange);
    }
}
