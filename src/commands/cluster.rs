//! Cluster commands: apply, delete, status
//!
//! Pools are reconciled in parallel, each against the same starting
//! cluster. Their results are merged back one at a time, in pool order,
//! into the cluster that gets saved.

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{
    Cluster, ConvergeOptions, DiffReport, Observer, Outcome, Phase, ReconcileResult,
    ReconcileSummary, Resource, RetryConfig, Warning, converge, diff, teardown,
};
use iamkit::backend::aws::AwsCliBackend;
use rayon::prelude::*;
use std::time::Duration;

use crate::Context;
use crate::cli::{ApplyArgs, AwsArgs, DeleteArgs, StatusArgs};
use crate::cluster_spec::{ClusterSpec, Desired};
use crate::defaults::AwsProfile;
use crate::resource::{IamClient, InstanceProfile};
use crate::state::ClusterState;
use crate::ui;

/// What to do with each pool's profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Apply,
    Delete,
}

/// Result of reconciling one pool
#[derive(Debug)]
pub struct PoolReport {
    pub pool: String,
    pub profile: String,
    pub outcome: Result<Outcome<InstanceProfile>, declarative::Error<iamkit::Error>>,
}

impl PoolReport {
    fn result(&self) -> ReconcileResult {
        match &self.outcome {
            Ok(outcome) => outcome.result.clone(),
            Err(e) => ReconcileResult::Failed {
                error: error_chain(e),
            },
        }
    }
}

/// Prints reconciliation progress for one pool
struct Reporter {
    quiet: bool,
}

impl Observer for Reporter {
    fn on_phase(&mut self, resource: &str, phase: Phase) {
        log::debug!("{resource}: {phase}");
    }

    fn on_diff(&mut self, resource: &str, report: &DiffReport) {
        if !report.is_empty() {
            log::info!("{resource}: {} difference(s)", report.len());
            for entry in report.entries() {
                log::debug!("{resource}: {entry}");
            }
        }
    }

    fn on_warning(&mut self, _resource: &str, warning: &Warning) {
        if !self.quiet {
            ui::warn(&warning.to_string());
        }
    }

    fn on_retry(&mut self, resource: &str, attempt: u32, error: &str, delay: Duration) {
        if !self.quiet {
            ui::warn(&format!(
                "{resource}: attempt {attempt} failed ({error}), retrying in {}s",
                delay.as_secs()
            ));
        }
    }

    fn on_complete(&mut self, resource: &str, result: &ReconcileResult) {
        if self.quiet {
            return;
        }
        match result {
            ReconcileResult::NoChange => ui::dim(&format!("{resource}: up to date")),
            ReconcileResult::Applied => ui::success(&format!("{resource}: applied")),
            ReconcileResult::Deleted => ui::success(&format!("{resource}: deleted")),
            ReconcileResult::Failed { error } => ui::error(&format!("{resource}: {error}")),
        }
    }
}

/// Reconcile every profile in parallel, then merge the pools serially.
///
/// Failed pools keep their value from `cluster`.
pub fn reconcile_pools(
    cluster: &Cluster,
    profiles: &[InstanceProfile],
    iam: &IamClient,
    opts: &ConvergeOptions,
    mode: Mode,
    jobs: usize,
    quiet: bool,
) -> Result<(Cluster, Vec<PoolReport>)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create reconcile thread pool")?;

    let reports: Vec<PoolReport> = pool.install(|| {
        profiles
            .par_iter()
            .map(|profile| {
                let mut reporter = Reporter { quiet };
                let outcome = match mode {
                    Mode::Apply => converge(
                        profile,
                        iam,
                        cluster,
                        opts,
                        iamkit::Error::is_retryable,
                        &mut reporter,
                    ),
                    Mode::Delete => teardown(
                        profile,
                        iam,
                        cluster,
                        opts,
                        iamkit::Error::is_retryable,
                        &mut reporter,
                    ),
                };
                PoolReport {
                    pool: profile.server_pool.clone(),
                    profile: profile.id(),
                    outcome,
                }
            })
            .collect()
    });

    let mut merged = cluster.clone();
    for report in &reports {
        if let Ok(outcome) = &report.outcome
            && let Some(next) = merged.merge_server_pool(&outcome.cluster, &report.pool)
        {
            merged = next;
        }
    }
    Ok((merged, reports))
}

fn backend(aws: &AwsArgs, location: &str) -> Result<AwsCliBackend> {
    let region = aws
        .region
        .clone()
        .or_else(|| (!location.is_empty()).then(|| location.to_string()));
    Ok(AwsCliBackend::new()
        .context("The aws CLI is required")?
        .with_profile(aws.aws_profile.clone())
        .with_region(region))
}

fn load_desired(aws: &AwsArgs) -> Result<Desired> {
    let path = crate::paths::expand(&aws.spec);
    let spec = ClusterSpec::load(&path)?;
    let defaults = AwsProfile::load()?;
    spec.build(&defaults)
        .with_context(|| format!("Invalid cluster spec: {}", path.display()))
}

/// Seed the run from the saved cluster when it describes the same pools
fn starting_cluster(desired: &Desired) -> Result<Cluster> {
    let saved = ClusterState::load(&desired.cluster.name)?;
    Ok(match saved {
        Some(saved) => seed_references(desired, &saved.cluster),
        None => desired.cluster.clone(),
    })
}

/// Copy saved instance profile references onto the pools that still have a profile
fn seed_references(desired: &Desired, saved: &Cluster) -> Cluster {
    let mut cluster = desired.cluster.clone();
    for profile in &desired.profiles {
        let reference = saved
            .server_pool(&profile.server_pool)
            .and_then(|p| p.instance_profile.clone());
        if let Some(next) =
            cluster.update_server_pool(&profile.server_pool, |p| p.instance_profile = reference)
        {
            cluster = next;
        }
    }
    cluster
}

/// Count results and warnings, and record failed pools in the state to save
fn tally(
    cluster: Cluster,
    reports: &[PoolReport],
    operation: &str,
) -> (ReconcileSummary, ClusterState) {
    let mut summary = ReconcileSummary::default();
    let mut state = ClusterState::new(cluster, operation);

    for report in reports {
        let result = report.result();
        summary.add_result(&result);
        if let ReconcileResult::Failed { error } = &result {
            state.mark_failed(&report.pool, error);
        }
        if let Ok(outcome) = &report.outcome {
            summary.warnings += outcome.warnings.len();
        }
    }
    (summary, state)
}

fn summarize(
    ctx: &Context,
    cluster: Cluster,
    reports: &[PoolReport],
    operation: &str,
) -> Result<ReconcileSummary> {
    let (summary, state) = tally(cluster, reports, operation);
    state.save()?;

    if !ctx.quiet {
        println!();
        ui::kv("Applied", &summary.applied.to_string());
        ui::kv("Deleted", &summary.deleted.to_string());
        ui::kv("Up to date", &summary.no_change.to_string());
        ui::kv("Failed", &summary.failed.to_string());
        if summary.warnings > 0 {
            ui::kv("Warnings", &summary.warnings.to_string());
        }
    }
    Ok(summary)
}

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let desired = load_desired(&args.aws)?;
    let iam = backend(&args.aws, &desired.cluster.location)?;
    let opts = ConvergeOptions {
        max_passes: args.max_passes,
        retry: RetryConfig::default(),
    };

    if !ctx.quiet {
        ui::header(&format!("Applying cluster {}", desired.cluster.name));
        ui::kv("Location", &desired.cluster.location);
        ui::kv("Instance profiles", &desired.profiles.len().to_string());
        ui::kv("Parallel jobs", &args.jobs.to_string());
        println!();
    }

    let start = starting_cluster(&desired)?;
    let (cluster, reports) = reconcile_pools(
        &start,
        &desired.profiles,
        &iam,
        &opts,
        Mode::Apply,
        args.jobs,
        ctx.quiet,
    )?;
    let summary = summarize(ctx, cluster, &reports, "apply")?;

    if !summary.is_success() {
        bail!("{} instance profile(s) failed to converge", summary.failed);
    }
    if !ctx.quiet {
        ui::success("Cluster converged");
    }
    Ok(())
}

pub fn delete(ctx: &Context, args: DeleteArgs) -> Result<()> {
    let desired = load_desired(&args.aws)?;

    if !args.yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Delete {} instance profile(s) of cluster {}?",
                desired.profiles.len(),
                desired.cluster.name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            ui::info("Cancelled");
            return Ok(());
        }
    }

    let iam = backend(&args.aws, &desired.cluster.location)?;
    let opts = ConvergeOptions::default();
    let start = starting_cluster(&desired)?;
    let (cluster, reports) = reconcile_pools(
        &start,
        &desired.profiles,
        &iam,
        &opts,
        Mode::Delete,
        1,
        ctx.quiet,
    )?;
    let summary = summarize(ctx, cluster, &reports, "delete")?;

    if !summary.is_success() {
        bail!("{} instance profile(s) could not be deleted", summary.failed);
    }
    Ok(())
}

/// Per-pool drift, without changing anything
#[derive(Debug)]
pub struct PoolStatus {
    pub pool: String,
    pub profile: String,
    pub exists: bool,
    pub differences: DiffReport,
}

/// Read actual state for every profile and diff it against expected
pub fn inspect(
    cluster: &Cluster,
    profiles: &[InstanceProfile],
    iam: &IamClient,
) -> Result<Vec<PoolStatus>> {
    profiles
        .iter()
        .map(|profile| {
            let expected = profile
                .expected(cluster)
                .with_context(|| format!("Failed to compute {}", profile.label()))?;
            let actual = profile
                .actual(iam, cluster)
                .with_context(|| format!("Failed to read {}", profile.label()))?;
            Ok(PoolStatus {
                pool: profile.server_pool.clone(),
                profile: profile.id(),
                exists: actual.resource.shared.exists(),
                differences: diff(&actual.resource, &expected.resource),
            })
        })
        .collect()
}

pub fn status(ctx: &Context, args: StatusArgs) -> Result<()> {
    let desired = load_desired(&args.aws)?;
    let iam = backend(&args.aws, &desired.cluster.location)?;
    let statuses = inspect(&desired.cluster, &desired.profiles, &iam)?;

    ui::header(&format!("Cluster {}", desired.cluster.name));
    if let Some(saved) = ClusterState::load(&desired.cluster.name)? {
        ui::kv(
            "Last run",
            &format!(
                "{} at {}",
                saved.operation,
                saved.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        );
    }
    println!();

    for status in &statuses {
        let marker = if !status.exists {
            "missing".red()
        } else if status.differences.is_empty() {
            "in sync".green()
        } else {
            "drifted".yellow()
        };
        println!("  {} {} ({})", status.pool.bold(), marker, status.profile);
        if ctx.verbose > 0 {
            for entry in status.differences.entries() {
                ui::dim(&entry.to_string());
            }
        }
    }

    if statuses.is_empty() {
        ui::info("No pools with an instance profile");
    }
    Ok(())
}

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
