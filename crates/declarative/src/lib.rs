//! # Declarative
//!
//! Level-triggered reconciliation of cloud resources against an immutable
//! cluster description.
//!
//! ## Core Concepts
//!
//! - **Cluster**: Immutable description of the desired infrastructure. Every
//!   change produces a new value with a bumped revision.
//! - **Resource**: Something that lives at a provider, reconciled through the
//!   expected / actual / apply / delete phases
//! - **Snapshot**: What a phase observed or produced for a resource
//! - **Diff**: Structural comparison that ignores provider identifiers and
//!   treats sequence order as significant
//! - **Executor**: Repeats passes until actual matches expected, retrying
//!   transient failures with backoff
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Cluster, ConvergeOptions, LogProgress, PoolKind, ServerPool, converge};
//!
//! let cluster = Cluster::new("demo")
//!     .with_location("eu-west-1")
//!     .with_server_pool(ServerPool::new("demo-node", PoolKind::Node));
//!
//! let outcome = converge(
//!     &profile,
//!     backend.as_ref(),
//!     &cluster,
//!     &ConvergeOptions::default(),
//!     |e: &iamkit::Error| e.is_retryable(),
//!     &mut LogProgress,
//! )?;
//! println!("{:?} after {} passes", outcome.result, outcome.passes);
//! ```
//!
//! ## Provider Injection
//!
//! Resources never own a client. The provider is an associated type of
//! [`Resource`] and is passed into every phase, so the same resource runs
//! against a real cloud or an in-memory fake.

pub mod cluster;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod resource;
pub mod retry;
pub mod types;

pub use cluster::{Cluster, IamInstanceProfile, IamPolicy, IamRole, PoolKind, ServerPool};
pub use context::{CollectWarnings, LogProgress, NoProgress, Observer};
pub use diff::{Compare, DiffReport, FieldDiff, diff, is_equal};
pub use error::Error;
pub use executor::{ConvergeOptions, Outcome, converge, reconcile, teardown};
pub use resource::{Resource, Snapshot};
pub use retry::{RetryConfig, with_retry};
pub use types::{
    Phase, ReconcileResult, ReconcileSummary, Rendered, Shared, Tags, Warning,
};
