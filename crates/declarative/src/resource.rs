//! Resource trait for declarative state management
//!
//! A Resource is something that lives at a provider and is described by the
//! cluster. Reconciling it is a four-phase contract:
//!
//! 1. [`Resource::expected`] - project desired configuration into a snapshot,
//!    without talking to the provider
//! 2. [`Resource::actual`] - read the provider and build a snapshot of what is
//!    there; absence is a snapshot, not an error
//! 3. [`Resource::apply`] - compare the two and, if they differ, run an
//!    idempotent create sequence
//! 4. [`Resource::delete`] - tear down in reverse order, tolerating absence
//!
//! Every phase takes the current cluster by reference and returns the next
//! cluster together with the snapshot. No phase mutates the cluster it is
//! given.

use crate::cluster::Cluster;
use crate::diff::Compare;
use crate::types::Rendered;
use std::fmt;

/// A resource snapshot: comparable, cloneable, and able to say whether it
/// describes something that exists remotely.
pub trait Snapshot: Compare + Clone + fmt::Debug {
    /// Whether the snapshot describes a remotely existing object
    fn exists(&self) -> bool;
}

/// Core trait for reconciled resources
///
/// The provider is passed into every phase that talks to it, so resources
/// hold no client and tests can substitute any implementation.
///
/// # Example
///
/// ```ignore
/// impl Resource for InstanceProfile {
///     type Snapshot = InstanceProfile;
///     type Provider = dyn iamkit::Backend;
///     type Error = iamkit::Error;
///
///     fn resource_type(&self) -> &'static str { "instance_profile" }
///     fn id(&self) -> String { self.shared.name.clone() }
///
///     fn expected(&self, cluster: &Cluster) -> Result<Rendered<Self>, Self::Error> { .. }
///     fn actual(&self, iam: &Self::Provider, cluster: &Cluster) -> Result<Rendered<Self>, Self::Error> { .. }
///     fn apply(&self, iam: &Self::Provider, actual: &Self, expected: &Self, cluster: &Cluster)
///         -> Result<Rendered<Self>, Self::Error> { .. }
///     fn delete(&self, iam: &Self::Provider, actual: &Self, cluster: &Cluster)
///         -> Result<Rendered<Self>, Self::Error> { .. }
/// }
/// ```
pub trait Resource: fmt::Debug {
    /// Snapshot type produced by every phase
    type Snapshot: Snapshot;

    /// Provider client the resource talks to
    type Provider: ?Sized;

    /// Error returned by provider-facing phases
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resource type category, e.g. "instance_profile"
    fn resource_type(&self) -> &'static str;

    /// Name of the resource, unique within its type
    fn id(&self) -> String;

    /// Human-readable `type.id` label
    fn label(&self) -> String {
        format!("{}.{}", self.resource_type(), self.id())
    }

    /// Compute the expected snapshot. Pure and deterministic.
    fn expected(&self, cluster: &Cluster) -> Result<Rendered<Self::Snapshot>, Self::Error>;

    /// Read the provider and build the actual snapshot.
    fn actual(
        &self,
        provider: &Self::Provider,
        cluster: &Cluster,
    ) -> Result<Rendered<Self::Snapshot>, Self::Error>;

    /// Converge the provider from `actual` towards `expected`.
    ///
    /// When the two compare equal this must return without provider calls.
    fn apply(
        &self,
        provider: &Self::Provider,
        actual: &Self::Snapshot,
        expected: &Self::Snapshot,
        cluster: &Cluster,
    ) -> Result<Rendered<Self::Snapshot>, Self::Error>;

    /// Remove the resource from the provider and from the cluster.
    fn delete(
        &self,
        provider: &Self::Provider,
        actual: &Self::Snapshot,
        cluster: &Cluster,
    ) -> Result<Rendered<Self::Snapshot>, Self::Error>;
}
