//! Cloud resources reconciled by kubeforge
//!
//! Each resource implements [`declarative::Resource`] against the IAM
//! [`iamkit::Backend`]. The only kind today is the node instance profile,
//! which owns its role and the role's inline policies.

mod instance_profile;

pub use instance_profile::{InstanceProfile, Policy, Role};

/// The IAM client every resource is handed
pub type IamClient = dyn iamkit::Backend;
