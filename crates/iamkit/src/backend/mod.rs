//! Backend abstraction for IAM operations.
//!
//! The [`Backend`] trait defines the interface for talking to the identity
//! and access management API, allowing for different implementations (real
//! `aws` CLI, in-memory for testing). Every method returns a classified
//! [`Error`](crate::Error) on failure.

pub mod aws;
pub mod memory;

use crate::error::Result;
use crate::types::{InstanceProfileInfo, RoleInfo, Tags};

/// Backend trait for IAM operations.
pub trait Backend: Send + Sync {
    /// Read an instance profile by name.
    fn get_instance_profile(&self, name: &str) -> Result<InstanceProfileInfo>;

    /// Read a role by name.
    fn get_role(&self, role_name: &str) -> Result<RoleInfo>;

    /// List the inline policy names of a role.
    fn list_role_policies(&self, role_name: &str) -> Result<Vec<String>>;

    /// Read an inline policy document. The returned document may be URL-encoded.
    fn get_role_policy(&self, role_name: &str, policy_name: &str) -> Result<String>;

    /// Create an instance profile.
    fn create_instance_profile(
        &self,
        name: &str,
        path: &str,
        tags: &Tags,
    ) -> Result<InstanceProfileInfo>;

    /// Create a role with the given trust document.
    fn create_role(
        &self,
        name: &str,
        trust_document: &str,
        path: &str,
        tags: &Tags,
    ) -> Result<RoleInfo>;

    /// Write or overwrite an inline policy on a role.
    fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> Result<()>;

    /// Attach a role to an instance profile.
    fn add_role_to_instance_profile(&self, profile_name: &str, role_name: &str) -> Result<()>;

    /// Delete an inline policy from a role.
    fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> Result<()>;

    /// Detach a role from an instance profile.
    fn remove_role_from_instance_profile(&self, profile_name: &str, role_name: &str)
    -> Result<()>;

    /// Delete a role.
    fn delete_role(&self, role_name: &str) -> Result<()>;

    /// Delete an instance profile.
    fn delete_instance_profile(&self, name: &str) -> Result<()>;
}

/// Get the default backend (real `aws` CLI).
pub fn default_backend() -> Result<aws::AwsCliBackend> {
    aws::AwsCliBackend::new()
}
