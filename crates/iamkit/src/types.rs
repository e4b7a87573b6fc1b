//! Core types for IAM operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Path used for every created profile and role.
pub const DEFAULT_PATH: &str = "/";

/// Service principal of the compute service allowed to assume node roles.
pub const COMPUTE_SERVICE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Description attached to created roles.
pub const ROLE_DESCRIPTION: &str = "Kubeforge Role";

/// Tag key carrying the resource display name.
pub const TAG_NAME: &str = "Name";

/// Tag key carrying the owning cluster name.
pub const TAG_CLUSTER: &str = "KubernetesCluster";

/// Resource tags, ordered by key.
pub type Tags = BTreeMap<String, String>;

/// Trust policy letting `principal` assume a role.
///
/// The literal must stay byte-for-byte stable: clusters provisioned earlier
/// carry this exact document.
pub fn assume_role_policy(principal: &str) -> String {
    format!(
        r#"{{"Version":"2012-10-17","Statement":[{{"Effect":"Allow","Principal":{{"Service":"{principal}"}},"Action":"sts:AssumeRole"}}]}}"#
    )
}

/// Build the traceability tag pair for a resource owned by `cluster`.
pub fn ownership_tags(name: &str, cluster: &str) -> Tags {
    let mut tags = Tags::new();
    tags.insert(TAG_NAME.to_string(), name.to_string());
    tags.insert(TAG_CLUSTER.to_string(), cluster.to_string());
    tags
}

/// An instance profile as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceProfileInfo {
    /// Profile name
    pub name: String,
    /// Provider-assigned id
    pub id: String,
    /// Names of the roles attached to the profile
    pub roles: Vec<String>,
}

/// A role as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    /// Role name
    pub name: String,
    /// Provider-assigned id
    pub id: String,
}
