//! Cluster specification files
//!
//! A cluster spec names the cluster, its server pools, and which pools get
//! an instance profile. It is written in TOML or JSON (chosen by file
//! extension) and resolved against the stored defaults into a
//! [`declarative::Cluster`] plus the instance-profile resources to reconcile.
//!
//! ```toml
//! name = "demo"
//!
//! [[pools]]
//! name = "master"
//! kind = "master"
//! instance_profile = {}
//!
//! [[pools]]
//! name = "node"
//! max_count = 4
//!
//! [pools.instance_profile]
//! role = "demo-workers"
//! policies = [{ name = "node-policy", document_file = "policies/node.json" }]
//! ```

use crate::defaults::{AwsProfile, ProfileRequest};
use crate::resource::{InstanceProfile, Policy, Role};
use anyhow::{Context, Result, bail};
use declarative::{Cluster, PoolKind, ServerPool};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Names IAM accepts for profiles, roles and policies
static IAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_+=,.@-]{1,64}$").expect("static regex"));

pub const MASTER_POLICY_NAME: &str = "master-policy";
pub const NODE_POLICY_NAME: &str = "node-policy";

pub const MASTER_POLICY: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":["ec2:*","elasticloadbalancing:*","ecr:GetAuthorizationToken","ecr:BatchCheckLayerAvailability","ecr:GetDownloadUrlForLayer","ecr:GetRepositoryPolicy","ecr:DescribeRepositories","ecr:ListImages","ecr:BatchGetImage","autoscaling:DescribeAutoScalingGroups","autoscaling:UpdateAutoScalingGroup"],"Resource":"*"}]}"#;

pub const NODE_POLICY: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":["ec2:Describe*","ecr:GetAuthorizationToken","ecr:BatchCheckLayerAvailability","ecr:GetDownloadUrlForLayer","ecr:GetRepositoryPolicy","ecr:DescribeRepositories","ecr:ListImages","ecr:BatchGetImage","autoscaling:DescribeAutoScalingGroups","autoscaling:DescribeAutoScalingInstances","autoscaling:SetDesiredCapacity","autoscaling:TerminateInstanceInAutoScalingGroup"],"Resource":"*"}]}"#;

/// Top-level cluster spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,

    /// Overrides the stored default location
    #[serde(default)]
    pub location: String,

    /// Overrides for the stored defaults, applied to this cluster only
    #[serde(default)]
    pub defaults: ProfileRequest,

    #[serde(default)]
    pub pools: Vec<PoolSpec>,

    /// Directory relative policy files are resolved against
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// One server pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSpec {
    pub name: String,

    #[serde(default)]
    pub kind: PoolKind,

    #[serde(default)]
    pub instance_type: Option<String>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub min_count: Option<u32>,

    #[serde(default)]
    pub max_count: Option<u32>,

    #[serde(default)]
    pub spot_price: Option<String>,

    /// Present when the pool needs an instance profile
    #[serde(default)]
    pub instance_profile: Option<ProfileSpec>,
}

/// Instance profile settings; every field has a default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSpec {
    pub name: Option<String>,
    pub role: Option<String>,
    pub policies: Vec<PolicySpec>,
}

/// An inline policy, given inline or read from a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySpec {
    pub name: String,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub document_file: Option<String>,
}

/// Everything needed to reconcile a cluster
#[derive(Debug, Clone)]
pub struct Desired {
    pub cluster: Cluster,
    pub profiles: Vec<InstanceProfile>,
}

impl ClusterSpec {
    /// Load a spec, choosing JSON or TOML by extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read cluster spec: {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let mut spec: Self = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in cluster spec: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in cluster spec: {}", path.display()))?
        };
        spec.base_dir = path.parent().map(Path::to_path_buf);
        log::debug!("Loaded cluster spec {} from {}", spec.name, path.display());
        Ok(spec)
    }

    /// Reject specs that would fail or collide at the provider
    pub fn validate(&self) -> Result<()> {
        check_name("cluster", &self.name)?;
        if self.pools.is_empty() {
            bail!("Cluster '{}' has no pools", self.name);
        }

        let mut pools = HashSet::new();
        let mut profiles = HashSet::new();
        let mut roles = HashSet::new();
        for pool in &self.pools {
            check_name("pool", &pool.name)?;
            if !pools.insert(pool.name.as_str()) {
                bail!("Duplicate pool name '{}'", pool.name);
            }
            if let (Some(min), Some(max)) = (pool.min_count, pool.max_count)
                && min > max
            {
                bail!("Pool '{}': min_count {min} exceeds max_count {max}", pool.name);
            }

            let Some(profile) = &pool.instance_profile else {
                continue;
            };
            let profile_name = self.profile_name(pool);
            check_name("instance profile", &profile_name)?;
            let role_name = self.role_name(pool);
            check_name("role", &role_name)?;
            if !profiles.insert(profile_name.clone()) {
                bail!("Instance profile '{profile_name}' is used by more than one pool");
            }
            if !roles.insert(role_name.clone()) {
                bail!("Role '{role_name}' is used by more than one pool");
            }

            let mut policies = HashSet::new();
            for policy in &profile.policies {
                check_name("policy", &policy.name)?;
                if !policies.insert(policy.name.as_str()) {
                    bail!("Pool '{}': duplicate policy name '{}'", pool.name, policy.name);
                }
                match (&policy.document, &policy.document_file) {
                    (Some(_), Some(_)) => bail!(
                        "Policy '{}': set either document or document_file, not both",
                        policy.name
                    ),
                    (None, None) => bail!("Policy '{}' has no document", policy.name),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn profile_name(&self, pool: &PoolSpec) -> String {
        pool.instance_profile
            .as_ref()
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| format!("{}-{}-profile", self.name, pool.name))
    }

    fn role_name(&self, pool: &PoolSpec) -> String {
        pool.instance_profile
            .as_ref()
            .and_then(|p| p.role.clone())
            .unwrap_or_else(|| format!("{}-{}-role", self.name, pool.name))
    }

    /// Resolve against `defaults` into a cluster and its resources
    pub fn build(&self, defaults: &AwsProfile) -> Result<Desired> {
        self.validate()?;

        let resolved = defaults.updated(&self.defaults).updated(&ProfileRequest {
            location: self.location.clone(),
            ..Default::default()
        });
        resolved.validate()?;

        let mut cluster = Cluster::new(&self.name).with_location(&resolved.location);
        let mut profiles = Vec::new();

        for pool in &self.pools {
            cluster = cluster.with_server_pool(self.server_pool(pool, &resolved));

            if let Some(profile) = &pool.instance_profile {
                let policies = if profile.policies.is_empty() {
                    vec![builtin_policy(pool.kind)]
                } else {
                    profile
                        .policies
                        .iter()
                        .map(|p| self.policy(p))
                        .collect::<Result<Vec<_>>>()?
                };
                profiles.push(InstanceProfile::new(
                    self.profile_name(pool),
                    Role::new(self.role_name(pool), policies),
                    &pool.name,
                ));
            }
        }

        Ok(Desired { cluster, profiles })
    }

    fn server_pool(&self, pool: &PoolSpec, resolved: &AwsProfile) -> ServerPool {
        let mut server_pool = ServerPool::new(&pool.name, pool.kind);
        match pool.kind {
            PoolKind::Master => {
                server_pool.instance_type = resolved.master_instance_type.clone();
                server_pool.image = resolved.master_image.clone();
                server_pool.min_count = 1;
                server_pool.max_count = 1;
            }
            PoolKind::Node => {
                server_pool.instance_type = resolved.node_instance_type.clone();
                server_pool.image = resolved.node_image.clone();
                server_pool.min_count = resolved.node_min_count;
                server_pool.max_count = resolved.node_max_count;
                server_pool.spot_price = Some(resolved.node_spot_price.clone())
                    .filter(|price| !price.is_empty());
            }
        }

        if let Some(instance_type) = &pool.instance_type {
            server_pool.instance_type = instance_type.clone();
        }
        if let Some(image) = &pool.image {
            server_pool.image = image.clone();
        }
        if let Some(min) = pool.min_count {
            server_pool.min_count = min;
        }
        if let Some(max) = pool.max_count {
            server_pool.max_count = max;
        }
        if let Some(price) = &pool.spot_price {
            server_pool.spot_price = Some(price.clone()).filter(|p| !p.is_empty());
        }
        server_pool
    }

    fn policy(&self, spec: &PolicySpec) -> Result<Policy> {
        let raw = match (&spec.document, &spec.document_file) {
            (Some(document), _) => document.clone(),
            (None, Some(file)) => {
                let path = self.resolve(file);
                fs::read_to_string(&path).with_context(|| {
                    format!("Could not read policy document: {}", path.display())
                })?
            }
            (None, None) => bail!("Policy '{}' has no document", spec.name),
        };
        let document = canonical_document(&raw)
            .with_context(|| format!("Policy '{}' is not valid JSON", spec.name))?;
        Ok(Policy::new(&spec.name, document))
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = crate::paths::expand(file);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

fn check_name(what: &str, name: &str) -> Result<()> {
    if !IAM_NAME.is_match(name) {
        bail!(
            "Invalid {what} name '{name}': use 1-64 letters, digits or any of +=,.@_-"
        );
    }
    Ok(())
}

/// The built-in policy for a pool kind
pub fn builtin_policy(kind: PoolKind) -> Policy {
    match kind {
        PoolKind::Master => Policy::new(MASTER_POLICY_NAME, MASTER_POLICY),
        PoolKind::Node => Policy::new(NODE_POLICY_NAME, NODE_POLICY),
    }
}

/// Re-serialize a JSON document compactly, keeping key order.
///
/// Documents read back from the provider are compact, so stored and
/// expected documents compare byte for byte.
pub fn canonical_document(raw: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(serde_json::to_string(&value)?)
}
