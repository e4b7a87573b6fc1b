//! Node instance profile resource
//!
//! The profile owns exactly one role, and the role owns an ordered list of
//! inline policies. Apply creates the chain top down:
//!
//! 1. instance profile
//! 2. role, trusted by the compute service
//! 3. every expected inline policy, then removal of policies no longer expected
//! 4. role attached to the profile
//!
//! Delete walks it bottom up. Both sequences tolerate steps that already
//! happened, so an interrupted run is finished by running it again.

use declarative::{
    Cluster, Compare, DiffReport, IamInstanceProfile, IamPolicy, IamRole, Rendered, Resource,
    Shared, Snapshot, Warning, is_equal,
};
use iamkit::{
    Backend, COMPUTE_SERVICE_PRINCIPAL, DEFAULT_PATH, Error, ErrorKind, assume_role_policy,
    ownership_tags,
};
use serde::Serialize;
use std::borrow::Cow;

use super::IamClient;

/// An inline role policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub shared: Shared,
    pub document: String,
}

impl Policy {
    pub fn new(name: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            shared: Shared::new(name, Default::default()),
            document: document.into(),
        }
    }
}

/// A role with its inline policies, in the order they are put
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Role {
    pub shared: Shared,
    pub policies: Vec<Policy>,
}

impl Role {
    pub fn new(name: impl Into<String>, policies: Vec<Policy>) -> Self {
        Self {
            shared: Shared::new(name, Default::default()),
            policies,
        }
    }
}

/// Instance profile for the server pool named `server_pool`
///
/// The same type is the desired configuration and every phase's snapshot.
/// An absent role compares equal to an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceProfile {
    pub shared: Shared,
    pub role: Option<Role>,
    pub server_pool: String,
}

impl InstanceProfile {
    pub fn new(name: impl Into<String>, role: Role, server_pool: impl Into<String>) -> Self {
        Self {
            shared: Shared::new(name, Default::default()),
            role: Some(role),
            server_pool: server_pool.into(),
        }
    }

    /// Snapshot of a profile that does not exist remotely
    fn absent(&self, cluster: &str) -> Self {
        Self {
            shared: tagged(&self.shared.name, cluster),
            role: None,
            server_pool: self.server_pool.clone(),
        }
    }

    /// The reference stored on the server pool
    fn to_cluster_profile(&self) -> IamInstanceProfile {
        IamInstanceProfile {
            name: self.shared.name.clone(),
            identifier: self.shared.identifier.clone(),
            role: self.role.as_ref().map(|role| IamRole {
                name: role.shared.name.clone(),
                identifier: role.shared.identifier.clone(),
                policies: role
                    .policies
                    .iter()
                    .map(|p| IamPolicy {
                        name: p.shared.name.clone(),
                        identifier: p.shared.identifier.clone(),
                        document: p.document.clone(),
                    })
                    .collect(),
            }),
        }
    }

    /// Place `snapshot` on the matching server pool.
    ///
    /// A missing pool leaves the cluster untouched and yields a warning.
    fn render(&self, snapshot: Self, cluster: &Cluster) -> Rendered<Self> {
        let reference = snapshot.exists().then(|| snapshot.to_cluster_profile());
        match cluster.update_server_pool(&self.server_pool, |pool| {
            pool.instance_profile = reference;
        }) {
            Some(next) => Rendered::new(next, snapshot),
            None => {
                let warning = Warning::OrphanedResource {
                    resource: self.label(),
                    server_pool: self.server_pool.clone(),
                };
                log::warn!("{warning}");
                Rendered::new(cluster.clone(), snapshot).with_warning(warning)
            }
        }
    }

    fn desired_role_name(&self) -> Option<&str> {
        self.role.as_ref().map(|r| r.shared.name.as_str())
    }

    fn read_role(
        &self,
        iam: &dyn Backend,
        role_name: &str,
        cluster: &str,
    ) -> iamkit::Result<Option<Role>> {
        let Some(info) = tolerate(iam.get_role(role_name), ErrorKind::NotFound)? else {
            log::debug!("Role {role_name} is attached but no longer exists");
            return Ok(None);
        };

        let mut role = Role {
            shared: tagged(role_name, cluster).with_identifier(info.id),
            policies: Vec::new(),
        };
        for policy_name in iam.list_role_policies(role_name)? {
            let Some(raw) = tolerate(
                iam.get_role_policy(role_name, &policy_name),
                ErrorKind::NotFound,
            )?
            else {
                continue;
            };
            role.policies.push(Policy {
                shared: tagged(&policy_name, cluster).with_identifier(&policy_name),
                document: decode_document(raw)?,
            });
        }
        Ok(Some(role))
    }
}

/// Shared fields carrying the ownership tags
fn tagged(name: &str, cluster: &str) -> Shared {
    Shared::new(name, ownership_tags(name, cluster))
}

/// Turn an error of the given kind into `Ok(None)`.
fn tolerate<T>(result: iamkit::Result<T>, kind: ErrorKind) -> iamkit::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == kind => {
            log::debug!("Tolerated {}: {e}", kind.description());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Undo the URL encoding IAM applies to policy documents.
///
/// Documents that already read as JSON are returned unchanged.
fn decode_document(raw: String) -> iamkit::Result<String> {
    if raw.trim_start().starts_with('{') {
        return Ok(raw);
    }
    urlencoding::decode(&raw.replace('+', " "))
        .map(Cow::into_owned)
        .map_err(|e| {
            Error::from_code(
                "MalformedPolicyDocument",
                format!("policy document is not valid UTF-8 once decoded: {e}"),
            )
        })
}

impl Compare for Policy {
    fn compare(&self, expected: &Self, report: &mut DiffReport) {
        self.shared.compare(&expected.shared, report);
        report.field("document", &self.document, &expected.document);
    }
}

impl Compare for Role {
    fn compare(&self, expected: &Self, report: &mut DiffReport) {
        self.shared.compare(&expected.shared, report);
        report.sequence("policies", &self.policies, &expected.policies);
    }
}

impl Compare for InstanceProfile {
    fn compare(&self, expected: &Self, report: &mut DiffReport) {
        self.shared.compare(&expected.shared, report);
        report.field("server_pool", &self.server_pool, &expected.server_pool);
        report.nested("role", &self.role, &expected.role);
    }
}

impl Snapshot for InstanceProfile {
    fn exists(&self) -> bool {
        self.shared.exists()
    }
}

impl Resource for InstanceProfile {
    type Snapshot = Self;
    type Provider = IamClient;
    type Error = Error;

    fn resource_type(&self) -> &'static str {
        "instance_profile"
    }

    fn id(&self) -> String {
        self.shared.name.clone()
    }

    fn expected(&self, cluster: &Cluster) -> iamkit::Result<Rendered<Self>> {
        log::debug!("{}: expected", self.label());
        let expected = Self {
            shared: tagged(&self.shared.name, &cluster.name)
                .with_identifier(&self.shared.identifier),
            role: self.role.as_ref().map(|role| Role {
                shared: tagged(&role.shared.name, &cluster.name),
                policies: role
                    .policies
                    .iter()
                    .map(|p| Policy {
                        shared: tagged(&p.shared.name, &cluster.name),
                        document: p.document.clone(),
                    })
                    .collect(),
            }),
            server_pool: self.server_pool.clone(),
        };
        Ok(Rendered::new(cluster.clone(), expected))
    }

    fn actual(&self, iam: &IamClient, cluster: &Cluster) -> iamkit::Result<Rendered<Self>> {
        log::debug!("{}: actual", self.label());
        let mut observed = self.absent(&cluster.name);

        let Some(info) = tolerate(
            iam.get_instance_profile(&self.shared.name),
            ErrorKind::NotFound,
        )?
        else {
            return Ok(self.render(observed, cluster));
        };

        observed.shared.identifier = info.id;
        if let Some(role_name) = info.roles.first() {
            observed.role = self.read_role(iam, role_name, &cluster.name)?;
        }
        Ok(self.render(observed, cluster))
    }

    fn apply(
        &self,
        iam: &IamClient,
        actual: &Self,
        expected: &Self,
        cluster: &Cluster,
    ) -> iamkit::Result<Rendered<Self>> {
        if is_equal(actual, expected) {
            log::debug!("{}: already converged", self.label());
            return Ok(Rendered::new(cluster.clone(), actual.clone()));
        }

        let cluster_name = cluster.name.as_str();
        let profile_name = expected.shared.name.as_str();
        let mut applied = expected.clone();

        let profile_id = match tolerate(
            iam.create_instance_profile(
                profile_name,
                DEFAULT_PATH,
                &ownership_tags(profile_name, cluster_name),
            ),
            ErrorKind::AlreadyExists,
        )? {
            Some(info) => {
                log::info!("Created instance profile {profile_name}");
                info.id
            }
            None if actual.shared.exists() => actual.shared.identifier.clone(),
            None => iam.get_instance_profile(profile_name)?.id,
        };
        applied.shared.identifier = profile_id;

        if let Some(role) = applied.role.as_mut() {
            let role_name = role.shared.name.clone();
            let actual_role = actual
                .role
                .as_ref()
                .filter(|r| r.shared.name == role_name);

            role.shared.identifier = match tolerate(
                iam.create_role(
                    &role_name,
                    &assume_role_policy(COMPUTE_SERVICE_PRINCIPAL),
                    DEFAULT_PATH,
                    &ownership_tags(&role_name, cluster_name),
                ),
                ErrorKind::AlreadyExists,
            )? {
                Some(info) => {
                    log::info!("Created role {role_name}");
                    info.id
                }
                None => match actual_role.filter(|r| r.shared.exists()) {
                    Some(r) => r.shared.identifier.clone(),
                    None => iam.get_role(&role_name)?.id,
                },
            };

            // LimitExceeded here means the policy quota is full; the next
            // pass will still see the difference.
            for policy in &mut role.policies {
                tolerate(
                    iam.put_role_policy(&role_name, &policy.shared.name, &policy.document),
                    ErrorKind::LimitExceeded,
                )?;
                policy.shared.identifier = policy.shared.name.clone();
                log::info!("Put policy {} on role {role_name}", policy.shared.name);
            }

            if let Some(previous) = actual_role {
                for stale in previous
                    .policies
                    .iter()
                    .filter(|p| !role.policies.iter().any(|e| e.shared.name == p.shared.name))
                {
                    tolerate(
                        iam.delete_role_policy(&role_name, &stale.shared.name),
                        ErrorKind::NotFound,
                    )?;
                    log::info!(
                        "Removed policy {} from role {role_name}",
                        stale.shared.name
                    );
                }
            }

            if let Some(other) = actual.role.as_ref().filter(|r| r.shared.name != role_name) {
                tolerate(
                    iam.remove_role_from_instance_profile(profile_name, &other.shared.name),
                    ErrorKind::NotFound,
                )?;
                log::info!(
                    "Detached role {} from instance profile {profile_name}",
                    other.shared.name
                );
            }

            // A profile holds one role, so re-attaching reports LimitExceeded.
            tolerate(
                iam.add_role_to_instance_profile(profile_name, &role_name),
                ErrorKind::LimitExceeded,
            )?;
            log::info!("Attached role {role_name} to instance profile {profile_name}");
        }

        Ok(self.render(applied, cluster))
    }

    fn delete(
        &self,
        iam: &IamClient,
        actual: &Self,
        cluster: &Cluster,
    ) -> iamkit::Result<Rendered<Self>> {
        let profile_name = self.shared.name.as_str();

        let (role_name, policy_names): (Option<String>, Vec<String>) = match actual.role.as_ref() {
            Some(role) => (
                Some(role.shared.name.clone()),
                role.policies.iter().map(|p| p.shared.name.clone()).collect(),
            ),
            None => match self.desired_role_name() {
                Some(name) => {
                    let listed = tolerate(iam.list_role_policies(name), ErrorKind::NotFound)?;
                    (Some(name.to_string()), listed.unwrap_or_default())
                }
                None => (None, Vec::new()),
            },
        };

        if let Some(role_name) = role_name.as_deref() {
            for policy_name in &policy_names {
                tolerate(
                    iam.delete_role_policy(role_name, policy_name),
                    ErrorKind::NotFound,
                )?;
            }
            tolerate(
                iam.remove_role_from_instance_profile(profile_name, role_name),
                ErrorKind::NotFound,
            )?;
            tolerate(iam.delete_role(role_name), ErrorKind::NotFound)?;
        }
        tolerate(iam.delete_instance_profile(profile_name), ErrorKind::NotFound)?;
        log::info!("Deleted instance profile {profile_name}");

        Ok(self.render(self.absent(&cluster.name), cluster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{
        ConvergeOptions, NoProgress, PoolKind, ReconcileResult, RetryConfig, ServerPool,
        converge, teardown,
    };
    use iamkit::backend::memory::{MemoryBackend, Operation};

    const DOC: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":"ec2:Describe*","Resource":"*"}]}"#;

    fn cluster() -> Cluster {
        Cluster::new("demo")
            .with_location("eu-west-1")
            .with_server_pool(ServerPool::new("demo-node", PoolKind::Node))
    }

    fn profile_with(policies: &[(&str, &str)]) -> InstanceProfile {
        InstanceProfile::new(
            "demo-node-profile",
            Role::new(
                "demo-node-role",
                policies.iter().map(|(n, d)| Policy::new(*n, *d)).collect(),
            ),
            "demo-node",
        )
    }

    fn profile() -> InstanceProfile {
        profile_with(&[("node-policy", DOC)])
    }

    /// Run expected, actual and apply once, returning (actual, applied)
    fn pass(
        resource: &InstanceProfile,
        iam: &MemoryBackend,
        cluster: &Cluster,
    ) -> (Rendered<InstanceProfile>, Rendered<InstanceProfile>) {
        let expected = resource.expected(cluster).unwrap();
        let actual = resource.actual(iam, &expected.cluster).unwrap();
        let applied = resource
            .apply(iam, &actual.resource, &expected.resource, &actual.cluster)
            .unwrap();
        (actual, applied)
    }

    fn operations(iam: &MemoryBackend) -> Vec<Operation> {
        iam.mutating_calls().iter().map(|c| c.operation).collect()
    }

    #[test]
    fn test_expected_is_pure_and_tagged() {
        let c = cluster();
        let rendered = profile().expected(&c).unwrap();

        assert_eq!(rendered.cluster, c);
        assert!(rendered.warnings.is_empty());
        let tags = &rendered.resource.shared.tags;
        assert_eq!(tags.get("Name").map(String::as_str), Some("demo-node-profile"));
        assert_eq!(tags.get("KubernetesCluster").map(String::as_str), Some("demo"));
        let role = rendered.resource.role.unwrap();
        assert_eq!(
            role.shared.tags.get("Name").map(String::as_str),
            Some("demo-node-role")
        );
    }

    #[test]
    fn test_actual_absent_is_not_an_error() {
        let iam = MemoryBackend::new();
        let rendered = profile().actual(&iam, &cluster()).unwrap();
        assert!(!rendered.resource.exists());
        assert!(rendered.resource.role.is_none());
        assert!(
            rendered
                .cluster
                .server_pool("demo-node")
                .unwrap()
                .instance_profile
                .is_none()
        );
    }

    #[test]
    fn test_cold_start_call_order() {
        let iam = MemoryBackend::new();
        let c = cluster();
        let (_, applied) = pass(&profile(), &iam, &c);

        assert_eq!(
            operations(&iam),
            vec![
                Operation::CreateInstanceProfile,
                Operation::CreateRole,
                Operation::PutRolePolicy,
                Operation::AddRoleToInstanceProfile,
            ]
        );
        let calls = iam.mutating_calls();
        assert_eq!(calls[2].target, "demo-node-role/node-policy");
        assert_eq!(calls[3].target, "demo-node-profile/demo-node-role");
        assert_eq!(
            iam.trust_document("demo-node-role").unwrap(),
            r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"Service":"ec2.amazonaws.com"},"Action":"sts:AssumeRole"}]}"#
        );
        assert_eq!(
            iam.instance_profile_tags("demo-node-profile").unwrap(),
            ownership_tags("demo-node-profile", "demo")
        );
        assert_eq!(
            iam.role_tags("demo-node-role").unwrap(),
            ownership_tags("demo-node-role", "demo")
        );

        let pool = applied.cluster.server_pool("demo-node").unwrap();
        let reference = pool.instance_profile.as_ref().unwrap();
        assert_eq!(reference.name, "demo-node-profile");
        assert!(!reference.identifier.is_empty());
        let role = reference.role.as_ref().unwrap();
        assert_eq!(role.name, "demo-node-role");
        assert_eq!(role.policies[0].name, "node-policy");
        assert_eq!(role.policies[0].document, DOC);
        assert!(applied.cluster.revision() > c.revision());
        assert!(c.server_pool("demo-node").unwrap().instance_profile.is_none());
    }

    #[test]
    fn test_second_apply_is_a_no_op() {
        let iam = MemoryBackend::new();
        let (_, first) = pass(&profile(), &iam, &cluster());
        iam.clear_calls();

        let (actual, second) = pass(&profile(), &iam, &first.cluster);

        assert!(iam.mutating_calls().is_empty());
        assert_eq!(second.cluster, first.cluster);
        assert_eq!(actual.cluster, first.cluster);
    }

    #[test]
    fn test_actual_after_apply_matches_expected() {
        let iam = MemoryBackend::new();
        let resource = profile_with(&[("p1", DOC), ("p2", r#"{"Version":"2012-10-17"}"#)]);
        let (_, applied) = pass(&resource, &iam, &cluster());

        let expected = resource.expected(&applied.cluster).unwrap();
        let actual = resource.actual(&iam, &applied.cluster).unwrap();
        assert!(is_equal(&actual.resource, &expected.resource));
        assert!(actual.resource.exists());
    }

    #[test]
    fn test_policy_order_is_significant() {
        let c = cluster();
        let forward = profile_with(&[("p1", DOC), ("p2", DOC)]).expected(&c).unwrap();
        let reversed = profile_with(&[("p2", DOC), ("p1", DOC)]).expected(&c).unwrap();
        assert!(!is_equal(&forward.resource, &reversed.resource));
    }

    #[test]
    fn test_identifiers_do_not_affect_equality() {
        let c = cluster();
        let mut with_id = profile().expected(&c).unwrap().resource;
        with_id.shared.identifier = "AIPA00000001".into();
        let without_id = profile().expected(&c).unwrap().resource;
        assert!(is_equal(&with_id, &without_id));
    }

    #[test]
    fn test_apply_tolerates_existing_profile_and_role() {
        let iam = MemoryBackend::new();
        let tags = ownership_tags("x", "demo");
        iam.create_instance_profile("demo-node-profile", DEFAULT_PATH, &tags)
            .unwrap();
        iam.create_role(
            "demo-node-role",
            &assume_role_policy(COMPUTE_SERVICE_PRINCIPAL),
            DEFAULT_PATH,
            &tags,
        )
        .unwrap();
        iam.clear_calls();

        let (actual, applied) = pass(&profile(), &iam, &cluster());

        assert!(actual.resource.exists());
        assert!(actual.resource.role.is_none());
        assert_eq!(
            applied.resource.shared.identifier,
            actual.resource.shared.identifier
        );
        let role = applied.resource.role.as_ref().unwrap();
        assert!(role.shared.exists());
        assert!(iam.calls().iter().any(|c| c.operation == Operation::AddRoleToInstanceProfile));
    }

    #[test]
    fn test_apply_tolerates_limit_exceeded_on_put_and_attach() {
        let iam = MemoryBackend::new();
        iam.fail_next(Operation::PutRolePolicy, ErrorKind::LimitExceeded);
        iam.fail_next(Operation::AddRoleToInstanceProfile, ErrorKind::LimitExceeded);

        let c = cluster();
        let expected = profile().expected(&c).unwrap();
        let actual = profile().actual(&iam, &c).unwrap();
        let applied = profile().apply(&iam, &actual.resource, &expected.resource, &c);
        assert!(applied.is_ok());
    }

    #[test]
    fn test_provider_error_aborts_apply() {
        let iam = MemoryBackend::new();
        iam.fail_next(Operation::CreateRole, ErrorKind::Provider);

        let c = cluster();
        let expected = profile().expected(&c).unwrap();
        let actual = profile().actual(&iam, &c).unwrap();
        let err = profile()
            .apply(&iam, &actual.resource, &expected.resource, &c)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(
            operations(&iam),
            vec![Operation::CreateInstanceProfile, Operation::CreateRole]
        );
        assert!(iam.has_instance_profile("demo-node-profile"));
    }

    #[test]
    fn test_provider_error_aborts_actual() {
        let iam = MemoryBackend::new();
        iam.fail_next(Operation::GetInstanceProfile, ErrorKind::Provider);
        assert!(profile().actual(&iam, &cluster()).is_err());
    }

    #[test]
    fn test_apply_removes_policies_no_longer_expected() {
        let iam = MemoryBackend::new();
        let (_, first) = pass(
            &profile_with(&[("node-policy", DOC), ("extra", DOC)]),
            &iam,
            &cluster(),
        );
        iam.clear_calls();

        pass(&profile(), &iam, &first.cluster);

        assert!(
            iam.mutating_calls()
                .iter()
                .any(|c| c.operation == Operation::DeleteRolePolicy
                    && c.target == "demo-node-role/extra")
        );
        assert_eq!(
            iam.list_role_policies("demo-node-role").unwrap(),
            vec!["node-policy".to_string()]
        );
    }

    #[test]
    fn test_apply_swaps_foreign_role() {
        let iam = MemoryBackend::new();
        let tags = ownership_tags("x", "demo");
        iam.create_instance_profile("demo-node-profile", DEFAULT_PATH, &tags)
            .unwrap();
        iam.create_role("other-role", "{}", DEFAULT_PATH, &tags)
            .unwrap();
        iam.add_role_to_instance_profile("demo-node-profile", "other-role")
            .unwrap();
        iam.clear_calls();

        let (actual, applied) = pass(&profile(), &iam, &cluster());

        assert_eq!(
            actual.resource.role.as_ref().map(|r| r.shared.name.as_str()),
            Some("other-role")
        );
        let calls = iam.mutating_calls();
        let detach = calls
            .iter()
            .position(|c| {
                c.operation == Operation::RemoveRoleFromInstanceProfile
                    && c.target == "demo-node-profile/other-role"
            })
            .unwrap();
        let attach = calls
            .iter()
            .position(|c| {
                c.operation == Operation::AddRoleToInstanceProfile
                    && c.target == "demo-node-profile/demo-node-role"
            })
            .unwrap();
        assert!(detach < attach);

        let after = profile().actual(&iam, &applied.cluster).unwrap();
        assert_eq!(
            after.resource.role.as_ref().map(|r| r.shared.name.as_str()),
            Some("demo-node-role")
        );
        assert!(iam.has_role("other-role"));
    }

    #[test]
    fn test_url_encoded_documents_are_decoded() {
        let iam = MemoryBackend::new().with_url_encoded_documents();
        let document = r#"{"Version": "2012-10-17", "Statement": []}"#;
        let resource = profile_with(&[("node-policy", document)]);
        pass(&resource, &iam, &cluster());

        let actual = resource.actual(&iam, &cluster()).unwrap();
        let role = actual.resource.role.unwrap();
        assert_eq!(role.policies[0].document, document);
    }

    #[test]
    fn test_decode_document_passes_json_through() {
        let json = r#"{"a":"b+c"}"#.to_string();
        assert_eq!(decode_document(json.clone()).unwrap(), json);
        assert_eq!(
            decode_document("%7B%22a%22%3A+1%7D".to_string()).unwrap(),
            r#"{"a": 1}"#
        );
    }

    #[test]
    fn test_orphan_render_leaves_cluster_unchanged() {
        let iam = MemoryBackend::new();
        let orphan = InstanceProfile::new(
            "demo-gpu-profile",
            Role::new("demo-gpu-role", vec![Policy::new("node-policy", DOC)]),
            "demo-gpu",
        );
        let c = cluster();
        let (actual, applied) = pass(&orphan, &iam, &c);

        assert_eq!(actual.cluster, c);
        assert_eq!(applied.cluster, c);
        assert_eq!(
            applied.warnings,
            vec![Warning::OrphanedResource {
                resource: "instance_profile.demo-gpu-profile".into(),
                server_pool: "demo-gpu".into(),
            }]
        );
        assert!(iam.has_instance_profile("demo-gpu-profile"));
    }

    #[test]
    fn test_delete_removes_everything() {
        let iam = MemoryBackend::new();
        let resource = profile();
        let (_, applied) = pass(&resource, &iam, &cluster());

        let actual = resource.actual(&iam, &applied.cluster).unwrap();
        let deleted = resource
            .delete(&iam, &actual.resource, &actual.cluster)
            .unwrap();

        assert!(!iam.has_instance_profile("demo-node-profile"));
        assert!(!iam.has_role("demo-node-role"));
        assert!(!deleted.resource.exists());
        assert!(
            deleted
                .cluster
                .server_pool("demo-node")
                .unwrap()
                .instance_profile
                .is_none()
        );

        let after = resource.actual(&iam, &deleted.cluster).unwrap();
        assert!(!after.resource.exists());
    }

    #[test]
    fn test_delete_when_absent_succeeds() {
        let iam = MemoryBackend::new();
        let resource = profile();
        let actual = resource.actual(&iam, &cluster()).unwrap();

        let first = resource.delete(&iam, &actual.resource, &actual.cluster);
        assert!(first.is_ok());
        let second = resource.delete(&iam, &actual.resource, &actual.cluster);
        assert!(second.is_ok());
    }

    #[test]
    fn test_delete_cleans_up_unattached_role() {
        let iam = MemoryBackend::new();
        iam.fail_next(Operation::AddRoleToInstanceProfile, ErrorKind::Provider);
        let resource = profile();
        let c = cluster();
        let expected = resource.expected(&c).unwrap();
        let actual = resource.actual(&iam, &c).unwrap();
        assert!(
            resource
                .apply(&iam, &actual.resource, &expected.resource, &c)
                .is_err()
        );

        let actual = resource.actual(&iam, &c).unwrap();
        assert!(actual.resource.role.is_none());
        resource
            .delete(&iam, &actual.resource, &actual.cluster)
            .unwrap();
        assert!(!iam.has_role("demo-node-role"));
        assert!(!iam.has_instance_profile("demo-node-profile"));
    }

    fn fast() -> ConvergeOptions {
        ConvergeOptions {
            max_passes: 3,
            retry: RetryConfig::new(3, std::time::Duration::from_millis(1), 1.0),
        }
    }

    #[test]
    fn test_converge_and_teardown_through_driver() {
        let iam = MemoryBackend::new();
        iam.fail_next(Operation::CreateRole, ErrorKind::Provider);
        let resource = profile();
        let client: &IamClient = &iam;

        let outcome = converge(
            &resource,
            client,
            &cluster(),
            &fast(),
            Error::is_retryable,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(outcome.result, ReconcileResult::Applied);
        assert_eq!(outcome.passes, 2);

        let gone = teardown(
            &resource,
            client,
            &outcome.cluster,
            &fast(),
            Error::is_retryable,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(gone.result, ReconcileResult::Deleted);
        assert!(!iam.has_instance_profile("demo-node-profile"));
    }
}
