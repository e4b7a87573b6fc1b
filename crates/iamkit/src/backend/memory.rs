//! In-memory IAM backend.
//!
//! Mirrors the IAM behaviours reconciliation depends on: name-keyed
//! entities, `EntityAlreadyExists` on duplicate creates, `NoSuchEntity` on
//! missing targets, the one-role-per-profile quota surfacing as
//! `LimitExceeded`, and `DeleteConflict` when deleting entities that still
//! have dependents. Every call is recorded, and faults can be queued per
//! operation to exercise error paths.

use crate::backend::Backend;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{InstanceProfileInfo, RoleInfo, Tags};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// An IAM operation, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read an instance profile
    GetInstanceProfile,
    /// Read a role
    GetRole,
    /// List inline policy names
    ListRolePolicies,
    /// Read an inline policy document
    GetRolePolicy,
    /// Create an instance profile
    CreateInstanceProfile,
    /// Create a role
    CreateRole,
    /// Write an inline policy
    PutRolePolicy,
    /// Attach a role to a profile
    AddRoleToInstanceProfile,
    /// Delete an inline policy
    DeleteRolePolicy,
    /// Detach a role from a profile
    RemoveRoleFromInstanceProfile,
    /// Delete a role
    DeleteRole,
    /// Delete an instance profile
    DeleteInstanceProfile,
}

impl Operation {
    /// Whether the operation changes provider state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::GetInstanceProfile | Self::GetRole | Self::ListRolePolicies | Self::GetRolePolicy
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation invoked
    pub operation: Operation,
    /// Target of the call, `profile`, `role`, `role/policy` or `profile/role`
    pub target: String,
}

#[derive(Debug, Clone)]
struct StoredProfile {
    id: String,
    roles: Vec<String>,
    tags: Tags,
}

#[derive(Debug, Clone)]
struct StoredRole {
    id: String,
    trust_document: String,
    policies: Vec<(String, String)>,
    tags: Tags,
}

#[derive(Debug, Default)]
struct State {
    profiles: BTreeMap<String, StoredProfile>,
    roles: BTreeMap<String, StoredRole>,
    calls: Vec<Call>,
    faults: HashMap<Operation, VecDeque<ErrorKind>>,
    next_id: u32,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:08}", self.next_id)
    }

    fn record(&mut self, operation: Operation, target: String) -> Result<()> {
        self.calls.push(Call { operation, target });
        match self.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(kind) => Err(injected(kind, operation)),
            None => Ok(()),
        }
    }

    fn role(&self, name: &str) -> Result<&StoredRole> {
        self.roles
            .get(name)
            .ok_or_else(|| not_found(format!("The role with name {name} cannot be found.")))
    }

    fn role_mut(&mut self, name: &str) -> Result<&mut StoredRole> {
        self.roles
            .get_mut(name)
            .ok_or_else(|| not_found(format!("The role with name {name} cannot be found.")))
    }

    fn profile_mut(&mut self, name: &str) -> Result<&mut StoredProfile> {
        self.profiles
            .get_mut(name)
            .ok_or_else(|| not_found(format!("Instance Profile {name} cannot be found.")))
    }
}

/// Backend that keeps IAM entities in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    url_encode_documents: bool,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return policy documents URL-encoded, the way the IAM API does.
    pub fn with_url_encoded_documents(mut self) -> Self {
        self.url_encode_documents = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call of `operation` fail with `kind` without touching state.
    pub fn fail_next(&self, operation: Operation, kind: ErrorKind) {
        self.lock()
            .faults
            .entry(operation)
            .or_default()
            .push_back(kind);
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Operations recorded so far that change state.
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation.is_mutating())
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Whether an instance profile exists.
    pub fn has_instance_profile(&self, name: &str) -> bool {
        self.lock().profiles.contains_key(name)
    }

    /// Whether a role exists.
    pub fn has_role(&self, name: &str) -> bool {
        self.lock().roles.contains_key(name)
    }

    /// Tags stored on a role.
    pub fn role_tags(&self, name: &str) -> Option<Tags> {
        self.lock().roles.get(name).map(|r| r.tags.clone())
    }

    /// Tags stored on an instance profile.
    pub fn instance_profile_tags(&self, name: &str) -> Option<Tags> {
        self.lock().profiles.get(name).map(|p| p.tags.clone())
    }

    /// Trust document stored on a role.
    pub fn trust_document(&self, role_name: &str) -> Option<String> {
        self.lock()
            .roles
            .get(role_name)
            .map(|r| r.trust_document.clone())
    }
}

impl Backend for MemoryBackend {
    fn get_instance_profile(&self, name: &str) -> Result<InstanceProfileInfo> {
        let mut state = self.lock();
        state.record(Operation::GetInstanceProfile, name.to_string())?;
        let profile = state.profile_mut(name)?;
        Ok(InstanceProfileInfo {
            name: name.to_string(),
            id: profile.id.clone(),
            roles: profile.roles.clone(),
        })
    }

    fn get_role(&self, role_name: &str) -> Result<RoleInfo> {
        let mut state = self.lock();
        state.record(Operation::GetRole, role_name.to_string())?;
        let role = state.role(role_name)?;
        Ok(RoleInfo {
            name: role_name.to_string(),
            id: role.id.clone(),
        })
    }

    fn list_role_policies(&self, role_name: &str) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.record(Operation::ListRolePolicies, role_name.to_string())?;
        let role = state.role(role_name)?;
        Ok(role.policies.iter().map(|(name, _)| name.clone()).collect())
    }

    fn get_role_policy(&self, role_name: &str, policy_name: &str) -> Result<String> {
        let mut state = self.lock();
        state.record(
            Operation::GetRolePolicy,
            format!("{role_name}/{policy_name}"),
        )?;
        let role = state.role(role_name)?;
        let document = role
            .policies
            .iter()
            .find(|(name, _)| name == policy_name)
            .map(|(_, doc)| doc.clone())
            .ok_or_else(|| {
                not_found(format!(
                    "The role policy with name {policy_name} cannot be found."
                ))
            })?;
        if self.url_encode_documents {
            Ok(urlencoding::encode(&document).into_owned())
        } else {
            Ok(document)
        }
    }

    fn create_instance_profile(
        &self,
        name: &str,
        _path: &str,
        tags: &Tags,
    ) -> Result<InstanceProfileInfo> {
        let mut state = self.lock();
        state.record(Operation::CreateInstanceProfile, name.to_string())?;
        if state.profiles.contains_key(name) {
            return Err(Error::from_code(
                "EntityAlreadyExists",
                format!("Instance Profile {name} already exists."),
            ));
        }
        let id = state.next_id("AIPA");
        state.profiles.insert(
            name.to_string(),
            StoredProfile {
                id: id.clone(),
                roles: Vec::new(),
                tags: tags.clone(),
            },
        );
        Ok(InstanceProfileInfo {
            name: name.to_string(),
            id,
            roles: Vec::new(),
        })
    }

    fn create_role(
        &self,
        name: &str,
        trust_document: &str,
        _path: &str,
        tags: &Tags,
    ) -> Result<RoleInfo> {
        let mut state = self.lock();
        state.record(Operation::CreateRole, name.to_string())?;
        if state.roles.contains_key(name) {
            return Err(Error::from_code(
                "EntityAlreadyExists",
                format!("Role with name {name} already exists."),
            ));
        }
        let id = state.next_id("AROA");
        state.roles.insert(
            name.to_string(),
            StoredRole {
                id: id.clone(),
                trust_document: trust_document.to_string(),
                policies: Vec::new(),
                tags: tags.clone(),
            },
        );
        Ok(RoleInfo {
            name: name.to_string(),
            id,
        })
    }

    fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(
            Operation::PutRolePolicy,
            format!("{role_name}/{policy_name}"),
        )?;
        let role = state.role_mut(role_name)?;
        match role.policies.iter_mut().find(|(name, _)| name == policy_name) {
            Some((_, existing)) => *existing = document.to_string(),
            None => role
                .policies
                .push((policy_name.to_string(), document.to_string())),
        }
        Ok(())
    }

    fn add_role_to_instance_profile(&self, profile_name: &str, role_name: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(
            Operation::AddRoleToInstanceProfile,
            format!("{profile_name}/{role_name}"),
        )?;
        state.role(role_name)?;
        let profile = state.profile_mut(profile_name)?;
        if !profile.roles.is_empty() {
            return Err(Error::from_code(
                "LimitExceeded",
                "Cannot exceed quota for InstanceSessionsPerInstanceProfile: 1",
            ));
        }
        profile.roles.push(role_name.to_string());
        Ok(())
    }

    fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(
            Operation::DeleteRolePolicy,
            format!("{role_name}/{policy_name}"),
        )?;
        let role = state.role_mut(role_name)?;
        let before = role.policies.len();
        role.policies.retain(|(name, _)| name != policy_name);
        if role.policies.len() == before {
            return Err(not_found(format!(
                "The role policy with name {policy_name} cannot be found."
            )));
        }
        Ok(())
    }

    fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        state.record(
            Operation::RemoveRoleFromInstanceProfile,
            format!("{profile_name}/{role_name}"),
        )?;
        let profile = state.profile_mut(profile_name)?;
        let before = profile.roles.len();
        profile.roles.retain(|r| r != role_name);
        if profile.roles.len() == before {
            return Err(not_found(format!(
                "Role {role_name} is not attached to Instance Profile {profile_name}."
            )));
        }
        Ok(())
    }

    fn delete_role(&self, role_name: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(Operation::DeleteRole, role_name.to_string())?;
        let role = state.role(role_name)?;
        if !role.policies.is_empty() {
            return Err(Error::from_code(
                "DeleteConflict",
                "Cannot delete entity, must delete policies first.",
            ));
        }
        if state.profiles.values().any(|p| p.roles.iter().any(|r| r == role_name)) {
            return Err(Error::from_code(
                "DeleteConflict",
                "Cannot delete entity, must remove roles from instance profile first.",
            ));
        }
        state.roles.remove(role_name);
        Ok(())
    }

    fn delete_instance_profile(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(Operation::DeleteInstanceProfile, name.to_string())?;
        let profile = state.profile_mut(name)?;
        if !profile.roles.is_empty() {
            return Err(Error::from_code(
                "DeleteConflict",
                "Cannot delete entity, must remove roles from instance profile first.",
            ));
        }
        state.profiles.remove(name);
        Ok(())
    }
}

fn not_found(message: String) -> Error {
    Error::from_code("NoSuchEntity", message)
}

fn injected(kind: ErrorKind, operation: Operation) -> Error {
    let message = format!("injected fault on {operation}");
    match kind {
        ErrorKind::NotFound => Error::from_code("NoSuchEntity", message),
        ErrorKind::AlreadyExists => Error::from_code("EntityAlreadyExists", message),
        ErrorKind::LimitExceeded => Error::from_code("LimitExceeded", message),
        ErrorKind::Provider => Error::from_code("ServiceFailure", message),
    }
}
