//! Real IAM backend using `aws iam` commands.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{InstanceProfileInfo, RoleInfo, Tags};
use serde::Deserialize;
use std::process::Command;

/// Backend that executes real `aws iam` commands.
///
/// Credentials and endpoint resolution are left to the CLI itself; the
/// optional profile and region are passed through as global flags.
pub struct AwsCliBackend {
    /// Path to the aws executable
    aws_path: String,
    /// Named CLI profile (`--profile`)
    profile: Option<String>,
    /// Region override (`--region`)
    region: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetInstanceProfileOutput {
    instance_profile: InstanceProfileJson,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceProfileJson {
    instance_profile_name: String,
    instance_profile_id: String,
    #[serde(default)]
    roles: Vec<RoleJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleOutput {
    role: RoleJson,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleJson {
    role_name: String,
    role_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListRolePoliciesOutput {
    #[serde(default)]
    policy_names: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRolePolicyOutput {
    policy_document: serde_json::Value,
}

impl AwsCliBackend {
    /// Create a new AwsCliBackend.
    ///
    /// Returns an error if the `aws` CLI is not installed.
    pub fn new() -> Result<Self> {
        let aws_path = find_aws()?;
        Ok(Self {
            aws_path,
            profile: None,
            region: None,
        })
    }

    /// Use a named CLI profile.
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// Use a region override.
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Run an `aws iam` subcommand and return stdout.
    fn run_iam(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.aws_path);
        cmd.arg("iam").args(args).args(["--output", "json"]);
        if let Some(profile) = &self.profile {
            cmd.args(["--profile", profile]);
        }
        if let Some(region) = &self.region {
            cmd.args(["--region", region]);
        }

        log::trace!("aws iam {}", args.join(" "));
        let output = cmd.output().map_err(|e| Error::CommandFailed {
            message: format!("failed to execute aws: {e}"),
            stderr: String::new(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_cli_output(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Backend for AwsCliBackend {
    fn get_instance_profile(&self, name: &str) -> Result<InstanceProfileInfo> {
        let stdout = self.run_iam(&["get-instance-profile", "--instance-profile-name", name])?;
        let out: GetInstanceProfileOutput = serde_json::from_str(&stdout)?;
        Ok(InstanceProfileInfo {
            name: out.instance_profile.instance_profile_name,
            id: out.instance_profile.instance_profile_id,
            roles: out
                .instance_profile
                .roles
                .into_iter()
                .map(|r| r.role_name)
                .collect(),
        })
    }

    fn get_role(&self, role_name: &str) -> Result<RoleInfo> {
        let stdout = self.run_iam(&["get-role", "--role-name", role_name])?;
        let out: RoleOutput = serde_json::from_str(&stdout)?;
        Ok(RoleInfo {
            name: out.role.role_name,
            id: out.role.role_id,
        })
    }

    fn list_role_policies(&self, role_name: &str) -> Result<Vec<String>> {
        let stdout = self.run_iam(&["list-role-policies", "--role-name", role_name])?;
        let out: ListRolePoliciesOutput = serde_json::from_str(&stdout)?;
        Ok(out.policy_names)
    }

    fn get_role_policy(&self, role_name: &str, policy_name: &str) -> Result<String> {
        let stdout = self.run_iam(&[
            "get-role-policy",
            "--role-name",
            role_name,
            "--policy-name",
            policy_name,
        ])?;
        let out: GetRolePolicyOutput = serde_json::from_str(&stdout)?;
        policy_document_string(out.policy_document)
    }

    fn create_instance_profile(
        &self,
        name: &str,
        path: &str,
        tags: &Tags,
    ) -> Result<InstanceProfileInfo> {
        let tags = tags_argument(tags)?;
        let stdout = self.run_iam(&[
            "create-instance-profile",
            "--instance-profile-name",
            name,
            "--path",
            path,
            "--tags",
            &tags,
        ])?;
        let out: GetInstanceProfileOutput = serde_json::from_str(&stdout)?;
        Ok(InstanceProfileInfo {
            name: out.instance_profile.instance_profile_name,
            id: out.instance_profile.instance_profile_id,
            roles: Vec::new(),
        })
    }

    fn create_role(
        &self,
        name: &str,
        trust_document: &str,
        path: &str,
        tags: &Tags,
    ) -> Result<RoleInfo> {
        let tags = tags_argument(tags)?;
        let stdout = self.run_iam(&[
            "create-role",
            "--role-name",
            name,
            "--assume-role-policy-document",
            trust_document,
            "--description",
            crate::types::ROLE_DESCRIPTION,
            "--path",
            path,
            "--tags",
            &tags,
        ])?;
        let out: RoleOutput = serde_json::from_str(&stdout)?;
        Ok(RoleInfo {
            name: out.role.role_name,
            id: out.role.role_id,
        })
    }

    fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> Result<()> {
        self.run_iam(&[
            "put-role-policy",
            "--role-name",
            role_name,
            "--policy-name",
            policy_name,
            "--policy-document",
            document,
        ])?;
        Ok(())
    }

    fn add_role_to_instance_profile(&self, profile_name: &str, role_name: &str) -> Result<()> {
        self.run_iam(&[
            "add-role-to-instance-profile",
            "--instance-profile-name",
            profile_name,
            "--role-name",
            role_name,
        ])?;
        Ok(())
    }

    fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> Result<()> {
        self.run_iam(&[
            "delete-role-policy",
            "--role-name",
            role_name,
            "--policy-name",
            policy_name,
        ])?;
        Ok(())
    }

    fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<()> {
        self.run_iam(&[
            "remove-role-from-instance-profile",
            "--instance-profile-name",
            profile_name,
            "--role-name",
            role_name,
        ])?;
        Ok(())
    }

    fn delete_role(&self, role_name: &str) -> Result<()> {
        self.run_iam(&["delete-role", "--role-name", role_name])?;
        Ok(())
    }

    fn delete_instance_profile(&self, name: &str) -> Result<()> {
        self.run_iam(&["delete-instance-profile", "--instance-profile-name", name])?;
        Ok(())
    }
}

/// Find the aws executable.
fn find_aws() -> Result<String> {
    let paths = [
        "/usr/local/bin/aws",
        "/opt/homebrew/bin/aws",
        "/usr/bin/aws",
    ];

    for path in &paths {
        if std::path::Path::new(path).exists() {
            return Ok(path.to_string());
        }
    }

    let output = Command::new("which")
        .arg("aws")
        .output()
        .map_err(|e| Error::CommandFailed {
            message: format!("could not look up aws CLI: {e}"),
            stderr: String::new(),
        })?;

    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() {
            return Ok(path);
        }
    }

    Err(Error::CommandFailed {
        message: "aws CLI not found in PATH".to_string(),
        stderr: String::new(),
    })
}

/// Render tags as the JSON list form accepted by `--tags`.
fn tags_argument(tags: &Tags) -> Result<String> {
    let list: Vec<serde_json::Value> = tags
        .iter()
        .map(|(k, v)| serde_json::json!({ "Key": k, "Value": v }))
        .collect();
    Ok(serde_json::to_string(&list)?)
}

/// The CLI decodes policy documents into JSON objects; older versions and
/// other tooling hand back the URL-encoded string instead.
fn policy_document_string(value: serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(serde_json::to_string(&other)?),
    }
}
