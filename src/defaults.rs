//! Stored cluster defaults
//!
//! The defaults profile supplies everything a cluster spec leaves out:
//! location, instance types, images, spot price and node counts. It lives
//! in `defaults.toml` under the config directory; a missing file means the
//! built-in values.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_LOCATION: &str = "eu-west-1";
pub const DEFAULT_INSTANCE_TYPE: &str = "m4.xlarge";
pub const DEFAULT_IMAGE: &str = "ami-06d1667f";
pub const DEFAULT_SPOT_PRICE: &str = "0.2";
pub const DEFAULT_MIN_COUNT: u32 = 1;
pub const DEFAULT_MAX_COUNT: u32 = 2;

/// Fully resolved defaults for AWS clusters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsProfile {
    pub location: String,
    pub node_instance_type: String,
    pub node_image: String,
    pub master_instance_type: String,
    pub master_image: String,
    pub node_spot_price: String,
    pub node_min_count: u32,
    pub node_max_count: u32,
}

impl Default for AwsProfile {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            node_instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            node_image: DEFAULT_IMAGE.to_string(),
            master_instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            master_image: DEFAULT_IMAGE.to_string(),
            node_spot_price: DEFAULT_SPOT_PRICE.to_string(),
            node_min_count: DEFAULT_MIN_COUNT,
            node_max_count: DEFAULT_MAX_COUNT,
        }
    }
}

/// Partial overrides; empty strings and zero counts leave a value alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileRequest {
    pub location: String,
    pub node_instance_type: String,
    pub node_image: String,
    pub master_instance_type: String,
    pub master_image: String,
    pub node_spot_price: String,
    pub node_min_count: u32,
    pub node_max_count: u32,
}

/// Keys accepted by `kubeforge defaults set`
pub const KEYS: &[&str] = &[
    "location",
    "node-instance-type",
    "node-image",
    "master-instance-type",
    "master-image",
    "node-spot-price",
    "node-min-count",
    "node-max-count",
];

impl ProfileRequest {
    /// Build a request that sets a single key
    pub fn single(key: &str, value: &str) -> Result<Self> {
        let mut request = Self::default();
        let text = value.trim().to_string();
        if text.is_empty() {
            bail!("Value for '{key}' cannot be empty");
        }
        match key {
            "location" => request.location = text,
            "node-instance-type" => request.node_instance_type = text,
            "node-image" => request.node_image = text,
            "master-instance-type" => request.master_instance_type = text,
            "master-image" => request.master_image = text,
            "node-spot-price" => {
                text.parse::<f64>()
                    .with_context(|| format!("Invalid spot price: {text}"))?;
                request.node_spot_price = text;
            }
            "node-min-count" => request.node_min_count = parse_count(key, &text)?,
            "node-max-count" => request.node_max_count = parse_count(key, &text)?,
            _ => bail!("Unknown key '{key}'. Valid keys: {}", KEYS.join(", ")),
        }
        Ok(request)
    }
}

fn parse_count(key: &str, text: &str) -> Result<u32> {
    let count: u32 = text
        .parse()
        .with_context(|| format!("Invalid count for '{key}': {text}"))?;
    if count == 0 {
        bail!("'{key}' must be at least 1");
    }
    Ok(count)
}

fn set_if_present(target: &mut String, value: &str) {
    if !value.is_empty() {
        *target = value.to_string();
    }
}

fn set_if_nonzero(target: &mut u32, value: u32) {
    if value != 0 {
        *target = value;
    }
}

impl AwsProfile {
    /// Return a copy with the non-empty fields of `request` applied
    pub fn updated(&self, request: &ProfileRequest) -> Self {
        let mut next = self.clone();
        set_if_present(&mut next.location, &request.location);
        set_if_present(&mut next.node_instance_type, &request.node_instance_type);
        set_if_present(&mut next.node_image, &request.node_image);
        set_if_present(&mut next.master_instance_type, &request.master_instance_type);
        set_if_present(&mut next.master_image, &request.master_image);
        set_if_present(&mut next.node_spot_price, &request.node_spot_price);
        set_if_nonzero(&mut next.node_min_count, request.node_min_count);
        set_if_nonzero(&mut next.node_max_count, request.node_max_count);
        next
    }

    /// Check the counts make sense together
    pub fn validate(&self) -> Result<()> {
        if self.node_min_count > self.node_max_count {
            bail!(
                "node-min-count ({}) is greater than node-max-count ({})",
                self.node_min_count,
                self.node_max_count
            );
        }
        Ok(())
    }

    /// Key/value pairs in display order
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("location", self.location.clone()),
            ("node-instance-type", self.node_instance_type.clone()),
            ("node-image", self.node_image.clone()),
            ("master-instance-type", self.master_instance_type.clone()),
            ("master-image", self.master_image.clone()),
            ("node-spot-price", self.node_spot_price.clone()),
            ("node-min-count", self.node_min_count.to_string()),
            ("node-max-count", self.node_max_count.to_string()),
        ]
    }

    /// Load from the config directory, falling back to built-in values
    pub fn load() -> Result<Self> {
        Self::load_from(&crate::paths::defaults_file()?)
    }

    /// Save to the config directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&crate::paths::defaults_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No defaults at {}, using built-in values", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read defaults file: {}", path.display()))?;
        let profile: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in defaults file: {}", path.display()))?;
        profile.validate()?;
        log::debug!("Loaded defaults from {}", path.display());
        Ok(profile)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize defaults")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write defaults file: {}", path.display()))?;
        log::debug!("Saved defaults to {}", path.display());
        Ok(())
    }

    /// Remove the stored file so built-in values apply again
    pub fn reset_at(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove defaults file: {}", path.display()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_defaults() {
        let profile = AwsProfile::default();
        assert_eq!(profile.location, "eu-west-1");
        assert_eq!(profile.node_instance_type, "m4.xlarge");
        assert_eq!(profile.master_instance_type, "m4.xlarge");
        assert_eq!(profile.node_image, "ami-06d1667f");
        assert_eq!(profile.master_image, "ami-06d1667f");
        assert_eq!(profile.node_spot_price, "0.2");
        assert_eq!(profile.node_min_count, 1);
        assert_eq!(profile.node_max_count, 2);
    }

    #[test]
    fn test_update_ignores_empty_and_zero() {
        let request = ProfileRequest {
            node_image: "ami-123".into(),
            node_max_count: 5,
            ..Default::default()
        };
        let updated = AwsProfile::default().updated(&request);

        assert_eq!(updated.node_image, "ami-123");
        assert_eq!(updated.node_max_count, 5);
        assert_eq!(updated.location, "eu-west-1");
        assert_eq!(updated.node_min_count, 1);
        assert_eq!(updated.master_image, "ami-06d1667f");
    }

    #[test]
    fn test_single_key_request() {
        let request = ProfileRequest::single("master-instance-type", "c5.large").unwrap();
        assert_eq!(request.master_instance_type, "c5.large");
        assert!(request.location.is_empty());

        assert!(ProfileRequest::single("node-min-count", "0").is_err());
        assert!(ProfileRequest::single("node-spot-price", "cheap").is_err());
        assert!(ProfileRequest::single("colour", "blue").is_err());
        assert!(ProfileRequest::single("location", "  ").is_err());
    }

    #[test]
    fn test_validate_counts() {
        let profile = AwsProfile {
            node_min_count: 3,
            node_max_count: 2,
            ..Default::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_builtin() {
        let temp = TempDir::new().unwrap();
        let profile = AwsProfile::load_from(&temp.path().join("defaults.toml")).unwrap();
        assert_eq!(profile, AwsProfile::default());
    }

    #[test]
    fn test_save_load_and_reset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("defaults.toml");

        let profile = AwsProfile::default().updated(&ProfileRequest {
            location: "us-east-1".into(),
            ..Default::default()
        });
        profile.save_to(&path).unwrap();
        assert_eq!(AwsProfile::load_from(&path).unwrap(), profile);

        assert!(AwsProfile::reset_at(&path).unwrap());
        assert!(!AwsProfile::reset_at(&path).unwrap());
        assert_eq!(AwsProfile::load_from(&path).unwrap(), AwsProfile::default());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("defaults.toml");
        fs::write(&path, "node_max_count = 7\n").unwrap();

        let profile = AwsProfile::load_from(&path).unwrap();
        assert_eq!(profile.node_max_count, 7);
        assert_eq!(profile.location, "eu-west-1");
    }
}
