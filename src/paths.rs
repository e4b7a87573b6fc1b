//! Centralized path resolution for kubeforge
//!
//! # Environment Variables
//!
//! - `KUBEFORGE_CONFIG_DIR` - Override config directory (holds `defaults.toml`)
//! - `KUBEFORGE_STATE_DIR` - Override state directory (holds rendered clusters)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `KUBEFORGE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/kubeforge` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\kubeforge`
//!    - macOS/Linux: `~/.config/kubeforge`
//!
//! For state_dir():
//! 1. `KUBEFORGE_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/kubeforge` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\kubeforge`
//!    - macOS/Linux: `~/.local/state/kubeforge`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "KUBEFORGE_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "KUBEFORGE_STATE_DIR";

const APP_DIR: &str = "kubeforge";

/// Get the kubeforge config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_DIR);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the kubeforge state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join(APP_DIR);
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Path of the stored defaults profile
pub fn defaults_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("defaults.toml"))
}

/// Path of the rendered state for one cluster
pub fn cluster_state_file(cluster: &str) -> Result<PathBuf> {
    Ok(state_dir()?.join("clusters").join(format!("{cluster}.json")))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
