//! Configuration types and loading for the beads system.
//!
//! [`BeadsConfig`] represents the contents of `.beads/config.yaml`: the
//! issue-id prefix, the routing section, and the external project table
//! consulted by cross-repo reference resolution. All fields use serde
//! defaults so a partially-specified file deserializes cleanly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// The `.beads/` directory was not found.
    #[error("no .beads directory found")]
    BeadsDirNotFound,

    /// A configuration value was invalid.
    #[error("invalid configuration value for key '{key}': {reason}")]
    InvalidValue {
        /// The configuration key with an invalid value.
        key: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Routing section
// ---------------------------------------------------------------------------

/// Routing configuration section.
///
/// Controls where new issues land for maintainer vs contributor roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Routing mode: `"auto"` or `"off"` (empty behaves as off).
    #[serde(default)]
    pub mode: String,

    /// Maintainer route (repo path; `.` = local).
    #[serde(default = "default_route_dot")]
    pub maintainer: String,

    /// Contributor route (repo path for planning issues).
    #[serde(default = "default_contributor_route")]
    pub contributor: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: String::new(),
            maintainer: default_route_dot(),
            contributor: default_contributor_route(),
        }
    }
}

fn default_route_dot() -> String {
    ".".to_string()
}

fn default_contributor_route() -> String {
    "~/.beads-planning".to_string()
}

// ---------------------------------------------------------------------------
// Main config struct
// ---------------------------------------------------------------------------

/// The full beads configuration, corresponding to `.beads/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BeadsConfig {
    /// Issue ID prefix (e.g., `"bd"`).
    #[serde(default, rename = "issue-prefix")]
    pub prefix: Option<String>,

    /// Routing configuration.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// External projects for cross-project dependency resolution.
    ///
    /// Maps a project name (the `<project>` token of
    /// `external:<project>:<capability>` references) to the filesystem
    /// path of that project's repository.
    #[serde(default, rename = "external-projects")]
    pub external_projects: HashMap<String, String>,
}

impl BeadsConfig {
    /// Looks up the repository path for an external project name.
    pub fn external_project_path(&self, project: &str) -> Option<&str> {
        self.external_projects.get(project).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Loads configuration from `config.yaml` inside the given `.beads/`
/// directory. A missing or empty file yields the default config.
///
/// # Errors
///
/// Returns [`ConfigError::ReadError`] if the file exists but cannot be
/// read, or [`ConfigError::ParseError`] on invalid YAML.
pub fn load_config(beads_dir: &Path) -> Result<BeadsConfig> {
    let config_path = beads_dir.join("config.yaml");

    if !config_path.exists() {
        return Ok(BeadsConfig::default());
    }

    let content = std::fs::read_to_string(&config_path)?;
    if content.trim().is_empty() {
        return Ok(BeadsConfig::default());
    }

    let config: BeadsConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Saves configuration to `config.yaml` inside the given `.beads/`
/// directory, creating the directory if needed.
pub fn save_config(beads_dir: &Path, config: &BeadsConfig) -> Result<()> {
    std::fs::create_dir_all(beads_dir)?;

    let config_path = beads_dir.join("config.yaml");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(config_path, yaml)?;
    Ok(())
}
