//! Configuration handling for arbor
//!
//! Loads `.arbor/config.toml` from the project root. Every field has a serde
//! default so a missing or partial file never fails.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ArborError;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Arbor-specific settings
    #[serde(default)]
    pub arbor: ArborConfig,
}

/// Core arbor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArborConfig {
    /// Trunk branch merges land on
    #[serde(default = "default_base_branch")]
    pub base_branch: String,

    /// Remote name for push/pull/fetch
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Shell command run once inside a freshly created worktree
    #[serde(default)]
    pub init_command: Option<String>,

    /// Additional infra path prefixes beyond the built-in rules
    #[serde(default)]
    pub infra_paths: Vec<String>,

    /// Issue tracker settings
    #[serde(default)]
    pub tracker: TrackerConfig,
}

/// Issue tracker (beads) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Path to the bd binary
    #[serde(default = "default_bd_path")]
    pub bd_path: String,
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_bd_path() -> String {
    "bd".to_string()
}

impl Default for ArborConfig {
    fn default() -> Self {
        Self {
            base_branch: default_base_branch(),
            remote: default_remote(),
            init_command: None,
            infra_paths: Vec::new(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bd_path: default_bd_path(),
        }
    }
}

impl Config {
    /// Load configuration from `<project_root>/.arbor/config.toml`
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load_from_project(project_root: &Path) -> Result<Self, ArborError> {
        let path = project_root.join(".arbor").join("config.toml");
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| ArborError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Walk up from the current directory to find the project root
///
/// The root is the nearest ancestor containing a `.arbor/` directory.
pub fn find_project_root() -> Result<PathBuf, ArborError> {
    let mut dir = std::env::current_dir()?;
    loop {
        if dir.join(".arbor").is_dir() {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(ArborError::NotInitialized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.arbor.base_branch, "main");
        assert_eq!(config.arbor.remote, "origin");
        assert_eq!(config.arbor.tracker.bd_path, "bd");
        assert!(config.arbor.init_command.is_none());
        assert!(config.arbor.infra_paths.is_empty());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [arbor]
            base_branch = "trunk"
            "#,
        )
        .unwrap();
        assert_eq!(config.arbor.base_branch, "trunk");
        assert_eq!(config.arbor.remote, "origin");
        assert_eq!(config.arbor.tracker.bd_path, "bd");
    }

    #[test]
    fn test_tracker_and_infra_overrides() {
        let config: Config = toml::from_str(
            r#"
            [arbor]
            infra_paths = ["tooling/"]

            [arbor.tracker]
            bd_path = "/opt/beads/bd"
            "#,
        )
        .unwrap();
        assert_eq!(config.arbor.infra_paths, vec!["tooling/".to_string()]);
        assert_eq!(config.arbor.tracker.bd_path, "/opt/beads/bd");
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::load_from_project(temp.path()).unwrap();
        assert_eq!(config.arbor.base_branch, "main");
    }
}
