//! Remote PR host wrapper (gh CLI)
//!
//! Queries and mutates pull requests by branch name. An unreachable or
//! confused host yields [`PrState::Unknown`] rather than an error; every
//! caller owes Unknown an explicit policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::error::ArborError;

/// Observed state of the pull request for a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    /// No PR exists for the branch
    NoPr,
    Open,
    Merged,
    Closed,
    /// Host unreachable or answer unparseable; a first-class outcome
    Unknown,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrState::NoPr => write!(f, "no_pr"),
            PrState::Open => write!(f, "open"),
            PrState::Merged => write!(f, "merged"),
            PrState::Closed => write!(f, "closed"),
            PrState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Pull request details from `gh pr view`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrInfo {
    pub number: u32,
    pub url: String,
    pub state: String,
}

/// One status check from `gh pr checks`
#[derive(Debug, Clone, Deserialize)]
pub struct CheckStatus {
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

/// PR host CLI scoped to one repository directory
#[derive(Debug, Clone)]
pub struct HostCli {
    dir: PathBuf,
}

impl HostCli {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn is_installed(&self) -> bool {
        Command::new("gh")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn output(&self, args: &[&str]) -> Result<std::process::Output, ArborError> {
        debug!(?args, "gh");
        Command::new("gh")
            .current_dir(&self.dir)
            .args(args)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ArborError::HostCliMissing
                } else {
                    ArborError::Host(format!("failed to run gh {}: {}", args.join(" "), e))
                }
            })
    }

    /// Fetch PR details for a branch, if a PR exists
    pub fn pr_for_branch(&self, branch: &str) -> Result<Option<PrInfo>, ArborError> {
        let output = self.output(&["pr", "view", branch, "--json", "number,url,state"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no pull requests found") {
                return Ok(None);
            }
            return Err(ArborError::Host(format!("gh pr view {}: {}", branch, stderr.trim())));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let info: PrInfo = serde_json::from_str(&stdout)
            .map_err(|e| ArborError::Host(format!("unparseable gh pr view output: {}", e)))?;
        Ok(Some(info))
    }

    /// Classify the branch's PR state; never errors
    pub fn pr_state(&self, branch: &str) -> PrState {
        match self.pr_for_branch(branch) {
            Ok(Some(info)) => classify_pr_state(&info.state),
            Ok(None) => PrState::NoPr,
            Err(e) => {
                warn!(branch, error = %e, "could not query PR state");
                PrState::Unknown
            }
        }
    }

    /// Ensure every configured check on the branch's PR has passed
    pub fn checks_passed(&self, branch: &str) -> Result<(), ArborError> {
        let output = self.output(&["pr", "checks", branch, "--json", "name,state,conclusion"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // gh exits non-zero when a repo has no checks configured
            if stderr.contains("no checks reported") {
                return Ok(());
            }
            return Err(ArborError::Host(format!("gh pr checks {}: {}", branch, stderr.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let checks: Vec<CheckStatus> = serde_json::from_str(&stdout)
            .map_err(|e| ArborError::Host(format!("unparseable gh pr checks output: {}", e)))?;

        let mut failing = Vec::new();
        let mut pending = Vec::new();
        for check in checks {
            if check.state == "pending" || check.state == "in_progress" {
                pending.push(check.name);
            } else if let Some(conclusion) = check.conclusion {
                if matches!(conclusion.as_str(), "failure" | "timed_out" | "cancelled") {
                    failing.push(check.name);
                }
            }
        }

        if !failing.is_empty() {
            return Err(ArborError::Host(format!("PR checks failing: {}", failing.join(", "))));
        }
        if !pending.is_empty() {
            return Err(ArborError::Host(format!("PR checks pending: {}", pending.join(", "))));
        }
        Ok(())
    }

    /// Open a PR for a pushed branch; returns the PR URL
    pub fn pr_create(
        &self,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<String, ArborError> {
        let output = self.output(&[
            "pr", "create", "--head", branch, "--base", base, "--title", title, "--body", body,
        ])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArborError::Host(format!(
                "gh pr create for '{}': {}",
                branch,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Squash-merge the branch's PR
    pub fn merge_squash(&self, branch: &str) -> Result<(), ArborError> {
        let output = self.output(&["pr", "merge", "--squash", branch])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArborError::Host(format!(
                "gh pr merge --squash {}: {}",
                branch,
                stderr.trim()
            )));
        }
        Ok(())
    }

}

/// Map a gh state string to [`PrState`]
pub fn classify_pr_state(state: &str) -> PrState {
    match state {
        "OPEN" => PrState::Open,
        "MERGED" => PrState::Merged,
        "CLOSED" => PrState::Closed,
        other => {
            warn!(state = other, "unrecognized PR state");
            PrState::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_pr_state() {
        assert_eq!(classify_pr_state("OPEN"), PrState::Open);
        assert_eq!(classify_pr_state("MERGED"), PrState::Merged);
        assert_eq!(classify_pr_state("CLOSED"), PrState::Closed);
        assert_eq!(classify_pr_state("DRAFT?"), PrState::Unknown);
    }

    #[test]
    fn test_pr_info_deserialization() {
        let json = r#"{
            "number": 42,
            "url": "https://github.com/owner/repo/pull/42",
            "state": "OPEN"
        }"#;
        let info: PrInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.number, 42);
        assert_eq!(classify_pr_state(&info.state), PrState::Open);
    }

    #[test]
    fn test_check_status_null_conclusion() {
        let json = r#"[{"name": "build", "state": "pending", "conclusion": null}]"#;
        let checks: Vec<CheckStatus> = serde_json::from_str(json).unwrap();
        assert_eq!(checks[0].name, "build");
        assert!(checks[0].conclusion.is_none());
    }

    #[test]
    fn test_pr_state_display() {
        assert_eq!(PrState::NoPr.to_string(), "no_pr");
        assert_eq!(PrState::Unknown.to_string(), "unknown");
    }
}
