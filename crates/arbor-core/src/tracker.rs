//! Issue tracker integration (beads CLI)
//!
//! The tracker is the sole authority for which steps are done, ready, or
//! blocked; session records never duplicate that truth. All commands run
//! with the working directory set to the target worktree because bd resolves
//! its `.beads/` storage relative to it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::ArborError;
use crate::plan::PlanOutline;

/// Issue object returned by `bd create --json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub issue_type: String,
}

/// Result of syncing a plan outline into the tracker
#[derive(Debug, Clone)]
pub struct TrackerSync {
    /// Root node for the session
    pub root_id: String,
    /// Child node ids in step order
    pub step_ids: Vec<String>,
}

/// Tracker CLI bound to one worktree
#[derive(Debug, Clone)]
pub struct TrackerCli {
    bd_path: String,
    worktree: PathBuf,
}

impl TrackerCli {
    pub fn new(bd_path: &str, worktree: &Path) -> Self {
        Self {
            bd_path: bd_path.to_string(),
            worktree: worktree.to_path_buf(),
        }
    }

    pub fn is_installed(&self) -> bool {
        Command::new(&self.bd_path)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn is_initialized(&self) -> bool {
        self.worktree.join(".beads").is_dir()
    }

    fn run(&self, args: &[&str]) -> Result<String, ArborError> {
        debug!(worktree = %self.worktree.display(), ?args, "bd");
        let output = Command::new(&self.bd_path)
            .current_dir(&self.worktree)
            .args(args)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ArborError::TrackerNotInstalled
                } else {
                    ArborError::Tracker(format!("failed to run bd {}: {}", args.join(" "), e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArborError::Tracker(format!(
                "bd {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Create a node, optionally parented
    pub fn create(
        &self,
        title: &str,
        description: Option<&str>,
        parent: Option<&str>,
        issue_type: Option<&str>,
    ) -> Result<Issue, ArborError> {
        let mut args = vec!["create", "--json", title];
        if let Some(desc) = description {
            args.push("--description");
            args.push(desc);
        }
        if let Some(p) = parent {
            args.push("--parent");
            args.push(p);
        }
        if let Some(t) = issue_type {
            args.push("--type");
            args.push(t);
        }

        let stdout = self.run(&args)?;
        serde_json::from_str(&stdout)
            .map_err(|e| ArborError::Tracker(format!("unparseable bd create output: {}", e)))
    }

    /// Add a dependency edge: `from` depends on `to`
    pub fn dep_add(&self, from_id: &str, to_id: &str) -> Result<(), ArborError> {
        self.run(&["dep", "add", from_id, to_id, "--json"]).map(|_| ())
    }

    /// Nodes under `root_id` that are open with no unmet dependencies
    pub fn ready(&self, root_id: &str) -> Result<Vec<Issue>, ArborError> {
        let stdout = self.run(&["ready", "--parent", root_id, "--json"])?;
        parse_issue_list(&stdout)
    }

    /// Close a node with a free-text reason
    pub fn close(&self, id: &str, reason: Option<&str>) -> Result<(), ArborError> {
        let mut args = vec!["close", id];
        if let Some(r) = reason {
            args.push("--reason");
            args.push(r);
        }
        self.run(&args).map(|_| ())
    }

    /// Create a root node plus one child per plan step, chained with
    /// sequential dependency edges so only the first step starts ready.
    ///
    /// Partial failures leave already-created nodes in place; they are
    /// harmless orphans a retry reuses rather than a deleter/creator race.
    pub fn sync_plan(&self, outline: &PlanOutline) -> Result<TrackerSync, ArborError> {
        let root = self.create(
            &format!("plan: {}", outline.title),
            Some(&format!("implementation session for {}", outline.slug)),
            None,
            Some("epic"),
        )?;

        let mut step_ids: Vec<String> = Vec::with_capacity(outline.steps.len());
        for step in &outline.steps {
            let issue = self.create(&step.title, None, Some(&root.id), Some("task"))?;
            if let Some(prev) = step_ids.last() {
                self.dep_add(&issue.id, prev)?;
            }
            step_ids.push(issue.id);
        }

        Ok(TrackerSync {
            root_id: root.id,
            step_ids,
        })
    }
}

/// Parse a bd JSON issue list; bd prints nothing when the list is empty
fn parse_issue_list(stdout: &str) -> Result<Vec<Issue>, ArborError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed)
        .map_err(|e| ArborError::Tracker(format!("unparseable bd issue list: {}", e)))
}

/// Validate tracker node id format
/// Pattern: ^[a-z0-9][a-z0-9-]*-[a-z0-9]+(\.[0-9]+)*$
pub fn is_valid_node_id(id: &str) -> bool {
    static NODE_ID_REGEX: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*-[a-z0-9]+(\.[0-9]+)*$").unwrap());
    NODE_ID_REGEX.is_match(id)
}
