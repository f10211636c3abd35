//! Git subprocess wrapper
//!
//! Every operation is scoped to an explicit repository or worktree path with
//! `git -C`; nothing depends on the process's ambient working directory.
//! Failed commands surface the command line, exit code, and stderr.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::ArborError;

/// Git CLI scoped to one repository or worktree path
#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
}

impl Git {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Directory this wrapper operates on
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run a git command, requiring exit code 0
    fn run(&self, args: &[&str]) -> Result<String, ArborError> {
        debug!(dir = %self.dir.display(), ?args, "git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.dir)
            .args(args)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ArborError::NotAGitRepository
                } else {
                    ArborError::Git(format!("failed to run git {}: {}", args.join(" "), e))
                }
            })?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArborError::Git(format!(
                "git {} (exit {}): {}",
                args.join(" "),
                code,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a git command, returning only whether it succeeded
    fn check(&self, args: &[&str]) -> bool {
        debug!(dir = %self.dir.display(), ?args, "git (check)");
        Command::new("git")
            .arg("-C")
            .arg(&self.dir)
            .args(args)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn is_repository(&self) -> bool {
        self.dir.join(".git").exists()
    }

    /// True when `.git` is a directory, i.e. this is the primary worktree
    /// rather than a linked one (where `.git` is a file pointer).
    pub fn is_primary_worktree(&self) -> bool {
        self.dir.join(".git").is_dir()
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.check(&["rev-parse", "--verify", "--quiet", branch])
    }

    pub fn current_branch(&self) -> Result<String, ArborError> {
        Ok(self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
    }

    pub fn head_commit(&self) -> Result<String, ArborError> {
        Ok(self.run(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    pub fn create_branch(&self, new_branch: &str, base: &str) -> Result<(), ArborError> {
        self.run(&["branch", new_branch, base]).map(|_| ())
    }

    /// Delete a branch; without `force` uses `-d`, which refuses unmerged
    /// branches — the conservative variant cleanup relies on.
    pub fn delete_branch(&self, branch: &str, force: bool) -> Result<(), ArborError> {
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, branch]).map(|_| ())
    }

    /// All local branches, unadorned names
    pub fn local_branches(&self) -> Result<Vec<String>, ArborError> {
        let out = self.run(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    pub fn worktree_add(&self, path: &Path, branch: &str) -> Result<(), ArborError> {
        let path_str = path.to_str().ok_or_else(|| ArborError::WorktreeCreationFailed {
            reason: format!("worktree path is not valid UTF-8: {}", path.display()),
        })?;
        self.run(&["worktree", "add", path_str, branch]).map(|_| ())
    }

    pub fn worktree_remove(&self, path: &Path, force: bool) -> Result<(), ArborError> {
        let path_str = path.to_str().ok_or_else(|| ArborError::WorktreeCleanupFailed {
            reason: format!("worktree path is not valid UTF-8: {}", path.display()),
        })?;
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(path_str);
        self.run(&args).map(|_| ())
    }

    pub fn worktree_prune(&self) -> Result<(), ArborError> {
        self.run(&["worktree", "prune"]).map(|_| ())
    }

    /// True when `branch` is reachable from `base`
    pub fn is_ancestor(&self, branch: &str, base: &str) -> bool {
        self.check(&["merge-base", "--is-ancestor", branch, base])
    }

    /// Uncommitted paths from `git status --porcelain -u`, status code included
    pub fn status_porcelain(&self) -> Result<Vec<(String, String)>, ArborError> {
        let out = self.run(&["status", "--porcelain", "-u"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.len() < 4 {
                continue;
            }
            let status = line[..2].to_string();
            // renames are reported as "old -> new"; keep the current name
            let raw = &line[3..];
            let path = match raw.split_once(" -> ") {
                Some((_, renamed)) => renamed.to_string(),
                None => raw.to_string(),
            };
            entries.push((status, path));
        }
        Ok(entries)
    }

    pub fn is_dirty(&self) -> Result<bool, ArborError> {
        Ok(!self.status_porcelain()?.is_empty())
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.check(&["ls-files", "--error-unmatch", "--", path])
    }

    /// Restore tracked paths to their HEAD content
    pub fn checkout_paths(&self, paths: &[String]) -> Result<(), ArborError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&str> = vec!["checkout", "HEAD", "--"];
        args.extend(paths.iter().map(|p| p.as_str()));
        self.run(&args).map(|_| ())
    }

    pub fn add_paths(&self, paths: &[String]) -> Result<(), ArborError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&str> = vec!["add", "--"];
        args.extend(paths.iter().map(|p| p.as_str()));
        self.run(&args).map(|_| ())
    }

    pub fn commit(&self, message: &str) -> Result<(), ArborError> {
        self.run(&["commit", "-m", message]).map(|_| ())
    }

    pub fn commit_all(&self, message: &str) -> Result<(), ArborError> {
        self.run(&["commit", "-a", "-m", message]).map(|_| ())
    }

    /// Squash-merge `branch` into the current branch without committing.
    /// Returns Ok(false) on conflict so the caller can run its restore path.
    pub fn merge_squash(&self, branch: &str) -> Result<bool, ArborError> {
        debug!(dir = %self.dir.display(), branch, "git merge --squash");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.dir)
            .args(["merge", "--squash", branch])
            .output()
            .map_err(|e| ArborError::Git(format!("failed to run git merge --squash: {}", e)))?;

        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stderr.contains("CONFLICT")
            || stdout.contains("CONFLICT")
            || stdout.contains("Automatic merge failed")
        {
            return Ok(false);
        }
        Err(ArborError::Git(format!(
            "git merge --squash {} failed: {}",
            branch,
            stderr.trim()
        )))
    }

    /// Undo a conflicted squash merge. Squash merges leave no MERGE_HEAD, so
    /// `git merge --abort` refuses; `reset --merge` restores the pre-merge
    /// tree while keeping unrelated uncommitted edits.
    pub fn reset_merge(&self) -> Result<(), ArborError> {
        self.run(&["reset", "--merge"]).map(|_| ())
    }

    pub fn fetch(&self, remote: &str, branch: &str) -> Result<(), ArborError> {
        self.run(&["fetch", remote, branch]).map(|_| ())
    }

    /// Strict fast-forward pull; refuses rather than creating a merge commit
    pub fn pull_ff_only(&self, remote: &str, branch: &str) -> Result<(), ArborError> {
        match self.run(&["pull", "--ff-only", remote, branch]) {
            Ok(_) => Ok(()),
            Err(ArborError::Git(detail)) => Err(ArborError::FastForwardFailed {
                branch: branch.to_string(),
                detail,
            }),
            Err(e) => Err(e),
        }
    }

    pub fn push(&self, remote: &str, branch: &str) -> Result<(), ArborError> {
        self.run(&["push", remote, branch]).map(|_| ())
    }

    pub fn has_remote(&self, remote: &str) -> bool {
        self.check(&["remote", "get-url", remote])
    }

    /// Number of commits in `from..to`
    pub fn rev_list_count(&self, from: &str, to: &str) -> Result<usize, ArborError> {
        let range = format!("{}..{}", from, to);
        let out = self.run(&["rev-list", "--count", &range])?;
        out.trim()
            .parse()
            .map_err(|_| ArborError::Git(format!("unparseable rev-list count for {}", range)))
    }
}
