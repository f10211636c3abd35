//! Merge orchestration
//!
//! Lands a session branch on the base branch, either by a local squash
//! merge or by delegating to the PR host and fast-forwarding afterwards.
//! All preconditions are checked before anything is mutated; the remote
//! path stashes dirty infrastructure files and restores them even when
//! the merge fails partway.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ArborError;
use crate::git::Git;
use crate::host::{HostCli, PrInfo, PrState};
use crate::infra::InfraRules;
use crate::session::Session;
use crate::tracker::TrackerCli;
use crate::worktree::WorktreeManager;

/// How the branch reaches the base branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    Local,
    Remote,
}

impl std::fmt::Display for MergeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeMode::Local => write!(f, "local"),
            MergeMode::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub target: String,
    pub mode: MergeMode,
    pub dry_run: bool,
}

/// What a merge did (or, for a dry run, would do)
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub branch: String,
    pub base: String,
    pub mode: MergeMode,
    pub dry_run: bool,
    pub commits_merged: usize,
    pub merge_commit: Option<String>,
    pub pr: Option<PrInfo>,
    pub stashed_infra: Vec<String>,
    pub pushed: bool,
    pub cleaned_up: bool,
}

pub struct MergeCoordinator {
    repo_root: PathBuf,
    config: Config,
    manager: WorktreeManager,
}

impl MergeCoordinator {
    pub fn new(repo_root: &Path, config: Config) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            config: config.clone(),
            manager: WorktreeManager::new(repo_root, config),
        }
    }

    pub fn merge(&self, options: &MergeOptions) -> Result<MergeReport, ArborError> {
        let git = Git::new(&self.repo_root);
        self.check_trunk(&git)?;

        let session = self.resolve_session(&options.target, options.mode)?;
        let branch = session.branch_name.clone();
        let base = session.base_branch.clone();

        if !git.branch_exists(&branch) {
            return Err(ArborError::SessionNotFound {
                target: options.target.clone(),
            });
        }

        let rules = InfraRules::new(&self.config.arbor.infra_paths);
        let status = git.status_porcelain()?;
        let paths: Vec<String> = status
            .iter()
            .map(|(_, p)| p.clone())
            .filter(|p| !p.starts_with(crate::session::WORKTREES_DIR))
            .collect();
        let (infra, user) = rules.partition(&paths);
        if !user.is_empty() {
            return Err(ArborError::DirtyUserFiles {
                branch: base,
                files: user,
            });
        }

        self.check_divergence(&git, &base, options.mode)?;

        let commits_merged = git.rev_list_count(&base, &branch)?;

        if options.dry_run {
            let pr = match options.mode {
                MergeMode::Remote => HostCli::new(&self.repo_root).pr_for_branch(&branch)?,
                MergeMode::Local => None,
            };
            return Ok(MergeReport {
                branch,
                base,
                mode: options.mode,
                dry_run: true,
                commits_merged,
                merge_commit: None,
                pr,
                stashed_infra: infra,
                pushed: false,
                cleaned_up: false,
            });
        }

        let mut report = match options.mode {
            MergeMode::Local => self.merge_local(&git, &session, commits_merged)?,
            MergeMode::Remote => self.merge_remote(&git, &session, &infra, commits_merged)?,
        };

        self.finalize(&git, &session)?;
        report.cleaned_up = true;
        Ok(report)
    }

    /// Merges only run from the primary worktree with the base branch
    /// checked out.
    fn check_trunk(&self, git: &Git) -> Result<(), ArborError> {
        if !git.is_repository() {
            return Err(ArborError::NotAGitRepository);
        }
        if !git.is_primary_worktree() {
            return Err(ArborError::NotTrunkWorktree {
                reason: "run this from the primary worktree, not a session worktree".to_string(),
            });
        }
        let current = git.current_branch()?;
        let base = &self.config.arbor.base_branch;
        if current != *base {
            return Err(ArborError::NotTrunkWorktree {
                reason: format!("base branch '{}' must be checked out (on '{}')", base, current),
            });
        }
        Ok(())
    }

    /// Resolve the merge target to exactly one session
    ///
    /// When several sessions match a loose target, remote merges prefer the
    /// one with an open PR; after that the newest session wins, with branch
    /// name as the tie-break.
    fn resolve_session(&self, target: &str, mode: MergeMode) -> Result<Session, ArborError> {
        let mut matches = self.manager.resolve_target(target)?;
        match matches.len() {
            0 => Err(ArborError::SessionNotFound {
                target: target.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => {
                if mode == MergeMode::Remote {
                    let host = HostCli::new(&self.repo_root);
                    let open: Vec<&Session> = matches
                        .iter()
                        .filter(|s| host.pr_state(&s.branch_name) == PrState::Open)
                        .collect();
                    if open.len() == 1 {
                        return Ok(open[0].clone());
                    }
                }
                matches.sort_by(|a, b| {
                    b.created_at
                        .cmp(&a.created_at)
                        .then_with(|| a.branch_name.cmp(&b.branch_name))
                });
                let chosen = matches.remove(0);
                debug!(
                    branch = %chosen.branch_name,
                    candidates = matches.len() + 1,
                    "loose merge target resolved to newest session"
                );
                Ok(chosen)
            }
        }
    }

    /// Remote merges fast-forward the base afterwards, so local commits the
    /// remote has not seen would make that impossible. Local merges never
    /// touch the remote and skip this entirely.
    fn check_divergence(&self, git: &Git, base: &str, mode: MergeMode) -> Result<(), ArborError> {
        if mode != MergeMode::Remote {
            return Ok(());
        }

        let remote = &self.config.arbor.remote;
        if !git.has_remote(remote) {
            return Err(ArborError::Host(format!("no remote named '{}'", remote)));
        }

        git.fetch(remote, base)?;
        let remote_ref = format!("{}/{}", remote, base);
        let ahead = git.rev_list_count(&remote_ref, base)?;
        let behind = git.rev_list_count(base, &remote_ref)?;

        if ahead > 0 {
            return Err(ArborError::TrunkDiverged {
                branch: base.to_string(),
                remote: remote_ref,
                ahead,
                behind,
            });
        }
        Ok(())
    }

    fn merge_local(
        &self,
        git: &Git,
        session: &Session,
        commits_merged: usize,
    ) -> Result<MergeReport, ArborError> {
        let branch = &session.branch_name;
        let clean = git.merge_squash(branch)?;
        if !clean {
            git.reset_merge()?;
            return Err(ArborError::MergeConflict {
                branch: branch.clone(),
                base: session.base_branch.clone(),
            });
        }
        git.commit(&format!("{}: merge {}", session.plan_slug, branch))?;
        let merge_commit = git.head_commit()?;

        Ok(MergeReport {
            branch: branch.clone(),
            base: session.base_branch.clone(),
            mode: MergeMode::Local,
            dry_run: false,
            commits_merged,
            merge_commit: Some(merge_commit),
            pr: None,
            stashed_infra: Vec::new(),
            pushed: false,
            cleaned_up: false,
        })
    }

    fn merge_remote(
        &self,
        git: &Git,
        session: &Session,
        infra: &[String],
        commits_merged: usize,
    ) -> Result<MergeReport, ArborError> {
        let host = HostCli::new(&self.repo_root);
        if !host.is_installed() {
            return Err(ArborError::HostCliMissing);
        }

        let branch = &session.branch_name;
        let pr = match host.pr_for_branch(branch)? {
            Some(pr) => {
                if crate::host::classify_pr_state(&pr.state) != PrState::Open {
                    return Err(ArborError::Host(format!(
                        "pull request #{} for '{}' is {}, not open",
                        pr.number, branch, pr.state
                    )));
                }
                pr
            }
            None => {
                // no PR yet: publish the branch and open one
                git.push(&self.config.arbor.remote, branch)?;
                host.pr_create(
                    branch,
                    &session.base_branch,
                    &format!("Implement {}", session.plan_slug),
                    &format!("Implementation session for {}.", session.plan_path),
                )?;
                host.pr_for_branch(branch)?.ok_or_else(|| {
                    ArborError::Host(format!(
                        "created a pull request for '{}' but cannot query it back",
                        branch
                    ))
                })?
            }
        };

        host.checks_passed(branch)?;

        let mut guard = ScratchGuard::stash(&self.repo_root, git, infra)?;

        host.merge_squash(branch)?;
        git.pull_ff_only(&self.config.arbor.remote, &session.base_branch)?;

        let restored = guard.restore()?;
        if !restored.is_empty() {
            git.add_paths(&restored)?;
            git.commit("chore: post-merge sync")?;
        }

        let pushed = match git.push(&self.config.arbor.remote, &session.base_branch) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "push after merge failed; push manually");
                false
            }
        };

        Ok(MergeReport {
            branch: branch.clone(),
            base: session.base_branch.clone(),
            mode: MergeMode::Remote,
            dry_run: false,
            commits_merged,
            merge_commit: git.head_commit().ok(),
            pr: Some(pr),
            stashed_infra: infra.to_vec(),
            pushed,
            cleaned_up: false,
        })
    }

    /// Tear down the landed session: worktree, branch, tracker node, record
    fn finalize(&self, git: &Git, session: &Session) -> Result<(), ArborError> {
        let worktree_path = Path::new(&session.worktree_path);
        if worktree_path.exists() {
            git.worktree_remove(worktree_path, true)?;
        }
        if git.branch_exists(&session.branch_name) {
            git.delete_branch(&session.branch_name, true)?;
        }

        if let Some(root_id) = &session.root_bead_id {
            let tracker = TrackerCli::new(&self.config.arbor.tracker.bd_path, &self.repo_root);
            if tracker.is_installed() && tracker.is_initialized() {
                if let Err(e) = tracker.close(root_id, Some("merged")) {
                    warn!(root_id, error = %e, "could not close tracker node");
                }
            }
        }

        self.manager.store().delete(&session.session_id)?;
        git.worktree_prune()?;
        Ok(())
    }
}

/// Holds dirty infrastructure files in a scratch directory while the
/// working tree must be clean
///
/// `restore` puts the files back and removes the scratch directory. If the
/// guard is dropped without a restore, it restores best-effort so a failed
/// merge does not eat bookkeeping state.
struct ScratchGuard {
    repo_root: PathBuf,
    scratch_dir: PathBuf,
    files: Vec<String>,
    /// Dirty paths with no working copy, i.e. pending deletions
    deleted: Vec<String>,
    done: bool,
}

impl ScratchGuard {
    fn stash(repo_root: &Path, git: &Git, files: &[String]) -> Result<Self, ArborError> {
        let scratch_dir = repo_root
            .join(crate::session::WORKTREES_DIR)
            .join(format!(".scratch-{}", std::process::id()));

        let mut guard = Self {
            repo_root: repo_root.to_path_buf(),
            scratch_dir,
            files: Vec::new(),
            deleted: Vec::new(),
            done: files.is_empty(),
        };
        if files.is_empty() {
            return Ok(guard);
        }

        for file in files {
            let src = repo_root.join(file);
            if !src.exists() {
                guard.deleted.push(file.clone());
                continue;
            }
            let dst = guard.scratch_dir.join(file);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &dst)?;
            guard.files.push(file.clone());
        }

        // drop the working copies so the fast-forward sees a clean tree;
        // checkout also resurrects files the user deleted
        let tracked: Vec<String> = files
            .iter()
            .filter(|f| git.is_tracked(f))
            .cloned()
            .collect();
        if !tracked.is_empty() {
            git.checkout_paths(&tracked)?;
        }
        for file in files {
            if !tracked.contains(file) {
                let path = repo_root.join(file);
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }

        debug!(
            count = guard.files.len(),
            deletions = guard.deleted.len(),
            "stashed infrastructure files"
        );
        Ok(guard)
    }

    /// Copy the stashed files back, re-apply pending deletions, and delete
    /// the scratch directory. Returns every restored path.
    fn restore(&mut self) -> Result<Vec<String>, ArborError> {
        if self.done {
            return Ok(Vec::new());
        }
        for file in &self.files {
            let src = self.scratch_dir.join(file);
            let dst = self.repo_root.join(file);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &dst)?;
        }
        for file in &self.deleted {
            let path = self.repo_root.join(file);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        if self.scratch_dir.exists() {
            fs::remove_dir_all(&self.scratch_dir)?;
        }
        self.done = true;
        let mut restored = self.files.clone();
        restored.extend(self.deleted.iter().cloned());
        Ok(restored)
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!("merge failed after stashing; restoring infrastructure files");
        if let Err(e) = self.restore() {
            warn!(
                error = %e,
                scratch = %self.scratch_dir.display(),
                "restore failed; recover files from the scratch directory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let out = Command::new("git")
                .arg("-C")
                .arg(dir)
                .args(args)
                .output()
                .unwrap();
            assert!(out.status.success(), "git {:?}: {:?}", args, out);
        };
        run(&["init", "-b", "main"]);
        run(&["config", "user.email", "test@test.dev"]);
        run(&["config", "user.name", "Test"]);
        fs::write(dir.join("README.md"), "# test\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "init"]);
    }

    #[test]
    fn test_scratch_guard_round_trip() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let git = Git::new(tmp.path());

        fs::create_dir_all(tmp.path().join(".beads")).unwrap();
        fs::write(tmp.path().join(".beads/issues.db"), "dirty state").unwrap();

        let files = vec![".beads/issues.db".to_string()];
        let mut guard = ScratchGuard::stash(tmp.path(), &git, &files).unwrap();

        // untracked file is gone while stashed
        assert!(!tmp.path().join(".beads/issues.db").exists());

        let restored = guard.restore().unwrap();
        assert_eq!(restored, files);
        assert_eq!(
            fs::read_to_string(tmp.path().join(".beads/issues.db")).unwrap(),
            "dirty state"
        );
        assert!(!guard.scratch_dir.exists());
    }

    #[test]
    fn test_scratch_guard_restores_on_drop() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let git = Git::new(tmp.path());

        fs::write(tmp.path().join("CLAUDE.md"), "notes").unwrap();
        let files = vec!["CLAUDE.md".to_string()];
        {
            let _guard = ScratchGuard::stash(tmp.path(), &git, &files).unwrap();
            assert!(!tmp.path().join("CLAUDE.md").exists());
        }
        assert_eq!(
            fs::read_to_string(tmp.path().join("CLAUDE.md")).unwrap(),
            "notes"
        );
    }

    #[test]
    fn test_scratch_guard_with_tracked_file() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let git = Git::new(tmp.path());

        fs::write(tmp.path().join("CLAUDE.md"), "committed").unwrap();
        git.add_paths(&["CLAUDE.md".to_string()]).unwrap();
        git.commit("add notes").unwrap();
        fs::write(tmp.path().join("CLAUDE.md"), "modified").unwrap();

        let files = vec!["CLAUDE.md".to_string()];
        let mut guard = ScratchGuard::stash(tmp.path(), &git, &files).unwrap();

        // tracked file reverts to HEAD while stashed
        assert_eq!(
            fs::read_to_string(tmp.path().join("CLAUDE.md")).unwrap(),
            "committed"
        );

        guard.restore().unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join("CLAUDE.md")).unwrap(),
            "modified"
        );
    }

    #[test]
    fn test_scratch_guard_reapplies_deletion() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let git = Git::new(tmp.path());

        fs::write(tmp.path().join("CLAUDE.md"), "committed").unwrap();
        git.add_paths(&["CLAUDE.md".to_string()]).unwrap();
        git.commit("add notes").unwrap();
        fs::remove_file(tmp.path().join("CLAUDE.md")).unwrap();

        let files = vec!["CLAUDE.md".to_string()];
        let mut guard = ScratchGuard::stash(tmp.path(), &git, &files).unwrap();

        // the deletion is parked: HEAD content is back and the tree is clean
        assert_eq!(
            fs::read_to_string(tmp.path().join("CLAUDE.md")).unwrap(),
            "committed"
        );
        assert!(!git.is_dirty().unwrap());

        let restored = guard.restore().unwrap();
        assert_eq!(restored, files);
        assert!(!tmp.path().join("CLAUDE.md").exists());
    }

    #[test]
    fn test_merge_mode_display() {
        assert_eq!(MergeMode::Local.to_string(), "local");
        assert_eq!(MergeMode::Remote.to_string(), "remote");
    }
}
