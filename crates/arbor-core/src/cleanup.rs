//! Batch cleanup of finished and abandoned sessions
//!
//! Selection and application are separate phases so callers can preview a
//! plan before anything is deleted. Selection is conservative: sessions
//! that are still active are never candidates, and a PR state the host
//! cannot report keeps its session out of merged/closed selection.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ArborError;
use crate::git::Git;
use crate::host::{HostCli, PrState};
use crate::session::{SessionStore, WORKTREES_DIR, WORKTREE_PREFIX};
use crate::worktree::{WorktreeManager, WorktreeRecord, BRANCH_PREFIX};

/// What a cleanup pass should look for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    /// Branches landed on the base branch (locally or via a merged PR)
    Merged,
    /// Inactive sessions with no pull request at all, and stray worktree
    /// directories with no session record
    Orphaned,
    /// Session branches with no worktree, removable without force
    Stale,
    /// Everything above, plus sessions whose PR was closed unmerged
    All,
}

impl std::fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupMode::Merged => write!(f, "merged"),
            CleanupMode::Orphaned => write!(f, "orphaned"),
            CleanupMode::Stale => write!(f, "stale"),
            CleanupMode::All => write!(f, "all"),
        }
    }
}

/// Why a candidate was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    MergedLocally,
    PrMerged,
    PrClosed,
    NoPullRequest,
    StrayWorktree,
    StaleBranch,
}

impl std::fmt::Display for CleanupReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupReason::MergedLocally => write!(f, "merged into base branch"),
            CleanupReason::PrMerged => write!(f, "pull request merged"),
            CleanupReason::PrClosed => write!(f, "pull request closed without merging"),
            CleanupReason::NoPullRequest => write!(f, "no pull request for branch"),
            CleanupReason::StrayWorktree => write!(f, "no session record"),
            CleanupReason::StaleBranch => write!(f, "branch has no worktree"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanupCandidate {
    pub target: String,
    pub reason: CleanupReason,
    pub session_id: Option<String>,
    pub branch: Option<String>,
    pub worktree_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SkipRecord {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CleanupPlan {
    pub mode: CleanupMode,
    pub candidates: Vec<CleanupCandidate>,
    pub skipped: Vec<SkipRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupResult {
    pub removed: Vec<CleanupCandidate>,
    pub skipped: Vec<SkipRecord>,
    pub failed: Vec<SkipRecord>,
}

pub struct CleanupEngine {
    repo_root: PathBuf,
    config: Config,
    manager: WorktreeManager,
}

impl CleanupEngine {
    pub fn new(repo_root: &Path, config: Config) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            config: config.clone(),
            manager: WorktreeManager::new(repo_root, config),
        }
    }

    /// Select cleanup candidates without deleting anything
    pub fn plan(&self, mode: CleanupMode) -> Result<CleanupPlan, ArborError> {
        let git = Git::new(&self.repo_root);
        if !git.is_repository() {
            return Err(ArborError::NotAGitRepository);
        }

        let host = HostCli::new(&self.repo_root);
        let host_available = host.is_installed();
        let base = &self.config.arbor.base_branch;

        let mut candidates = Vec::new();
        let mut skipped = Vec::new();
        let records = self.manager.records()?;

        for record in &records {
            let session = &record.session;

            // active sessions are untouchable in every mode, even when
            // their worktree has since disappeared
            if session.status.is_active() {
                skipped.push(SkipRecord {
                    target: session.branch_name.clone(),
                    reason: format!("session is {}", session.status),
                });
                continue;
            }

            // an unqueryable host is Unknown, never NoPr; stale selection
            // ignores PR state entirely
            let pr_state = if mode == CleanupMode::Stale {
                PrState::Unknown
            } else if host_available {
                host.pr_state(&session.branch_name)
            } else {
                PrState::Unknown
            };

            if let Some(reason) = classify_session(mode, record, pr_state, &git, base) {
                candidates.push(CleanupCandidate {
                    target: session.branch_name.clone(),
                    reason,
                    session_id: Some(session.session_id.clone()),
                    branch: record.branch_exists.then(|| session.branch_name.clone()),
                    worktree_path: record
                        .worktree_exists
                        .then(|| session.worktree_path.clone()),
                });
            } else if pr_state == PrState::Unknown
                && matches!(mode, CleanupMode::Merged | CleanupMode::Orphaned | CleanupMode::All)
            {
                skipped.push(SkipRecord {
                    target: session.branch_name.clone(),
                    reason: "pull request state could not be determined".to_string(),
                });
            }
        }

        if matches!(mode, CleanupMode::Orphaned | CleanupMode::All) {
            for path in self.stray_worktree_dirs(&records)? {
                candidates.push(CleanupCandidate {
                    target: path.display().to_string(),
                    reason: CleanupReason::StrayWorktree,
                    session_id: None,
                    branch: None,
                    worktree_path: Some(path.display().to_string()),
                });
            }
        }

        if matches!(mode, CleanupMode::Stale | CleanupMode::All) {
            for branch in self.stale_branches(&git, &records)? {
                candidates.push(CleanupCandidate {
                    target: branch.clone(),
                    reason: CleanupReason::StaleBranch,
                    session_id: None,
                    branch: Some(branch),
                    worktree_path: None,
                });
            }
        }

        Ok(CleanupPlan {
            mode,
            candidates,
            skipped,
        })
    }

    /// Apply a cleanup plan, best-effort
    ///
    /// A failing candidate is recorded and the pass moves on. Dirty
    /// worktrees are skipped with a warning unless `force` is set.
    pub fn apply(&self, plan: &CleanupPlan, force: bool) -> Result<CleanupResult, ArborError> {
        let git = Git::new(&self.repo_root);
        let store = self.manager.store();
        let mut result = CleanupResult {
            skipped: plan.skipped.clone(),
            ..Default::default()
        };

        // hand-deleted worktree dirs may still be registered, which would
        // block their branch deletion below
        git.worktree_prune()?;

        for candidate in &plan.candidates {
            match self.remove_candidate(&git, store, candidate, force) {
                Ok(true) => result.removed.push(candidate.clone()),
                Ok(false) => {
                    warn!(target = %candidate.target, "worktree is dirty; skipping");
                    result.skipped.push(SkipRecord {
                        target: candidate.target.clone(),
                        reason: "worktree has uncommitted changes".to_string(),
                    });
                }
                Err(e) => {
                    warn!(target = %candidate.target, error = %e, "cleanup failed");
                    result.failed.push(SkipRecord {
                        target: candidate.target.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        git.worktree_prune()?;
        Ok(result)
    }

    /// Returns Ok(false) when the candidate was skipped for dirtiness
    fn remove_candidate(
        &self,
        git: &Git,
        store: &SessionStore,
        candidate: &CleanupCandidate,
        force: bool,
    ) -> Result<bool, ArborError> {
        if let Some(path) = &candidate.worktree_path {
            let path = Path::new(path);
            if path.exists() {
                if candidate.reason == CleanupReason::StrayWorktree {
                    // not a registered worktree; git cannot remove it
                    fs::remove_dir_all(path)?;
                } else {
                    if !force && Git::new(path).is_dirty().unwrap_or(true) {
                        return Ok(false);
                    }
                    git.worktree_remove(path, true)?;
                }
            }
        }

        if let Some(branch) = &candidate.branch {
            if git.branch_exists(branch) {
                // stale branches only go if git agrees they are safe to
                // drop, unless force overrides that
                let force_delete = force || candidate.reason != CleanupReason::StaleBranch;
                git.delete_branch(branch, force_delete)?;
            }
        }

        if let Some(id) = &candidate.session_id {
            store.delete(id)?;
        }

        debug!(target = %candidate.target, reason = %candidate.reason, "removed");
        Ok(true)
    }

    /// Worktree directories under the managed root with no session record
    fn stray_worktree_dirs(
        &self,
        records: &[WorktreeRecord],
    ) -> Result<Vec<PathBuf>, ArborError> {
        let root = self.repo_root.join(WORKTREES_DIR);
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let known: Vec<PathBuf> = records
            .iter()
            .map(|r| PathBuf::from(&r.session.worktree_path))
            .collect();

        let mut strays = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !path.is_dir() || !name.starts_with(WORKTREE_PREFIX) {
                continue;
            }
            if !known.iter().any(|k| k == &path) {
                strays.push(path);
            }
        }
        Ok(strays)
    }

    /// Session-namespace branches with no worktree and no session record
    fn stale_branches(
        &self,
        git: &Git,
        records: &[WorktreeRecord],
    ) -> Result<Vec<String>, ArborError> {
        let mut stale = Vec::new();
        for branch in git.local_branches()? {
            if !branch.starts_with(BRANCH_PREFIX) {
                continue;
            }
            if records.iter().any(|r| r.session.branch_name == branch) {
                continue;
            }
            stale.push(branch);
        }
        Ok(stale)
    }
}

/// Map a session to a cleanup reason under the given mode, or None to
/// leave it alone
fn classify_session(
    mode: CleanupMode,
    record: &WorktreeRecord,
    pr_state: PrState,
    git: &Git,
    base: &str,
) -> Option<CleanupReason> {
    let branch = &record.session.branch_name;

    let merged_locally =
        record.branch_exists && git.branch_exists(base) && git.is_ancestor(branch, base);

    match mode {
        CleanupMode::Merged => {
            if merged_locally {
                Some(CleanupReason::MergedLocally)
            } else if pr_state == PrState::Merged {
                Some(CleanupReason::PrMerged)
            } else {
                None
            }
        }
        CleanupMode::Orphaned => {
            (pr_state == PrState::NoPr).then_some(CleanupReason::NoPullRequest)
        }
        CleanupMode::Stale => {
            (!record.worktree_exists).then_some(CleanupReason::StaleBranch)
        }
        CleanupMode::All => {
            if merged_locally {
                Some(CleanupReason::MergedLocally)
            } else if pr_state == PrState::Merged {
                Some(CleanupReason::PrMerged)
            } else if pr_state == PrState::Closed {
                Some(CleanupReason::PrClosed)
            } else if pr_state == PrState::NoPr {
                Some(CleanupReason::NoPullRequest)
            } else if !record.worktree_exists {
                Some(CleanupReason::StaleBranch)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionStatus};

    fn record(status: SessionStatus, worktree_exists: bool, branch_exists: bool) -> WorktreeRecord {
        WorktreeRecord {
            session: Session {
                schema_version: "2".to_string(),
                session_id: "auth-20260301-120000".to_string(),
                plan_path: ".arbor/plan-auth.md".to_string(),
                plan_slug: "auth".to_string(),
                branch_name: "arbor/auth-20260301-120000".to_string(),
                base_branch: "main".to_string(),
                worktree_path: ".arbor-worktrees/arbor__auth-20260301-120000".to_string(),
                created_at: "2026-03-01T12:00:00.000Z".to_string(),
                last_updated_at: None,
                status,
                root_bead_id: None,
                current_step: None,
                step_summaries: Vec::new(),
                reused: false,
            },
            worktree_exists,
            dirty: false,
            branch_exists,
        }
    }

    #[test]
    fn test_classify_orphaned_selects_no_pr() {
        let tmp = tempfile::TempDir::new().unwrap();
        let git = Git::new(tmp.path());

        // an inactive session with a live worktree and no PR is orphaned
        let idle = record(SessionStatus::Failed, true, true);
        assert_eq!(
            classify_session(CleanupMode::Orphaned, &idle, PrState::NoPr, &git, "main"),
            Some(CleanupReason::NoPullRequest)
        );

        // an open or unknown PR state keeps the session out
        assert_eq!(
            classify_session(CleanupMode::Orphaned, &idle, PrState::Open, &git, "main"),
            None
        );
        assert_eq!(
            classify_session(CleanupMode::Orphaned, &idle, PrState::Unknown, &git, "main"),
            None
        );
    }

    #[test]
    fn test_classify_pr_states() {
        let tmp = tempfile::TempDir::new().unwrap();
        let git = Git::new(tmp.path());
        let r = record(SessionStatus::Completed, true, true);

        assert_eq!(
            classify_session(CleanupMode::Merged, &r, PrState::Merged, &git, "main"),
            Some(CleanupReason::PrMerged)
        );
        // unknown state never selects
        assert_eq!(
            classify_session(CleanupMode::Merged, &r, PrState::Unknown, &git, "main"),
            None
        );
        assert_eq!(
            classify_session(CleanupMode::All, &r, PrState::Unknown, &git, "main"),
            None
        );
        // closed selects only under All
        assert_eq!(
            classify_session(CleanupMode::Merged, &r, PrState::Closed, &git, "main"),
            None
        );
        assert_eq!(
            classify_session(CleanupMode::All, &r, PrState::Closed, &git, "main"),
            Some(CleanupReason::PrClosed)
        );
        assert_eq!(
            classify_session(CleanupMode::All, &r, PrState::NoPr, &git, "main"),
            Some(CleanupReason::NoPullRequest)
        );
    }

    #[test]
    fn test_classify_stale_selects_missing_worktree() {
        let tmp = tempfile::TempDir::new().unwrap();
        let git = Git::new(tmp.path());

        let gone = record(SessionStatus::Failed, false, true);
        assert_eq!(
            classify_session(CleanupMode::Stale, &gone, PrState::Unknown, &git, "main"),
            Some(CleanupReason::StaleBranch)
        );

        let present = record(SessionStatus::Failed, true, true);
        assert_eq!(
            classify_session(CleanupMode::Stale, &present, PrState::Unknown, &git, "main"),
            None
        );
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(CleanupMode::All.to_string(), "all");
        assert_eq!(CleanupReason::StaleBranch.to_string(), "branch has no worktree");
    }
}
