//! Worktree and session lifecycle
//!
//! Creating or reusing branch+worktree pairs for plan implementations,
//! pairing persisted sessions with live git facts, and removing worktrees
//! without ever guessing at a destructive target.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ArborError;
use crate::git::Git;
use crate::plan::{self, PlanOutline};
use crate::session::{
    Session, SessionStatus, SessionStore, now_iso8601, session_id_from_worktree, WORKTREES_DIR,
};
use crate::tracker::TrackerCli;

/// Branch namespace for session branches
pub const BRANCH_PREFIX: &str = "arbor/";

/// A session paired with live filesystem/git facts
#[derive(Debug, Clone)]
pub struct WorktreeRecord {
    pub session: Session,
    pub worktree_exists: bool,
    pub dirty: bool,
    pub branch_exists: bool,
}

/// Creates, reuses, lists, and removes branch+worktree pairs
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    repo_root: PathBuf,
    config: Config,
    store: SessionStore,
}

/// Sanitize a branch name into a filesystem-safe directory name
///
/// '/' and '\' become '__', ':' and ' ' become '_', then everything outside
/// alphanumerics, '-' and '_' is dropped.
pub fn sanitize_branch_name(branch_name: &str) -> String {
    let sanitized: String = branch_name
        .replace(['/', '\\'], "__")
        .replace([':', ' '], "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    if sanitized.is_empty() {
        "arbor-worktree".to_string()
    } else {
        sanitized
    }
}

/// UTC timestamp in YYYYMMDD-HHMMSS form
fn timestamp_utc() -> String {
    chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Branch name in the form arbor/<slug>-<timestamp>
pub fn generate_branch_name(slug: &str) -> String {
    format!("{}{}-{}", BRANCH_PREFIX, slug, timestamp_utc())
}

/// Normalize a plan path for comparisons: strip "./", and resolve bare
/// filenames to the conventional .arbor/ location.
pub fn normalize_plan_path(plan: &str) -> String {
    let trimmed = plan.strip_prefix("./").unwrap_or(plan);
    if trimmed.contains('/') {
        trimmed.to_string()
    } else {
        format!(".arbor/{}", trimmed)
    }
}

impl WorktreeManager {
    pub fn new(repo_root: &Path, config: Config) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            config,
            store: SessionStore::new(repo_root),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// All sessions bound to a plan path
    pub fn sessions_for_plan(&self, plan: &str) -> Result<Vec<Session>, ArborError> {
        let wanted = normalize_plan_path(plan);
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|s| normalize_plan_path(&s.plan_path) == wanted)
            .collect())
    }

    /// Pair every session with live worktree/branch facts
    pub fn records(&self) -> Result<Vec<WorktreeRecord>, ArborError> {
        let git = Git::new(&self.repo_root);
        let mut records = Vec::new();
        for session in self.store.list()? {
            let worktree_path = PathBuf::from(&session.worktree_path);
            let worktree_exists = worktree_path.exists();
            let dirty = if worktree_exists {
                Git::new(&worktree_path).is_dirty().unwrap_or(false)
            } else {
                false
            };
            let branch_exists = git.branch_exists(&session.branch_name);
            records.push(WorktreeRecord {
                session,
                worktree_exists,
                dirty,
                branch_exists,
            });
        }
        Ok(records)
    }

    /// Create a worktree for a plan, or return the existing one
    ///
    /// Reuse is unconditional: when a session already binds this plan and its
    /// worktree still exists on disk, that session is returned with
    /// `reused = true`. Otherwise the full creation sequence runs, and any
    /// failure rolls back the branch and worktree created here. Tracker nodes
    /// created before a failure are left in place on purpose.
    pub fn create_or_reuse(
        &self,
        plan_path: &Path,
        base_branch: Option<&str>,
    ) -> Result<Session, ArborError> {
        let git = Git::new(&self.repo_root);
        if !git.is_repository() {
            return Err(ArborError::NotAGitRepository);
        }

        let base = base_branch
            .map(|b| b.to_string())
            .unwrap_or_else(|| self.config.arbor.base_branch.clone());
        if !git.branch_exists(&base) {
            return Err(ArborError::BaseBranchNotFound { branch: base });
        }

        let plan_str = plan_path.display().to_string();

        // unconditional idempotency: reuse before creating
        for existing in self.sessions_for_plan(&plan_str)? {
            if Path::new(&existing.worktree_path).exists() {
                debug!(session_id = %existing.session_id, "reusing existing worktree");
                let mut session = existing;
                session.reused = true;
                return Ok(session);
            }
            warn!(
                session_id = %existing.session_id,
                "session record exists but worktree is gone; creating a new one"
            );
        }

        self.ensure_worktrees_excluded()?;

        let outline = plan::read_outline(&self.repo_root, plan_path)?;
        if outline.steps.is_empty() {
            return Err(ArborError::PlanHasNoSteps { plan: plan_str });
        }

        let branch_name = generate_branch_name(&outline.slug);
        let worktree_dir = sanitize_branch_name(&branch_name);
        let worktree_path = self.repo_root.join(WORKTREES_DIR).join(&worktree_dir);

        if worktree_path.exists() || git.branch_exists(&branch_name) {
            return Err(ArborError::WorktreeCreationFailed {
                reason: format!("branch or worktree already exists: {}", branch_name),
            });
        }

        git.create_branch(&branch_name, &base)?;
        if let Err(e) = git.worktree_add(&worktree_path, &branch_name) {
            let _ = git.delete_branch(&branch_name, true);
            return Err(e);
        }

        // everything past this point rolls back worktree and branch on failure
        match self.initialize_session(&outline, plan_path, &base, &branch_name, &worktree_path) {
            Ok(session) => Ok(session),
            Err(e) => {
                let _ = git.worktree_remove(&worktree_path, true);
                let _ = git.delete_branch(&branch_name, true);
                Err(e)
            }
        }
    }

    fn initialize_session(
        &self,
        outline: &PlanOutline,
        plan_path: &Path,
        base: &str,
        branch_name: &str,
        worktree_path: &Path,
    ) -> Result<Session, ArborError> {
        self.run_init_command(worktree_path)?;

        let tracker = TrackerCli::new(&self.config.arbor.tracker.bd_path, worktree_path);
        let root_bead_id = if tracker.is_installed() && tracker.is_initialized() {
            Some(tracker.sync_plan(outline)?.root_id)
        } else {
            warn!("tracker unavailable; session will have no root node");
            None
        };

        // commit bookkeeping annotations made inside the worktree by the
        // init command and tracker sync
        let worktree_git = Git::new(worktree_path);
        if worktree_git.is_dirty()? {
            worktree_git.add_paths(&[".".to_string()])?;
            worktree_git.commit(&format!("chore({}): session bookkeeping", outline.slug))?;
        }

        let session_id = session_id_from_worktree(worktree_path).ok_or_else(|| {
            ArborError::WorktreeCreationFailed {
                reason: format!("unexpected worktree path: {}", worktree_path.display()),
            }
        })?;

        let session = Session {
            schema_version: "2".to_string(),
            session_id: session_id.clone(),
            plan_path: plan_path.display().to_string(),
            plan_slug: outline.slug.clone(),
            branch_name: branch_name.to_string(),
            base_branch: base.to_string(),
            worktree_path: worktree_path.display().to_string(),
            created_at: now_iso8601(),
            last_updated_at: None,
            status: SessionStatus::Pending,
            root_bead_id,
            current_step: None,
            step_summaries: Vec::new(),
            reused: false,
        };

        self.store.save(&session)?;
        std::fs::create_dir_all(self.store.artifacts_dir(&session_id))?;

        Ok(session)
    }

    /// Keep the worktrees directory out of git status without touching the
    /// project's .gitignore
    fn ensure_worktrees_excluded(&self) -> Result<(), ArborError> {
        let git_dir = self.repo_root.join(".git");
        if !git_dir.is_dir() {
            return Ok(());
        }
        let info = git_dir.join("info");
        fs::create_dir_all(&info)?;
        let exclude = info.join("exclude");
        let entry = format!("{}/", WORKTREES_DIR);
        let mut content = fs::read_to_string(&exclude).unwrap_or_default();
        if content.lines().any(|l| l.trim() == entry) {
            return Ok(());
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&entry);
        content.push('\n');
        fs::write(&exclude, content)?;
        Ok(())
    }

    fn run_init_command(&self, worktree_path: &Path) -> Result<(), ArborError> {
        let Some(command) = &self.config.arbor.init_command else {
            return Ok(());
        };
        debug!(command, worktree = %worktree_path.display(), "running init command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(worktree_path)
            .output()
            .map_err(|e| ArborError::WorktreeCreationFailed {
                reason: format!("init command failed to start: {}", e),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArborError::WorktreeCreationFailed {
                reason: format!("init command failed: {}", stderr.trim()),
            });
        }
        Ok(())
    }

    /// Resolve a removal target to matching sessions
    ///
    /// Exact branch name and exact worktree path match at most one session;
    /// anything else is treated as a plan path and may match several.
    pub fn resolve_target(&self, target: &str) -> Result<Vec<Session>, ArborError> {
        let sessions = self.store.list()?;

        if let Some(s) = sessions.iter().find(|s| s.branch_name == target) {
            return Ok(vec![s.clone()]);
        }
        if let Some(s) = sessions
            .iter()
            .find(|s| Path::new(&s.worktree_path) == Path::new(target))
        {
            return Ok(vec![s.clone()]);
        }

        let wanted = normalize_plan_path(target);
        Ok(sessions
            .into_iter()
            .filter(|s| normalize_plan_path(&s.plan_path) == wanted)
            .collect())
    }

    /// Remove a worktree, its branch, and its session record
    ///
    /// A loose target matching several worktrees fails with the full
    /// candidate list; this never auto-selects for a destructive operation.
    /// Dirty worktrees are refused without `force`.
    pub fn remove(&self, target: &str, force: bool) -> Result<Session, ArborError> {
        let mut matches = self.resolve_target(target)?;
        if matches.len() > 1 {
            return Err(ArborError::AmbiguousTarget {
                target: target.to_string(),
                candidates: matches.iter().map(describe_candidate).collect(),
            });
        }
        let Some(session) = matches.pop() else {
            return Err(ArborError::SessionNotFound {
                target: target.to_string(),
            });
        };

        let git = Git::new(&self.repo_root);
        let worktree_path = PathBuf::from(&session.worktree_path);

        if worktree_path.exists() {
            if !force && Git::new(&worktree_path).is_dirty()? {
                return Err(ArborError::WorktreeDirty {
                    path: session.worktree_path.clone(),
                });
            }
            git.worktree_remove(&worktree_path, force)?;
        }

        if git.branch_exists(&session.branch_name) {
            git.delete_branch(&session.branch_name, true)?;
        }

        self.store.delete(&session.session_id)?;
        git.worktree_prune()?;

        Ok(session)
    }
}

/// One line describing a candidate for ambiguity errors
pub fn describe_candidate(session: &Session) -> String {
    format!(
        "{} ({}, {})",
        session.branch_name, session.status, session.created_at
    )
}
