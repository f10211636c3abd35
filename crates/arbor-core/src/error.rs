//! Error types for arbor operations

use thiserror::Error;

/// Core error type for arbor operations
///
/// Variants split into three families, reflected in [`ArborError::exit_code`]:
/// precondition failures (detected before any mutation), operational failures
/// (something was mutated and a restore sequence ran before surfacing), and
/// environment failures (missing tools or project setup).
#[derive(Error, Debug)]
pub enum ArborError {
    // === Precondition failures (nothing mutated) ===
    /// Uncommitted user-content files on trunk block a merge unconditionally.
    #[error(
        "uncommitted user files on {branch}; commit or stash them first:\n  {}",
        files.join("\n  ")
    )]
    DirtyUserFiles { branch: String, files: Vec<String> },

    /// Local trunk and its remote counterpart have diverged.
    #[error(
        "{branch} has diverged from {remote} ({ahead} local, {behind} remote); push or pull before merging"
    )]
    TrunkDiverged {
        branch: String,
        remote: String,
        ahead: usize,
        behind: usize,
    },

    /// Invoked from inside an ephemeral worktree instead of the trunk checkout.
    #[error("must run from the trunk worktree: {reason}")]
    NotTrunkWorktree { reason: String },

    /// A destructive operation matched more than one worktree.
    #[error(
        "target '{target}' matches {} worktrees; specify a branch name or worktree path:\n  {}",
        candidates.len(),
        candidates.join("\n  ")
    )]
    AmbiguousTarget {
        target: String,
        candidates: Vec<String>,
    },

    /// Worktree has uncommitted changes and --force was not given.
    #[error("worktree has uncommitted changes (use --force to discard): {path}")]
    WorktreeDirty { path: String },

    /// No session matches the requested plan or identifier.
    #[error("no session found for target: {target}")]
    SessionNotFound { target: String },

    /// Base branch does not exist in the repository.
    #[error("base branch not found: {branch}")]
    BaseBranchNotFound { branch: String },

    /// Plan document declares no execution steps.
    #[error("plan has no execution steps: {plan}")]
    PlanHasNoSteps { plan: String },

    // === Operational failures (mutation began; state was restored first) ===
    /// Squash merge hit conflicts; trunk was reset to its pre-merge state.
    #[error(
        "squash merge of {branch} conflicted; trunk was restored. Rebase the branch onto {base} and retry"
    )]
    MergeConflict { branch: String, base: String },

    /// Fast-forward-only pull refused to advance trunk.
    #[error("fast-forward pull of {branch} failed: {detail}")]
    FastForwardFailed { branch: String, detail: String },

    /// Worktree or branch creation failed partway; rollback already ran.
    #[error("worktree creation failed: {reason}")]
    WorktreeCreationFailed { reason: String },

    /// Worktree or branch removal failed.
    #[error("worktree cleanup failed: {reason}")]
    WorktreeCleanupFailed { reason: String },

    /// A git subprocess failed; message carries command, exit code, stderr.
    #[error("git command failed: {0}")]
    Git(String),

    /// PR host CLI command failed.
    #[error("host command failed: {0}")]
    Host(String),

    /// Issue tracker CLI command failed.
    #[error("tracker command failed: {0}")]
    Tracker(String),

    // === Environment and IO ===
    /// Not inside a git repository.
    #[error("not a git repository (no .git found)")]
    NotAGitRepository,

    /// Project has no .arbor/ directory.
    #[error(".arbor directory not initialized")]
    NotInitialized,

    /// Issue tracker CLI (bd) not installed.
    #[error("tracker CLI (bd) not installed or not found")]
    TrackerNotInstalled,

    /// PR host CLI (gh) not installed.
    #[error("host CLI (gh) not installed or not found")]
    HostCliMissing,

    /// File not found or unreadable.
    #[error("file not found or unreadable: {0}")]
    FileNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session record could not be parsed.
    #[error("session parse error: {message}")]
    SessionParse { message: String },
}

impl ArborError {
    /// True for errors detected before any mutation took place.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ArborError::DirtyUserFiles { .. }
                | ArborError::TrunkDiverged { .. }
                | ArborError::NotTrunkWorktree { .. }
                | ArborError::AmbiguousTarget { .. }
                | ArborError::WorktreeDirty { .. }
                | ArborError::SessionNotFound { .. }
                | ArborError::BaseBranchNotFound { .. }
                | ArborError::PlanHasNoSteps { .. }
        )
    }

    /// Stable code for machine-readable output.
    pub fn code(&self) -> &'static str {
        match self {
            ArborError::DirtyUserFiles { .. } => "A001",
            ArborError::TrunkDiverged { .. } => "A002",
            ArborError::NotTrunkWorktree { .. } => "A003",
            ArborError::AmbiguousTarget { .. } => "A004",
            ArborError::WorktreeDirty { .. } => "A005",
            ArborError::SessionNotFound { .. } => "A006",
            ArborError::BaseBranchNotFound { .. } => "A007",
            ArborError::PlanHasNoSteps { .. } => "A008",
            ArborError::MergeConflict { .. } => "A010",
            ArborError::FastForwardFailed { .. } => "A011",
            ArborError::WorktreeCreationFailed { .. } => "A012",
            ArborError::WorktreeCleanupFailed { .. } => "A013",
            ArborError::Git(_) => "A014",
            ArborError::Host(_) => "A015",
            ArborError::Tracker(_) => "A016",
            ArborError::NotAGitRepository => "A020",
            ArborError::NotInitialized => "A021",
            ArborError::TrackerNotInstalled => "A022",
            ArborError::HostCliMissing => "A023",
            ArborError::FileNotFound(_) => "A024",
            ArborError::Io(_) => "A025",
            ArborError::Config(_) => "A026",
            ArborError::SessionParse { .. } => "A027",
        }
    }

    /// Process exit code: 0 success (never returned here), 2 precondition
    /// failure, 1 operational failure, higher codes for environment problems.
    pub fn exit_code(&self) -> i32 {
        match self {
            e if e.is_precondition() => 2,

            ArborError::NotAGitRepository => 5,
            ArborError::NotInitialized => 9,
            ArborError::TrackerNotInstalled => 6,
            ArborError::HostCliMissing => 7,

            ArborError::MergeConflict { .. }
            | ArborError::FastForwardFailed { .. }
            | ArborError::WorktreeCreationFailed { .. }
            | ArborError::WorktreeCleanupFailed { .. }
            | ArborError::Git(_)
            | ArborError::Host(_)
            | ArborError::Tracker(_)
            | ArborError::FileNotFound(_)
            | ArborError::Io(_)
            | ArborError::Config(_)
            | ArborError::SessionParse { .. } => 1,

            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        let err = ArborError::DirtyUserFiles {
            branch: "main".to_string(),
            files: vec!["src/lib.rs".to_string()],
        };
        assert!(err.is_precondition());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.code(), "A001");

        let err = ArborError::MergeConflict {
            branch: "arbor/auth-20260301-120000".to_string(),
            base: "main".to_string(),
        };
        assert!(!err.is_precondition());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_environment_exit_codes() {
        assert_eq!(ArborError::NotAGitRepository.exit_code(), 5);
        assert_eq!(ArborError::NotInitialized.exit_code(), 9);
        assert_eq!(ArborError::TrackerNotInstalled.exit_code(), 6);
        assert_eq!(ArborError::HostCliMissing.exit_code(), 7);
    }

    #[test]
    fn test_ambiguous_target_display_lists_candidates() {
        let err = ArborError::AmbiguousTarget {
            target: ".arbor/plan-auth.md".to_string(),
            candidates: vec![
                "arbor/auth-20260301-120000 (in_progress, 2026-03-01T12:00:00Z)".to_string(),
                "arbor/auth-20260302-090000 (pending, 2026-03-02T09:00:00Z)".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("matches 2 worktrees"));
        assert!(msg.contains("arbor/auth-20260301-120000"));
        assert!(msg.contains("arbor/auth-20260302-090000"));
    }

    #[test]
    fn test_diverged_message_is_actionable() {
        let err = ArborError::TrunkDiverged {
            branch: "main".to_string(),
            remote: "origin/main".to_string(),
            ahead: 1,
            behind: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("diverged"));
        assert!(msg.contains("push or pull"));
    }
}
