//! arbor-core: Core library for worktree and session lifecycle management
//!
//! This crate provides the session store, git/host/tracker wrappers, and
//! the orchestration engines behind the arbor CLI.

/// Core error types for arbor operations
pub mod error;

/// Configuration handling
pub mod config;

/// Session records and the on-disk session store
pub mod session;

/// Implementation plan outline parsing
pub mod plan;

/// Git subprocess wrapper
pub mod git;

/// PR host CLI wrapper (gh)
pub mod host;

/// Issue tracker CLI wrapper (bd)
pub mod tracker;

/// Infrastructure path classification
pub mod infra;

/// Worktree creation, reuse, and removal
pub mod worktree;

/// Merge orchestration
pub mod merge;

/// Batch cleanup of finished sessions
pub mod cleanup;

// Re-exports for convenience
pub use cleanup::{
    CleanupCandidate, CleanupEngine, CleanupMode, CleanupPlan, CleanupReason, CleanupResult,
    SkipRecord,
};
pub use config::{ArborConfig, Config, find_project_root};
pub use error::ArborError;
pub use git::Git;
pub use host::{HostCli, PrInfo, PrState};
pub use infra::InfraRules;
pub use merge::{MergeCoordinator, MergeMode, MergeOptions, MergeReport};
pub use plan::{PlanOutline, PlanStep};
pub use session::{
    Session, SessionStatus, SessionStore, StepPosition, StepSummary, WORKTREES_DIR,
    WORKTREE_PREFIX,
};
pub use tracker::{Issue, TrackerCli, TrackerSync};
pub use worktree::{
    generate_branch_name, sanitize_branch_name, WorktreeManager, WorktreeRecord, BRANCH_PREFIX,
};
