//! CLI argument parsing with clap derive

use clap::{Parser, Subcommand};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Arbor - ephemeral worktrees for plan-driven implementation sessions
#[derive(Parser)]
#[command(name = "arbor")]
#[command(version = VERSION)]
#[command(about = "Ephemeral worktrees for plan-driven implementation sessions")]
#[command(long_about = "Arbor manages the lifecycle of implementation sessions: each plan document gets its own branch and git worktree, a persisted session record, and optional issue-tracker nodes.\n\nSessions are created from plan files, merged back onto the base branch locally or through the PR host, and cleaned up in batch once their work has landed.")]
pub struct Cli {
    /// Increase output verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a worktree and session for a plan, or reuse the existing one
    ///
    /// Idempotent: a plan that already has a live worktree gets that
    /// worktree back instead of a new one.
    #[command(long_about = "Create a worktree and session for a plan, or reuse the existing one.\n\nCreates:\n  - A branch arbor/<slug>-<timestamp> off the base branch\n  - A worktree under .arbor-worktrees/\n  - A session record and artifacts directory\n  - Tracker nodes for the plan's steps, when bd is available\n\nIf a session already binds this plan and its worktree still exists, it is returned unchanged. Any failure during creation rolls the branch and worktree back.")]
    Create {
        /// Plan document path (e.g. .arbor/plan-auth.md)
        plan: String,

        /// Base branch to fork from (defaults to the configured base)
        #[arg(long)]
        base: Option<String>,
    },

    /// List sessions with live worktree and branch state
    #[command(long_about = "List sessions with live worktree and branch state.\n\nDisplays:\n  - Branch name and session status\n  - Resume position within the plan\n  - Whether the worktree still exists and whether it is dirty")]
    List {
        /// Filter by status (pending, in_progress, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Merge a session branch onto the base branch
    ///
    /// Local squash merge by default; --remote lands the branch through
    /// its pull request and fast-forwards afterwards.
    #[command(long_about = "Merge a session branch onto the base branch.\n\nPreconditions (checked before anything is touched):\n  - Running from the primary worktree with the base branch checked out\n  - No uncommitted user files on the base branch\n  - Base branch has not diverged from its remote\n\nThe local path squash-merges and commits; a conflict restores the base branch and aborts. The remote path stashes dirty infrastructure files, merges the PR via gh, fast-forwards, then restores and commits them as a post-merge sync.\n\nOn success the worktree, branch, and session record are removed.")]
    Merge {
        /// Branch name, worktree path, or plan path
        target: String,

        /// Merge through the pull request host instead of locally
        #[arg(long)]
        remote: bool,

        /// Show what would happen without merging
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove finished or abandoned sessions in batch
    #[command(long_about = "Remove finished or abandoned sessions in batch.\n\nModes:\n  merged    Branches already landed on the base branch (default)\n  orphaned  Inactive sessions with no pull request, plus stray worktree directories\n  stale     Session branches with no worktree, deleted only if git agrees (--force overrides)\n  all       All of the above, plus sessions whose PR was closed unmerged\n\nActive sessions are never removed. Dirty worktrees are skipped with a warning unless --force is given. A PR state that cannot be determined keeps its session out of the pass.")]
    Cleanup {
        /// What to clean: merged, orphaned, stale, or all
        #[arg(long, default_value = "merged")]
        mode: String,

        /// Discard dirty worktrees instead of skipping them
        #[arg(long)]
        force: bool,

        /// Show the selection without removing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove one session's worktree, branch, and record
    ///
    /// The target must resolve to exactly one session; an ambiguous match
    /// fails with the candidate list.
    #[command(long_about = "Remove one session's worktree, branch, and record.\n\nThe target may be a branch name, a worktree path, or a plan path. A plan path matching several sessions fails with the full candidate list rather than guessing.\n\nWithout --force, a worktree with uncommitted changes is refused.")]
    Remove {
        /// Branch name, worktree path, or plan path
        target: String,

        /// Discard uncommitted changes in the worktree
        #[arg(long)]
        force: bool,
    },

    /// Record progress on a session after completing a plan step
    #[command(long_about = "Record progress on a session after completing a plan step.\n\nAppends a step summary to the session record and advances the resume position. With --done, the session is marked completed instead.")]
    Record {
        /// Branch name, worktree path, or plan path
        target: String,

        /// Step anchor that was completed (e.g. setup-schema)
        #[arg(long, required_unless_present = "done")]
        step: Option<String>,

        /// Commit hash produced by the step
        #[arg(long)]
        commit: Option<String>,

        /// One-line summary of what the step did
        #[arg(long)]
        summary: Option<String>,

        /// Mark the whole session completed
        #[arg(long)]
        done: bool,
    },
}

/// Get the command args for use in the application
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_record_requires_step_or_done() {
        assert!(Cli::try_parse_from(["arbor", "record", "arbor/auth-1"]).is_err());
        assert!(Cli::try_parse_from(["arbor", "record", "arbor/auth-1", "--done"]).is_ok());
        assert!(
            Cli::try_parse_from(["arbor", "record", "arbor/auth-1", "--step", "setup"]).is_ok()
        );
    }
}
