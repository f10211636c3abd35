//! Integration tests for batch cleanup
//!
//! PR-state-driven selection needs a live host, so these cover local merge
//! detection, stale and stray handling, and the active-session guard. In
//! this environment PR state always resolves to Unknown, which must keep
//! sessions out of merged/orphaned selection.

use std::fs;
use std::path::Path;
use std::process::Command;

use arbor_core::{
    CleanupEngine, CleanupMode, CleanupReason, Config, Git, Session, SessionStatus,
    WorktreeManager, WORKTREES_DIR,
};

fn setup_repo() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("failed to create temp dir");
    git(temp.path(), &["init", "-b", "main"]);
    git(temp.path(), &["config", "user.name", "Test User"]);
    git(temp.path(), &["config", "user.email", "test@example.com"]);

    fs::create_dir_all(temp.path().join(".arbor")).unwrap();
    fs::write(
        temp.path().join(".arbor/plan-auth.md"),
        "# Auth Feature\n\n### Step 1: Set up schema {#setup-schema}\n\nDetails.\n",
    )
    .unwrap();
    git(temp.path(), &["add", "."]);
    git(temp.path(), &["commit", "-m", "Initial commit"]);
    temp
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn create_session(root: &Path) -> Session {
    WorktreeManager::new(root, Config::default())
        .create_or_reuse(Path::new(".arbor/plan-auth.md"), None)
        .expect("create failed")
}

fn set_status(root: &Path, session: &Session, status: SessionStatus) {
    let mgr = WorktreeManager::new(root, Config::default());
    let mut s = mgr.store().load(&session.session_id).unwrap();
    s.status = status;
    mgr.store().save(&s).unwrap();
}

#[test]
fn test_active_session_is_never_selected() {
    let temp = setup_repo();
    let session = create_session(temp.path());

    let engine = CleanupEngine::new(temp.path(), Config::default());
    let plan = engine.plan(CleanupMode::All).unwrap();

    assert!(plan.candidates.is_empty());
    assert!(plan
        .skipped
        .iter()
        .any(|s| s.target == session.branch_name && s.reason.contains("pending")));
}

#[test]
fn test_active_session_with_missing_worktree_is_skipped() {
    let temp = setup_repo();
    let session = create_session(temp.path());
    fs::remove_dir_all(&session.worktree_path).unwrap();

    let engine = CleanupEngine::new(temp.path(), Config::default());
    for mode in [CleanupMode::Orphaned, CleanupMode::Stale, CleanupMode::All] {
        let plan = engine.plan(mode).unwrap();
        assert!(
            !plan
                .candidates
                .iter()
                .any(|c| c.session_id.as_deref() == Some(&session.session_id)),
            "active session selected under {} mode",
            mode
        );
        assert!(plan
            .skipped
            .iter()
            .any(|s| s.target == session.branch_name && s.reason.contains("pending")));
    }
}

#[test]
fn test_merged_cleanup_removes_landed_session() {
    let temp = setup_repo();
    let session = create_session(temp.path());
    // branch tip still equals main, so it counts as landed
    set_status(temp.path(), &session, SessionStatus::Completed);

    let engine = CleanupEngine::new(temp.path(), Config::default());
    let plan = engine.plan(CleanupMode::Merged).unwrap();
    assert_eq!(plan.candidates.len(), 1);
    assert_eq!(plan.candidates[0].reason, CleanupReason::MergedLocally);

    let result = engine.apply(&plan, false).unwrap();
    assert_eq!(result.removed.len(), 1);
    assert!(result.failed.is_empty());

    let git_facts = Git::new(temp.path());
    assert!(!git_facts.branch_exists(&session.branch_name));
    assert!(!Path::new(&session.worktree_path).exists());
    let mgr = WorktreeManager::new(temp.path(), Config::default());
    assert!(mgr.store().list().unwrap().is_empty());
}

#[test]
fn test_unlanded_branch_skipped_on_unknown_pr_state() {
    let temp = setup_repo();
    let session = create_session(temp.path());
    let worktree = Path::new(&session.worktree_path);
    fs::write(worktree.join("feature.rs"), "pub fn feature() {}\n").unwrap();
    git(worktree, &["add", "."]);
    git(worktree, &["commit", "-m", "Add feature"]);
    set_status(temp.path(), &session, SessionStatus::Completed);

    let engine = CleanupEngine::new(temp.path(), Config::default());
    for mode in [CleanupMode::Merged, CleanupMode::Orphaned] {
        let plan = engine.plan(mode).unwrap();
        assert!(plan.candidates.is_empty());
        assert!(plan
            .skipped
            .iter()
            .any(|s| s.target == session.branch_name
                && s.reason.contains("pull request state")));
    }
}

#[test]
fn test_dirty_worktree_skipped_without_force() {
    let temp = setup_repo();
    let session = create_session(temp.path());
    set_status(temp.path(), &session, SessionStatus::Completed);
    fs::write(Path::new(&session.worktree_path).join("wip.txt"), "x").unwrap();

    let engine = CleanupEngine::new(temp.path(), Config::default());
    let plan = engine.plan(CleanupMode::Merged).unwrap();
    assert_eq!(plan.candidates.len(), 1);

    let result = engine.apply(&plan, false).unwrap();
    assert!(result.removed.is_empty());
    assert!(result
        .skipped
        .iter()
        .any(|s| s.reason.contains("uncommitted")));
    assert!(Path::new(&session.worktree_path).exists());

    // force discards the dirty worktree
    let result = engine.apply(&plan, true).unwrap();
    assert_eq!(result.removed.len(), 1);
    assert!(!Path::new(&session.worktree_path).exists());
}

#[test]
fn test_orphaned_cleanup_reclaims_stray_dir() {
    let temp = setup_repo();
    let stray = temp.path().join(WORKTREES_DIR).join("arbor__stray-20250101-000000");
    fs::create_dir_all(&stray).unwrap();
    fs::write(stray.join("leftover.txt"), "x").unwrap();

    let engine = CleanupEngine::new(temp.path(), Config::default());
    let plan = engine.plan(CleanupMode::Orphaned).unwrap();
    assert_eq!(plan.candidates.len(), 1);
    assert_eq!(plan.candidates[0].reason, CleanupReason::StrayWorktree);

    let result = engine.apply(&plan, false).unwrap();
    assert_eq!(result.removed.len(), 1);
    assert!(!stray.exists());
}

#[test]
fn test_stale_cleanup_reclaims_record_with_missing_worktree() {
    let temp = setup_repo();
    let session = create_session(temp.path());
    set_status(temp.path(), &session, SessionStatus::Failed);
    // worktree deleted by hand, so git still has it registered
    fs::remove_dir_all(&session.worktree_path).unwrap();

    let engine = CleanupEngine::new(temp.path(), Config::default());
    let plan = engine.plan(CleanupMode::Stale).unwrap();
    assert_eq!(plan.candidates.len(), 1);
    assert_eq!(plan.candidates[0].reason, CleanupReason::StaleBranch);

    let result = engine.apply(&plan, false).unwrap();
    assert_eq!(result.removed.len(), 1);
    assert!(result.failed.is_empty(), "failed: {:?}", result.failed);

    let git_facts = Git::new(temp.path());
    assert!(!git_facts.branch_exists(&session.branch_name));
    let mgr = WorktreeManager::new(temp.path(), Config::default());
    assert!(mgr.store().list().unwrap().is_empty());
}

#[test]
fn test_stale_cleanup_deletes_only_safe_branches() {
    let temp = setup_repo();
    // a session branch with no worktree and no record, fully contained in main
    git(temp.path(), &["branch", "arbor/old-20250101-000000"]);
    // and one carrying an unmerged commit
    git(temp.path(), &["checkout", "-b", "arbor/risky-20250101-000000"]);
    fs::write(temp.path().join("risky.txt"), "x").unwrap();
    git(temp.path(), &["add", "."]);
    git(temp.path(), &["commit", "-m", "Unmerged work"]);
    git(temp.path(), &["checkout", "main"]);

    let engine = CleanupEngine::new(temp.path(), Config::default());
    let plan = engine.plan(CleanupMode::Stale).unwrap();
    assert_eq!(plan.candidates.len(), 2);
    assert!(plan
        .candidates
        .iter()
        .all(|c| c.reason == CleanupReason::StaleBranch));

    let result = engine.apply(&plan, false).unwrap();
    let git_facts = Git::new(temp.path());
    assert!(!git_facts.branch_exists("arbor/old-20250101-000000"));
    // the unmerged branch survives because -d refuses it
    assert!(git_facts.branch_exists("arbor/risky-20250101-000000"));
    assert_eq!(result.removed.len(), 1);
    assert_eq!(result.failed.len(), 1);

    // force upgrades the delete to -D
    let result = engine.apply(&plan, true).unwrap();
    assert!(!git_facts.branch_exists("arbor/risky-20250101-000000"));
    assert!(result.failed.is_empty(), "failed: {:?}", result.failed);
}

#[test]
fn test_non_arbor_branches_are_untouched() {
    let temp = setup_repo();
    git(temp.path(), &["branch", "feature/manual"]);

    let engine = CleanupEngine::new(temp.path(), Config::default());
    let plan = engine.plan(CleanupMode::All).unwrap();
    assert!(plan.candidates.is_empty());
    assert!(Git::new(temp.path()).branch_exists("feature/manual"));
}
