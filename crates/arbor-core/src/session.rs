//! Session records and their on-disk store
//!
//! One JSON file per session under `.arbor-worktrees/.sessions/`, named by the
//! session id derived from the worktree directory. Writes are atomic
//! (temp file + rename) so a concurrent reader never observes a partial
//! record, and loads tolerate records written by older schema variants.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::ArborError;

/// Directory under the repo root holding worktrees, sessions, and artifacts
pub const WORKTREES_DIR: &str = ".arbor-worktrees";

/// Prefix on worktree directory basenames
pub const WORKTREE_PREFIX: &str = "arbor__";

/// Infrastructural session status
///
/// This is bookkeeping about the session itself, never about which steps are
/// done; the issue tracker is the sole authority for step completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created but no work recorded yet
    Pending,
    /// Implementation in progress (the default for records missing the field)
    #[default]
    InProgress,
    /// Work finished; branch awaiting or past merge
    Completed,
    /// Implementation abandoned
    Failed,
}

impl SessionStatus {
    /// Active sessions are protected from every cleanup mode.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::InProgress)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Position within a plan's step sequence
///
/// Legacy records encode this three ways: a numeric index, a step anchor
/// string, or null meaning all steps are done. The serde impls keep each
/// shape as written rather than coercing one into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepPosition {
    /// 0-based step index
    Index(usize),
    /// Step anchor, e.g. "step-2"
    Anchor(String),
    /// All steps complete (encoded as null)
    Done,
}

impl fmt::Display for StepPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPosition::Index(i) => write!(f, "step {}", i),
            StepPosition::Anchor(a) => write!(f, "#{}", a),
            StepPosition::Done => write!(f, "done"),
        }
    }
}

impl Serialize for StepPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StepPosition::Index(i) => serializer.serialize_u64(*i as u64),
            StepPosition::Anchor(a) => serializer.serialize_str(a),
            StepPosition::Done => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for StepPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PositionVisitor;

        impl<'de> Visitor<'de> for PositionVisitor {
            type Value = StepPosition;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a step index, a step anchor, or null")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<StepPosition, E> {
                Ok(StepPosition::Index(v as usize))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<StepPosition, E> {
                if v < 0 {
                    return Err(E::custom(format!("negative step index: {}", v)));
                }
                Ok(StepPosition::Index(v as usize))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StepPosition, E> {
                Ok(StepPosition::Anchor(v.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<StepPosition, E> {
                Ok(StepPosition::Done)
            }

            fn visit_none<E: de::Error>(self) -> Result<StepPosition, E> {
                Ok(StepPosition::Done)
            }
        }

        deserializer.deserialize_any(PositionVisitor)
    }
}

/// Deserialize a present-but-possibly-null step position field.
///
/// Present null means Done; an absent field falls back to the serde default
/// (None) without ever reaching this function.
fn de_step_position<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<StepPosition>, D::Error> {
    Ok(Some(StepPosition::deserialize(deserializer)?))
}

/// Summary of one committed unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    /// Step anchor within the plan
    pub step: String,
    /// Commit hash the step landed as
    pub commit: String,
    /// One-line human summary
    pub summary: String,
}

/// State for one worktree-based implementation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Schema version for forward compatibility
    pub schema_version: String,
    /// Identity key derived from the worktree directory name
    #[serde(default)]
    pub session_id: String,
    /// Repo-root-relative path to the plan document
    pub plan_path: String,
    /// Short name derived from the plan filename
    pub plan_slug: String,
    /// Branch created for this session
    pub branch_name: String,
    /// Trunk branch merges land on
    pub base_branch: String,
    /// Absolute path to the worktree directory
    pub worktree_path: String,
    /// ISO 8601 creation timestamp
    pub created_at: String,
    /// ISO 8601 timestamp of the last record mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<String>,
    /// Infrastructural status; never step-completion truth
    #[serde(default)]
    pub status: SessionStatus,
    /// Root node in the issue tracker, held by id only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_bead_id: Option<String>,
    /// Resume position within the plan; legacy encodings are kept as written
    #[serde(
        default,
        alias = "resume_point",
        deserialize_with = "de_step_position",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_step: Option<StepPosition>,
    /// Ordered record of committed work
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub step_summaries: Vec<StepSummary>,
    /// True when create_or_reuse returned an existing session; never persisted
    #[serde(skip)]
    pub reused: bool,
}

impl Session {
    /// Append a completed unit of work and bump the update timestamp.
    pub fn record_step(&mut self, step: &str, commit: &str, summary: &str) {
        self.step_summaries.push(StepSummary {
            step: step.to_string(),
            commit: commit.to_string(),
            summary: summary.to_string(),
        });
        self.last_updated_at = Some(now_iso8601());
    }
}

/// ISO 8601 UTC timestamp, millisecond precision
pub fn now_iso8601() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Extract the session id from a worktree directory path
///
/// `.arbor-worktrees/arbor__auth-20260301-120000` yields
/// `auth-20260301-120000`; paths without the prefix yield None.
pub fn session_id_from_worktree(worktree_path: &Path) -> Option<String> {
    let basename = worktree_path.file_name()?.to_str()?;
    basename.strip_prefix(WORKTREE_PREFIX).map(|s| s.to_string())
}

/// Atomic, schema-tolerant persistence of session records
///
/// Owns the `.sessions/` and `.artifacts/` layout under the worktrees
/// directory of a repo root.
#[derive(Debug, Clone)]
pub struct SessionStore {
    repo_root: PathBuf,
}

impl SessionStore {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
        }
    }

    /// `<repo_root>/.arbor-worktrees/.sessions/`
    pub fn sessions_dir(&self) -> PathBuf {
        self.repo_root.join(WORKTREES_DIR).join(".sessions")
    }

    /// `<repo_root>/.arbor-worktrees/.artifacts/<session-id>/`
    pub fn artifacts_dir(&self, session_id: &str) -> PathBuf {
        self.repo_root
            .join(WORKTREES_DIR)
            .join(".artifacts")
            .join(session_id)
    }

    /// `<repo_root>/.arbor-worktrees/.sessions/<session-id>.json`
    pub fn session_file(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", session_id))
    }

    /// Persist a session record atomically
    ///
    /// Writes a temp file in the sessions directory, syncs it, then renames
    /// over the target. On any failure an existing record is left untouched.
    pub fn save(&self, session: &Session) -> Result<(), ArborError> {
        let session_id = if session.session_id.is_empty() {
            session_id_from_worktree(Path::new(&session.worktree_path)).ok_or_else(|| {
                ArborError::SessionParse {
                    message: format!(
                        "cannot derive session id from worktree path: {}",
                        session.worktree_path
                    ),
                }
            })?
        } else {
            session.session_id.clone()
        };

        let dir = self.sessions_dir();
        fs::create_dir_all(&dir)?;

        let target = self.session_file(&session_id);

        let content =
            serde_json::to_string_pretty(session).map_err(|e| ArborError::SessionParse {
                message: format!("failed to serialize session: {}", e),
            })?;

        // NamedTempFile cleans itself up if anything below fails
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target)
            .map_err(|e| ArborError::Io(e.error))?;

        Ok(())
    }

    /// Load a session by id
    ///
    /// Tolerates legacy records: missing optional fields take defaults and
    /// the session id is re-derived from the worktree path when absent.
    pub fn load(&self, session_id: &str) -> Result<Session, ArborError> {
        let path = self.session_file(session_id);
        if !path.exists() {
            return Err(ArborError::SessionNotFound {
                target: session_id.to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;
        let mut session: Session =
            serde_json::from_str(&content).map_err(|e| ArborError::SessionParse {
                message: format!("{}: {}", path.display(), e),
            })?;
        if session.session_id.is_empty() {
            session.session_id = session_id_from_worktree(Path::new(&session.worktree_path))
                .unwrap_or_else(|| session_id.to_string());
        }
        Ok(session)
    }

    /// Delete a session record and its artifacts tree
    ///
    /// Idempotent: absence of either is not an error.
    pub fn delete(&self, session_id: &str) -> Result<(), ArborError> {
        let record = self.session_file(session_id);
        if record.exists() {
            fs::remove_file(&record)?;
        }
        let artifacts = self.artifacts_dir(session_id);
        if artifacts.exists() {
            fs::remove_dir_all(&artifacts)?;
        }
        Ok(())
    }

    /// Enumerate all session records
    ///
    /// Unreadable or corrupt records are skipped with a warning so one bad
    /// file never hides the rest.
    pub fn list(&self) -> Result<Vec<Session>, ArborError> {
        let dir = self.sessions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(session_id) = name.strip_suffix(".json") else {
                continue;
            };
            match self.load(session_id) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(session_id, error = %e, "skipping unreadable session record"),
            }
        }

        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session(store: &SessionStore, id: &str) -> Session {
        let worktree = store
            .repo_root
            .join(WORKTREES_DIR)
            .join(format!("{}{}", WORKTREE_PREFIX, id));
        Session {
            schema_version: "2".to_string(),
            session_id: id.to_string(),
            plan_path: ".arbor/plan-auth.md".to_string(),
            plan_slug: "auth".to_string(),
            branch_name: format!("arbor/{}", id),
            base_branch: "main".to_string(),
            worktree_path: worktree.display().to_string(),
            created_at: "2026-03-01T12:00:00.000Z".to_string(),
            last_updated_at: None,
            status: SessionStatus::InProgress,
            root_bead_id: Some("bd-auth1".to_string()),
            current_step: None,
            step_summaries: vec![],
            reused: false,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(temp.path());
        let mut session = sample_session(&store, "auth-20260301-120000");
        session.record_step("step-0", "abc1234", "scaffolding in place");

        store.save(&session).unwrap();
        let loaded = store.load("auth-20260301-120000").unwrap();

        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.plan_path, session.plan_path);
        assert_eq!(loaded.branch_name, session.branch_name);
        assert_eq!(loaded.base_branch, session.base_branch);
        assert_eq!(loaded.status, SessionStatus::InProgress);
        assert_eq!(loaded.root_bead_id, Some("bd-auth1".to_string()));
        assert_eq!(loaded.step_summaries.len(), 1);
        assert_eq!(loaded.step_summaries[0].step, "step-0");
        assert!(loaded.last_updated_at.is_some());
    }

    #[test]
    fn test_save_is_atomic_no_temp_left_behind() {
        let temp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(temp.path());
        let session = sample_session(&store, "auth-20260301-120000");
        store.save(&session).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(store.sessions_dir())
            .unwrap()
            .flatten()
            .filter(|e| !e.file_name().to_string_lossy().ends_with(".json"))
            .collect();
        assert!(leftovers.is_empty(), "temp file left behind: {:?}", leftovers);
    }

    #[test]
    fn test_legacy_integer_step_position() {
        let temp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(temp.path());
        let json = r#"{
            "schema_version": "1",
            "plan_path": ".arbor/plan-auth.md",
            "plan_slug": "auth",
            "branch_name": "arbor/auth-20260301-120000",
            "base_branch": "main",
            "worktree_path": "/repo/.arbor-worktrees/arbor__auth-20260301-120000",
            "created_at": "2026-03-01T12:00:00Z",
            "current_step": 2
        }"#;
        std::fs::create_dir_all(store.sessions_dir()).unwrap();
        std::fs::write(store.session_file("auth-20260301-120000"), json).unwrap();

        let session = store.load("auth-20260301-120000").unwrap();
        assert_eq!(session.current_step, Some(StepPosition::Index(2)));
        // missing optionals take documented defaults
        assert_eq!(session.status, SessionStatus::InProgress);
        assert!(session.step_summaries.is_empty());
        assert!(!session.reused);
        // id re-derived from worktree path
        assert_eq!(session.session_id, "auth-20260301-120000");
    }

    #[test]
    fn test_legacy_anchor_and_null_step_positions() {
        let anchor: Session = serde_json::from_str(
            r#"{
                "schema_version": "1",
                "plan_path": "p", "plan_slug": "p",
                "branch_name": "b", "base_branch": "main",
                "worktree_path": "/w/arbor__p-1",
                "created_at": "2026-03-01T12:00:00Z",
                "current_step": "step-3"
            }"#,
        )
        .unwrap();
        assert_eq!(
            anchor.current_step,
            Some(StepPosition::Anchor("step-3".to_string()))
        );

        let done: Session = serde_json::from_str(
            r#"{
                "schema_version": "1",
                "plan_path": "p", "plan_slug": "p",
                "branch_name": "b", "base_branch": "main",
                "worktree_path": "/w/arbor__p-1",
                "created_at": "2026-03-01T12:00:00Z",
                "current_step": null
            }"#,
        )
        .unwrap();
        assert_eq!(done.current_step, Some(StepPosition::Done));

        let absent: Session = serde_json::from_str(
            r#"{
                "schema_version": "1",
                "plan_path": "p", "plan_slug": "p",
                "branch_name": "b", "base_branch": "main",
                "worktree_path": "/w/arbor__p-1",
                "created_at": "2026-03-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(absent.current_step, None);
    }

    #[test]
    fn test_reserialization_no_key_pollution() {
        let json = r#"{
            "schema_version": "1",
            "plan_path": "p", "plan_slug": "p",
            "branch_name": "b", "base_branch": "main",
            "worktree_path": "/w/arbor__p-1",
            "created_at": "2026-03-01T12:00:00Z"
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        let out = serde_json::to_string(&session).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("current_step"));
        assert!(!obj.contains_key("resume_point"));
        assert!(!obj.contains_key("root_bead_id"));
        assert!(!obj.contains_key("last_updated_at"));
        assert!(!obj.contains_key("step_summaries"));
    }

    #[test]
    fn test_step_position_shape_preserved() {
        // each legacy shape re-serializes as itself, never coerced
        let idx = serde_json::to_value(StepPosition::Index(4)).unwrap();
        assert!(idx.is_u64());
        let anchor = serde_json::to_value(StepPosition::Anchor("step-1".into())).unwrap();
        assert!(anchor.is_string());
        let done = serde_json::to_value(StepPosition::Done).unwrap();
        assert!(done.is_null());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(temp.path());

        // nothing exists yet
        store.delete("missing-20260301-120000").unwrap();

        let session = sample_session(&store, "auth-20260301-120000");
        store.save(&session).unwrap();
        let artifacts = store.artifacts_dir("auth-20260301-120000");
        std::fs::create_dir_all(artifacts.join("step-1")).unwrap();
        std::fs::write(artifacts.join("step-1").join("log.txt"), "log").unwrap();

        store.delete("auth-20260301-120000").unwrap();
        assert!(!store.session_file("auth-20260301-120000").exists());
        assert!(!artifacts.exists());

        // second delete is a no-op
        store.delete("auth-20260301-120000").unwrap();
    }

    #[test]
    fn test_list_skips_corrupt_records() {
        let temp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(temp.path());
        store.save(&sample_session(&store, "auth-20260301-120000")).unwrap();
        std::fs::write(store.session_file("bad-20260301-130000"), "{ nope").unwrap();

        let sessions = store.list().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "auth-20260301-120000");
    }

    #[test]
    fn test_session_id_from_worktree() {
        assert_eq!(
            session_id_from_worktree(Path::new(
                "/repo/.arbor-worktrees/arbor__auth-20260301-120000"
            )),
            Some("auth-20260301-120000".to_string())
        );
        assert_eq!(
            session_id_from_worktree(Path::new(".arbor-worktrees/other__auth-1")),
            None
        );
        assert_eq!(session_id_from_worktree(Path::new("/")), None);
    }

    #[test]
    fn test_status_active_guard() {
        assert!(SessionStatus::Pending.is_active());
        assert!(SessionStatus::InProgress.is_active());
        assert!(!SessionStatus::Completed.is_active());
        assert!(!SessionStatus::Failed.is_active());
    }
}
