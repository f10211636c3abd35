//! JSON output formatting

use arbor_core::ArborError;
use serde::{Deserialize, Serialize};

const SCHEMA_VERSION: &str = "1";

/// JSON response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse<T> {
    /// Schema version for forward compatibility
    pub schema_version: String,
    /// Command that generated this response
    pub command: String,
    /// Status: "ok" or "error"
    pub status: String,
    /// Command-specific payload
    pub data: T,
    /// Warnings and errors
    pub issues: Vec<JsonIssue>,
}

impl<T> JsonResponse<T> {
    /// Create a successful response
    pub fn ok(command: &str, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            command: command.to_string(),
            status: "ok".to_string(),
            data,
            issues: vec![],
        }
    }

    /// Create an error response
    pub fn error(command: &str, data: T, issues: Vec<JsonIssue>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            command: command.to_string(),
            status: "error".to_string(),
            data,
            issues,
        }
    }
}

/// Issue object structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonIssue {
    /// Error/warning code (e.g., "A001")
    pub code: String,
    /// Severity level
    pub severity: String,
    /// Human-readable message
    pub message: String,
}

impl From<&ArborError> for JsonIssue {
    fn from(err: &ArborError) -> Self {
        Self {
            code: err.code().to_string(),
            severity: "error".to_string(),
            message: err.to_string(),
        }
    }
}

/// Print an error in the requested format and return its exit code
pub fn emit_error<T: Serialize + Default>(command: &str, err: &ArborError, json: bool) -> i32 {
    if json {
        let response: JsonResponse<T> =
            JsonResponse::error(command, T::default(), vec![JsonIssue::from(err)]);
        print_json(&response);
    } else {
        eprintln!("error: {}", err);
    }
    err.exit_code()
}

/// Serialize a response to stdout, falling back to a plain error line
pub fn print_json<T: Serialize>(response: &JsonResponse<T>) {
    match serde_json::to_string_pretty(response) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("error: failed to serialize output: {}", e),
    }
}

/// Data payload for create command
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateData {
    pub session_id: String,
    pub branch: String,
    pub worktree_path: String,
    pub plan: String,
    pub base: String,
    /// True when an existing worktree was returned instead of a new one
    pub reused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_bead_id: Option<String>,
}

/// Data payload for list command
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListData {
    pub sessions: Vec<SessionSummary>,
}

/// One session row for list output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub branch: String,
    pub status: String,
    pub plan: String,
    /// Resume position within the plan ("-" when untouched)
    pub position: String,
    pub created_at: String,
    pub worktree_exists: bool,
    pub dirty: bool,
}

/// Data payload for merge command
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MergeData {
    pub branch: String,
    pub base: String,
    pub mode: String,
    pub dry_run: bool,
    pub commits_merged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stashed_infra: Vec<String>,
    pub pushed: bool,
    pub cleaned_up: bool,
}

/// Data payload for cleanup command
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleanupData {
    pub mode: String,
    pub dry_run: bool,
    pub removed: Vec<CleanupItem>,
    pub skipped: Vec<SkipItem>,
    pub failed: Vec<SkipItem>,
}

/// One removed (or selected) cleanup target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupItem {
    pub target: String,
    pub reason: String,
}

/// One skipped or failed cleanup target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipItem {
    pub target: String,
    pub reason: String,
}

/// Data payload for remove command
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoveData {
    pub session_id: String,
    pub branch: String,
    pub worktree_path: String,
}

/// Data payload for record command
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecordData {
    pub session_id: String,
    pub status: String,
    pub position: String,
    pub steps_recorded: usize,
}
