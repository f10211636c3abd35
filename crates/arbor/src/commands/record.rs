//! Implementation of the `arbor record` command

use std::path::Path;

use arbor_core::{
    session::now_iso8601, ArborError, Session, SessionStatus, StepPosition, TrackerCli,
    WorktreeManager,
};
use owo_colors::OwoColorize;

use crate::colors::COLORS;
use crate::output::{emit_error, print_json, JsonResponse, RecordData};

/// Run the record command
#[allow(clippy::too_many_arguments)]
pub fn run_record(
    target: String,
    step: Option<String>,
    commit: Option<String>,
    summary: Option<String>,
    done: bool,
    json_output: bool,
    quiet: bool,
) -> Result<i32, String> {
    let (root, config) = match super::load_project() {
        Ok(v) => v,
        Err(e) => return Ok(emit_error::<RecordData>("record", &e, json_output)),
    };

    let bd_path = config.arbor.tracker.bd_path.clone();
    let manager = WorktreeManager::new(&root, config);
    let mut session = match resolve_one(&manager, &target) {
        Ok(s) => s,
        Err(e) => return Ok(emit_error::<RecordData>("record", &e, json_output)),
    };

    if done {
        session.status = SessionStatus::Completed;
        session.current_step = Some(StepPosition::Done);
        session.last_updated_at = Some(now_iso8601());
    } else if let Some(step) = step {
        session.record_step(
            &step,
            commit.as_deref().unwrap_or(""),
            summary.as_deref().unwrap_or(""),
        );
        session.current_step = Some(StepPosition::Anchor(step));
        if session.status == SessionStatus::Pending {
            session.status = SessionStatus::InProgress;
        }
    }

    if let Err(e) = manager.store().save(&session) {
        return Ok(emit_error::<RecordData>("record", &e, json_output));
    }

    let position = session
        .current_step
        .as_ref()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let data = RecordData {
        session_id: session.session_id.clone(),
        status: session.status.to_string(),
        position: position.clone(),
        steps_recorded: session.step_summaries.len(),
    };

    if json_output {
        print_json(&JsonResponse::ok("record", data));
    } else if !quiet {
        if done {
            println!(
                "{} session {}",
                "Completed".style(COLORS.success),
                session.session_id
            );
        } else {
            println!(
                "{} progress for {} ({})",
                "Recorded".style(COLORS.success),
                session.session_id,
                position
            );
            if let Some(next) = next_ready_step(&bd_path, &session) {
                println!("  next ready: {}", next);
            }
        }
    }

    Ok(0)
}

/// Best-effort: the first tracker node under the session's root that is
/// open with no unmet dependencies
fn next_ready_step(bd_path: &str, session: &Session) -> Option<String> {
    let root_id = session.root_bead_id.as_deref()?;
    let tracker = TrackerCli::new(bd_path, Path::new(&session.worktree_path));
    if !tracker.is_installed() || !tracker.is_initialized() {
        return None;
    }
    let ready = tracker.ready(root_id).ok()?;
    ready.first().map(|issue| format!("{} {}", issue.id, issue.title))
}

fn resolve_one(
    manager: &WorktreeManager,
    target: &str,
) -> Result<arbor_core::Session, ArborError> {
    let mut matches = manager.resolve_target(target)?;
    if matches.len() > 1 {
        return Err(ArborError::AmbiguousTarget {
            target: target.to_string(),
            candidates: matches
                .iter()
                .map(arbor_core::worktree::describe_candidate)
                .collect(),
        });
    }
    matches.pop().ok_or_else(|| ArborError::SessionNotFound {
        target: target.to_string(),
    })
}
