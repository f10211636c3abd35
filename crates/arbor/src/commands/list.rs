//! Implementation of the `arbor list` command

use arbor_core::{StepPosition, WorktreeManager, WorktreeRecord};
use owo_colors::OwoColorize;

use crate::colors::status_style;
use crate::output::{emit_error, print_json, JsonResponse, ListData, SessionSummary};

/// Run the list command
pub fn run_list(
    status_filter: Option<String>,
    json_output: bool,
    quiet: bool,
) -> Result<i32, String> {
    let (root, config) = match super::load_project() {
        Ok(v) => v,
        Err(e) => return Ok(emit_error::<ListData>("list", &e, json_output)),
    };

    let manager = WorktreeManager::new(&root, config);
    let records = match manager.records() {
        Ok(r) => r,
        Err(e) => return Ok(emit_error::<ListData>("list", &e, json_output)),
    };

    let mut summaries: Vec<SessionSummary> = Vec::new();
    for record in &records {
        let summary = summarize(record);
        if let Some(ref filter) = status_filter {
            if !summary.status.eq_ignore_ascii_case(filter) {
                continue;
            }
        }
        summaries.push(summary);
    }

    if json_output {
        print_json(&JsonResponse::ok("list", ListData { sessions: summaries }));
    } else if !quiet {
        if summaries.is_empty() {
            println!("No sessions found");
        } else {
            output_table(&summaries);
        }
    }

    Ok(0)
}

fn summarize(record: &WorktreeRecord) -> SessionSummary {
    let session = &record.session;
    let position = match &session.current_step {
        Some(StepPosition::Done) => "done".to_string(),
        Some(pos) => pos.to_string(),
        None => "-".to_string(),
    };
    SessionSummary {
        branch: session.branch_name.clone(),
        status: session.status.to_string(),
        plan: session.plan_path.clone(),
        position,
        created_at: session.created_at.clone(),
        worktree_exists: record.worktree_exists,
        dirty: record.dirty,
    }
}

/// Output a formatted table
fn output_table(summaries: &[SessionSummary]) {
    let branch_width = summaries
        .iter()
        .map(|s| s.branch.len())
        .max()
        .unwrap_or(6)
        .max(6);
    let status_width = summaries
        .iter()
        .map(|s| s.status.len())
        .max()
        .unwrap_or(6)
        .max(6);

    println!(
        "{:<branch_width$}  {:<status_width$}  {:<10}  {}",
        "BRANCH",
        "STATUS",
        "POSITION",
        "WORKTREE",
        branch_width = branch_width,
        status_width = status_width
    );

    for summary in summaries {
        let worktree = if !summary.worktree_exists {
            "missing".to_string()
        } else if summary.dirty {
            "dirty".to_string()
        } else {
            "clean".to_string()
        };
        // pad before styling so escape codes do not skew the columns
        let status = format!("{:<status_width$}", summary.status, status_width = status_width);
        println!(
            "{:<branch_width$}  {}  {:<10}  {}",
            summary.branch,
            status.style(status_style(&summary.status)),
            summary.position,
            worktree,
            branch_width = branch_width
        );
    }
}
