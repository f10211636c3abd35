//! Implementation of the `arbor remove` command

use arbor_core::WorktreeManager;
use owo_colors::OwoColorize;

use crate::colors::COLORS;
use crate::output::{emit_error, print_json, JsonResponse, RemoveData};

/// Run the remove command
pub fn run_remove(
    target: String,
    force: bool,
    json_output: bool,
    quiet: bool,
) -> Result<i32, String> {
    let (root, config) = match super::load_project() {
        Ok(v) => v,
        Err(e) => return Ok(emit_error::<RemoveData>("remove", &e, json_output)),
    };

    let manager = WorktreeManager::new(&root, config);
    let session = match manager.remove(&target, force) {
        Ok(s) => s,
        Err(e) => return Ok(emit_error::<RemoveData>("remove", &e, json_output)),
    };

    let data = RemoveData {
        session_id: session.session_id.clone(),
        branch: session.branch_name.clone(),
        worktree_path: session.worktree_path.clone(),
    };

    if json_output {
        print_json(&JsonResponse::ok("remove", data));
    } else if !quiet {
        println!(
            "{} session {}",
            "Removed".style(COLORS.success),
            session.session_id
        );
        println!("  branch:   {}", session.branch_name);
        println!("  worktree: {}", session.worktree_path);
    }

    Ok(0)
}
