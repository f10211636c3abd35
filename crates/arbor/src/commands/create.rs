//! Implementation of the `arbor create` command

use std::path::Path;

use arbor_core::WorktreeManager;
use owo_colors::OwoColorize;

use crate::colors::COLORS;
use crate::output::{emit_error, print_json, CreateData, JsonResponse};

/// Run the create command
pub fn run_create(
    plan: String,
    base: Option<String>,
    json_output: bool,
    quiet: bool,
) -> Result<i32, String> {
    let (root, config) = match super::load_project() {
        Ok(v) => v,
        Err(e) => return Ok(emit_error::<CreateData>("create", &e, json_output)),
    };

    let manager = WorktreeManager::new(&root, config);
    let session = match manager.create_or_reuse(Path::new(&plan), base.as_deref()) {
        Ok(s) => s,
        Err(e) => return Ok(emit_error::<CreateData>("create", &e, json_output)),
    };

    let data = CreateData {
        session_id: session.session_id.clone(),
        branch: session.branch_name.clone(),
        worktree_path: session.worktree_path.clone(),
        plan: session.plan_path.clone(),
        base: session.base_branch.clone(),
        reused: session.reused,
        root_bead_id: session.root_bead_id.clone(),
    };

    if json_output {
        print_json(&JsonResponse::ok("create", data));
    } else if !quiet {
        if session.reused {
            println!(
                "{} existing worktree for {}",
                "Reusing".style(COLORS.warning),
                session.plan_path
            );
        } else {
            println!(
                "{} worktree for {}",
                "Created".style(COLORS.success),
                session.plan_path
            );
        }
        println!("  branch:   {}", session.branch_name);
        println!("  worktree: {}", session.worktree_path);
        if let Some(root_id) = &session.root_bead_id {
            println!("  tracker:  {}", root_id);
        }
    }

    Ok(0)
}
