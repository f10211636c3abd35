//! Implementation of the `arbor merge` command

use arbor_core::{MergeCoordinator, MergeMode, MergeOptions, MergeReport};
use owo_colors::OwoColorize;

use crate::colors::COLORS;
use crate::output::{emit_error, print_json, JsonResponse, MergeData};

/// Run the merge command
pub fn run_merge(
    target: String,
    remote: bool,
    dry_run: bool,
    json_output: bool,
    quiet: bool,
) -> Result<i32, String> {
    let (root, config) = match super::load_project() {
        Ok(v) => v,
        Err(e) => return Ok(emit_error::<MergeData>("merge", &e, json_output)),
    };

    let options = MergeOptions {
        target,
        mode: if remote {
            MergeMode::Remote
        } else {
            MergeMode::Local
        },
        dry_run,
    };

    let coordinator = MergeCoordinator::new(&root, config);
    let report = match coordinator.merge(&options) {
        Ok(r) => r,
        Err(e) => return Ok(emit_error::<MergeData>("merge", &e, json_output)),
    };

    if json_output {
        print_json(&JsonResponse::ok("merge", to_data(&report)));
    } else if !quiet {
        output_text(&report);
    }

    Ok(0)
}

fn to_data(report: &MergeReport) -> MergeData {
    MergeData {
        branch: report.branch.clone(),
        base: report.base.clone(),
        mode: report.mode.to_string(),
        dry_run: report.dry_run,
        commits_merged: report.commits_merged,
        merge_commit: report.merge_commit.clone(),
        pr_number: report.pr.as_ref().map(|pr| pr.number),
        pr_url: report.pr.as_ref().map(|pr| pr.url.clone()),
        stashed_infra: report.stashed_infra.clone(),
        pushed: report.pushed,
        cleaned_up: report.cleaned_up,
    }
}

fn output_text(report: &MergeReport) {
    if report.dry_run {
        println!(
            "{}: would merge {} into {} ({} mode, {} commits)",
            "Dry run".style(COLORS.active),
            report.branch,
            report.base,
            report.mode,
            report.commits_merged
        );
        if let Some(pr) = &report.pr {
            println!("  pull request: #{} ({})", pr.number, pr.url);
        }
        if !report.stashed_infra.is_empty() {
            println!("  infrastructure files to stash and restore:");
            for file in &report.stashed_infra {
                println!("    {}", file);
            }
        }
        return;
    }

    println!(
        "{} {} into {} ({} commits squashed)",
        "Merged".style(COLORS.success),
        report.branch,
        report.base,
        report.commits_merged
    );
    if let Some(commit) = &report.merge_commit {
        println!("  commit: {}", commit);
    }
    if let Some(pr) = &report.pr {
        println!("  pull request: #{}", pr.number);
    }
    if report.mode == MergeMode::Remote && !report.pushed {
        println!(
            "  {}: push to the remote failed; push manually",
            "warning".style(COLORS.warning)
        );
    }
    if report.cleaned_up {
        println!("  worktree, branch, and session removed");
    }
}
