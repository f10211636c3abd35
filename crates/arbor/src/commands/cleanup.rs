//! Implementation of the `arbor cleanup` command

use arbor_core::{CleanupEngine, CleanupMode};
use owo_colors::OwoColorize;

use crate::colors::COLORS;
use crate::output::{
    emit_error, print_json, CleanupData, CleanupItem, JsonResponse, SkipItem,
};

/// Run the cleanup command
pub fn run_cleanup(
    mode: String,
    force: bool,
    dry_run: bool,
    json_output: bool,
    quiet: bool,
) -> Result<i32, String> {
    let Some(mode) = parse_mode(&mode) else {
        eprintln!(
            "error: unknown cleanup mode '{}' (expected merged, orphaned, stale, or all)",
            mode
        );
        return Ok(2);
    };

    let (root, config) = match super::load_project() {
        Ok(v) => v,
        Err(e) => return Ok(emit_error::<CleanupData>("cleanup", &e, json_output)),
    };

    let engine = CleanupEngine::new(&root, config);
    let plan = match engine.plan(mode) {
        Ok(p) => p,
        Err(e) => return Ok(emit_error::<CleanupData>("cleanup", &e, json_output)),
    };

    if dry_run {
        let data = CleanupData {
            mode: mode.to_string(),
            dry_run: true,
            removed: plan
                .candidates
                .iter()
                .map(|c| CleanupItem {
                    target: c.target.clone(),
                    reason: c.reason.to_string(),
                })
                .collect(),
            skipped: plan
                .skipped
                .iter()
                .map(|s| SkipItem {
                    target: s.target.clone(),
                    reason: s.reason.clone(),
                })
                .collect(),
            failed: vec![],
        };
        if json_output {
            print_json(&JsonResponse::ok("cleanup", data));
        } else if !quiet {
            output_dry_run(&data);
        }
        return Ok(0);
    }

    let result = match engine.apply(&plan, force) {
        Ok(r) => r,
        Err(e) => return Ok(emit_error::<CleanupData>("cleanup", &e, json_output)),
    };

    let data = CleanupData {
        mode: mode.to_string(),
        dry_run: false,
        removed: result
            .removed
            .iter()
            .map(|c| CleanupItem {
                target: c.target.clone(),
                reason: c.reason.to_string(),
            })
            .collect(),
        skipped: result
            .skipped
            .iter()
            .map(|s| SkipItem {
                target: s.target.clone(),
                reason: s.reason.clone(),
            })
            .collect(),
        failed: result
            .failed
            .iter()
            .map(|s| SkipItem {
                target: s.target.clone(),
                reason: s.reason.clone(),
            })
            .collect(),
    };

    let had_failures = !data.failed.is_empty();

    if json_output {
        print_json(&JsonResponse::ok("cleanup", data));
    } else if !quiet {
        output_result(&data);
    }

    Ok(if had_failures { 1 } else { 0 })
}

fn parse_mode(mode: &str) -> Option<CleanupMode> {
    match mode {
        "merged" => Some(CleanupMode::Merged),
        "orphaned" => Some(CleanupMode::Orphaned),
        "stale" => Some(CleanupMode::Stale),
        "all" => Some(CleanupMode::All),
        _ => None,
    }
}

fn output_dry_run(data: &CleanupData) {
    if data.removed.is_empty() {
        println!("Nothing to clean up ({} mode)", data.mode);
    } else {
        println!(
            "{}: would remove {} target(s):",
            "Dry run".style(COLORS.active),
            data.removed.len()
        );
        for item in &data.removed {
            println!("  {} ({})", item.target, item.reason);
        }
    }
    print_skips(&data.skipped);
}

fn output_result(data: &CleanupData) {
    if data.removed.is_empty() {
        println!("Nothing removed ({} mode)", data.mode);
    } else {
        println!(
            "{} {} target(s):",
            "Removed".style(COLORS.success),
            data.removed.len()
        );
        for item in &data.removed {
            println!("  {} ({})", item.target, item.reason);
        }
    }
    print_skips(&data.skipped);
    if !data.failed.is_empty() {
        println!("{}:", "Failed".style(COLORS.fail));
        for item in &data.failed {
            println!("  {}: {}", item.target, item.reason);
        }
    }
}

fn print_skips(skipped: &[SkipItem]) {
    if skipped.is_empty() {
        return;
    }
    println!("{}:", "Skipped".style(COLORS.warning));
    for item in skipped {
        println!("  {}: {}", item.target, item.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("merged"), Some(CleanupMode::Merged));
        assert_eq!(parse_mode("all"), Some(CleanupMode::All));
        assert_eq!(parse_mode("bogus"), None);
    }
}
