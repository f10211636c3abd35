//! arbor CLI - ephemeral worktrees for plan-driven implementation sessions

mod cli;
mod colors;
mod commands;
mod output;

use std::process::ExitCode;

use cli::Commands;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Some(Commands::Create { plan, base }) => {
            commands::run_create(plan, base, cli.json, cli.quiet)
        }
        Some(Commands::List { status }) => commands::run_list(status, cli.json, cli.quiet),
        Some(Commands::Merge {
            target,
            remote,
            dry_run,
        }) => commands::run_merge(target, remote, dry_run, cli.json, cli.quiet),
        Some(Commands::Cleanup {
            mode,
            force,
            dry_run,
        }) => commands::run_cleanup(mode, force, dry_run, cli.json, cli.quiet),
        Some(Commands::Remove { target, force }) => {
            commands::run_remove(target, force, cli.json, cli.quiet)
        }
        Some(Commands::Record {
            target,
            step,
            commit,
            summary,
            done,
        }) => commands::run_record(target, step, commit, summary, done, cli.json, cli.quiet),
        None => {
            // No subcommand - print version info
            if !cli.quiet {
                println!("arbor v{}", env!("CARGO_PKG_VERSION"));
                println!("Use --help for usage information");
            }
            Ok(0)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
    }
}

/// Install the tracing subscriber
///
/// ARBOR_LOG controls the filter; --verbose turns on debug output when the
/// variable is unset.
fn init_tracing(verbose: bool) {
    let default = if verbose { "arbor=debug,arbor_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("ARBOR_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
