//! # perfdo - Main Entry Point
//!
//! Validates arguments, probes the CPU, opens the command history and runs
//! each requested command in order. See the library docs for the stage list.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::Path;

use perfdo::capability::probe;
use perfdo::cli::Args;
use perfdo::commands::{self, Command};
use perfdo::context::{RunContext, DEFAULT_OBJDUMP};
use perfdo::domain::{ConfigError, PipelineError};
use perfdo::executor::{CommandHistory, ExecPolicy, ShellExecutor};
use perfdo::export::RunManifest;
use perfdo::preflight::run_preflight_checks;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let usage = err.downcast_ref::<ConfigError>().is_some()
        || err.downcast_ref::<PipelineError>().is_some_and(PipelineError::is_usage);
    let msg = format!("{err:#}").to_lowercase();
    if usage {
        EXIT_USAGE
    } else if msg.contains("permission denied") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

/// `# <argv> # version <v>` header of the command history.
fn history_header() -> String {
    let argv: Vec<String> = std::env::args().collect();
    format!("{} # version {}", argv.join(" "), env!("CARGO_PKG_VERSION"))
}

fn run() -> Result<()> {
    let args = Args::parse();

    // Everything checkable without touching the host comes first
    let plan = commands::validate(&args)?;

    let mut caps = probe(&args.sysfs_root, Path::new(DEFAULT_OBJDUMP));
    let ctx = RunContext::from_args(&args, plan.mask, &caps)?;
    caps.objdump_available = Path::new(&ctx.settings.objdump).is_file();
    info!("run '{}' as {}, mask 0x{:x}", ctx.settings.run, ctx.base(), ctx.mask);

    let history_path = ctx.namer.history_file();
    let history = CommandHistory::create(&history_path, &history_header())
        .with_context(|| format!("Failed to create command history {history_path}"))?;
    let policy = ExecPolicy {
        dry_run: ctx.dry_run,
        verbose: ctx.verbose,
        tee: ctx.settings.tee,
        profile: ctx.settings.profile,
    };
    let exec = ShellExecutor::new(policy, Some(history));

    if !ctx.dry_run && plan.commands.iter().any(|c| c.profiles()) {
        let problems = run_preflight_checks(&ctx, Path::new("/proc"));
        if problems > 0 {
            warn!("{problems} pre-flight problem(s); some logs may come out empty");
        }
    }

    for command in plan.commands {
        info!("command: {command}");
        let Some(outcome) = commands::dispatch(command, &ctx, &caps, &exec)? else {
            continue;
        };

        let report = &outcome.report;
        if !report.failures.is_empty() {
            warn!("{command}: {} step(s) failed", report.failures.len());
        }
        if command == Command::Log || ctx.dry_run {
            continue;
        }
        let manifest_path = ctx.namer.manifest();
        RunManifest::new(ctx.base().as_str(), ctx.mask, &caps, report, &outcome.ledger)
            .write_to(Path::new(&manifest_path))?;
        println!("saved: {manifest_path}");
    }

    Ok(())
}
