//! Pre-flight checks for perfdo
//!
//! Looks for the usual reasons a profile run produces empty logs: perf
//! restricted by `perf_event_paranoid`, a missing pmu-tools checkout, or
//! missing filter scripts. Profiling is best-effort, so problems are reported
//! as warnings and the run goes ahead.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use log::warn;
use std::path::Path;

use crate::context::RunContext;
use crate::pipeline::Stage;

const TOPLEV_STAGES: [Stage; 4] =
    [Stage::TopdownFull, Stage::TopdownLevels, Stage::TopdownDrilldown, Stage::TopdownNoMultiplex];

/// Run all pre-flight checks, logging each problem found.
///
/// Returns the number of problems.
pub fn run_preflight_checks(ctx: &RunContext, proc_root: &Path) -> usize {
    let checks = [
        check_perf_access(ctx, proc_root),
        check_pmu_tools(ctx),
        check_filter_scripts(ctx),
    ];
    let mut problems = 0;
    for check in checks {
        if let Err(e) = check {
            warn!("{e:#}");
            problems += 1;
        }
    }
    problems
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn read_paranoid(proc_root: &Path) -> Result<i32> {
    let path = proc_root.join("sys/kernel/perf_event_paranoid");
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    raw.trim().parse().with_context(|| format!("Unexpected perf_event_paranoid value '{}'", raw.trim()))
}

/// Check that perf may count what the enabled stages ask for.
fn check_perf_access(ctx: &RunContext, proc_root: &Path) -> Result<()> {
    if is_root() {
        return Ok(());
    }
    let paranoid = read_paranoid(proc_root)?;
    paranoid_allows(ctx, paranoid)
}

fn paranoid_allows(ctx: &RunContext, paranoid: i32) -> Result<()> {
    let system_wide = ctx.mask.enabled(Stage::SystemCounting) || ctx.settings.run.starts_with("sleep ");
    if system_wide && paranoid > 0 {
        bail!(
            "perf_event_paranoid is {paranoid}: system-wide counting needs root.\n\n\
             Run with sudo, or lower it: echo -1 | sudo tee /proc/sys/kernel/perf_event_paranoid"
        );
    }
    if paranoid > 2 {
        bail!("perf_event_paranoid is {paranoid}: perf is disabled for unprivileged users.");
    }
    Ok(())
}

/// Directory part of the pmu-tools prefix (`python3 ./pmu-tools` -> `./pmu-tools`).
fn pmu_tools_dir(prefix: &str) -> &str {
    prefix.split_whitespace().last().unwrap_or(prefix)
}

/// Check that toplev is where the topdown stages expect it.
fn check_pmu_tools(ctx: &RunContext) -> Result<()> {
    if !TOPLEV_STAGES.iter().any(|&s| ctx.mask.enabled(s)) {
        return Ok(());
    }
    let toplev = Path::new(pmu_tools_dir(&ctx.pmu_tools)).join("toplev.py");
    if !toplev.is_file() {
        bail!(
            "toplev not found: {}\n\n\
             Clone https://github.com/andikleen/pmu-tools or pass --pmu-tools",
            toplev.display()
        );
    }
    Ok(())
}

/// Filter scripts each enabled stage pipes its output through.
fn required_scripts(ctx: &RunContext) -> Vec<&'static str> {
    let s = &ctx.settings;
    let mut scripts = Vec::new();
    if ctx.mask.enabled(Stage::CallStackSampling) && s.sample >= 1 && s.xed {
        scripts.push("ptage");
    }
    if ctx.mask.enabled(Stage::LbrStats) && s.sample > 1 && s.xed {
        scripts.extend(["ptage", "lbr_stats", "loop_stats"]);
    }
    if ctx.mask.enabled(Stage::PebsStats) && s.sample > 2 {
        scripts.extend(["ptage", "lbr_stats", "addrbits"]);
    }
    scripts.sort_unstable();
    scripts.dedup();
    scripts
}

fn check_filter_scripts(ctx: &RunContext) -> Result<()> {
    let missing: Vec<&str> =
        required_scripts(ctx).into_iter().filter(|name| !ctx.tools_dir.join(name).is_file()).collect();
    if !missing.is_empty() {
        bail!(
            "Filter scripts missing from {}: {}\n\n\
             Point --tools-dir at the directory holding them.",
            ctx.tools_dir.display(),
            missing.join(", ")
        );
    }
    Ok(())
}
