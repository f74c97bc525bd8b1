//! Run configuration
//!
//! [`Settings`] holds the profile templates and knobs. Defaults depend on the
//! detected capabilities; `--tune :key:value` items patch them before the run
//! starts. [`RunContext`] bundles the patched settings with the command-line
//! options and is read-only for the rest of the run.

use crate::capability::Capabilities;
use crate::cli::Args;
use crate::domain::{BaseName, ConfigError};
use crate::pipeline::artifact::ArtifactNamer;
use crate::pipeline::events::perf_format;
use crate::pipeline::mask::{Stage, StageMask};
use std::path::{Path, PathBuf};

/// Workload used when no `--app-name` is given.
pub const DEFAULT_RUN: &str = "./run.sh";

/// toplev arguments used when `--toplev-args` is not given.
pub const DEFAULT_TOPLEV_ARGS: &str = "--metric-group +Summary";

/// objdump build `perf report` uses for disassembly when present.
pub const DEFAULT_OBJDUMP: &str = "./binutils-gdb/binutils/objdump";

/// User metrics appended to the node set when `--metrics` is not given.
pub const DEFAULT_METRICS: &str = "+L2MPKI,+ILP,+IpTB,+IpMispredict";

/// Profile templates and knobs, tunable by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub run: String,
    /// Restrict counting and topdown to big cores
    pub core: bool,
    pub cpuid: bool,
    pub dmidecode: bool,
    pub extra_metrics: String,
    /// Accept branch sampling without unfiltered LBRs
    pub forgive: bool,
    /// Number of hottest loops to collect statistics for
    pub loops: u32,
    pub lbr_stats: String,
    pub lbr_stats_tk: String,
    pub msr: bool,
    pub msrs: Vec<String>,
    pub nodes: String,
    pub numactl: bool,
    pub objdump: String,
    pub perf_lbr: String,
    pub perf_pebs: String,
    pub perf_record: String,
    pub perf_stat: String,
    pub perf_stat_def: String,
    pub perf_stat_ipc: String,
    /// When off, profiling commands are logged commented out and not run
    pub profile: bool,
    pub repeat: u32,
    /// Sampling depth: 1 stacks, 2 +LBR, 3 +PEBS, 4 +drilldown sampling
    pub sample: u32,
    /// When off, pipelines are cut before their first `|`
    pub tee: bool,
    pub toplev_levels: u32,
    pub toplev_full: String,
    /// Instruction decoding through `perf script --xed`
    pub xed: bool,
    /// Hottest instruction pointers to refine with extra stats passes
    pub top: u32,
}

impl Settings {
    /// Defaults for the probed host.
    #[must_use]
    pub fn defaults(caps: &Capabilities) -> Self {
        Self {
            run: DEFAULT_RUN.to_string(),
            core: true,
            cpuid: true,
            dmidecode: false,
            extra_metrics: "+Mispredictions,+IpTB,+BpTkBranch,+IpCall,+IpLoad,+ILP,+UPI".to_string(),
            forgive: false,
            loops: 3,
            lbr_stats: "- 0 10 0 ANY_DSB_MISS".to_string(),
            lbr_stats_tk: "- 0 20 1".to_string(),
            msr: false,
            msrs: vec!["0x48".to_string(), "0x8b".to_string(), "0x1a4".to_string()],
            nodes: "+CoreIPC,+Instructions,+CORE_CLKS,+CPU_Utilization,+Time,+MUX".to_string(),
            numactl: true,
            objdump: DEFAULT_OBJDUMP.to_string(),
            perf_lbr: format!("-j any,save_type -e {} -c 700001", caps.lbr_event()),
            perf_pebs: format!(
                "-b -e {}/event=0xc6,umask=0x1,frontend=0x1,name=FRONTEND_RETIRED.ANY_DSB_MISS/uppp -c 1000003",
                caps.pmu_prefix()
            ),
            perf_record: String::new(),
            perf_stat: String::new(),
            perf_stat_def: "cpu-clock,context-switches,cpu-migrations,page-faults,instructions,\
cycles,ref-cycles,branches,branch-misses"
                .to_string(),
            perf_stat_ipc: "-- perf stat -e instructions,cycles".to_string(),
            profile: true,
            repeat: 3,
            sample: 2,
            tee: true,
            toplev_levels: 2,
            toplev_full: "-vl6".to_string(),
            xed: true,
            top: 0,
        }
    }

    /// Apply `:key:value` items, returning the patched settings.
    ///
    /// Values may contain `:`; surrounding quotes are removed.
    ///
    /// # Errors
    /// Returns a `ConfigError` for malformed items, unknown keys and ill-typed values
    pub fn tuned<S: AsRef<str>>(&self, items: &[S]) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        for item in items {
            let item = item.as_ref();
            let (key, value) = item
                .strip_prefix(':')
                .and_then(|rest| rest.split_once(':'))
                .ok_or_else(|| ConfigError::MalformedTune(item.to_string()))?;
            next.set(key, unquote(value))?;
        }
        Ok(next)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidTuneValue { key: key.to_string(), value: value.to_string() };
        let flag = || parse_flag(value).ok_or_else(invalid);
        let number = || value.parse::<u32>().map_err(|_| invalid());

        match key {
            "run" => self.run = value.to_string(),
            "core" => self.core = flag()?,
            "cpuid" => self.cpuid = flag()?,
            "dmidecode" => self.dmidecode = flag()?,
            "extra-metrics" => self.extra_metrics = value.to_string(),
            "forgive" => self.forgive = flag()?,
            "loops" => self.loops = number()?,
            "lbr-stats" => self.lbr_stats = value.to_string(),
            "lbr-stats-tk" => self.lbr_stats_tk = value.to_string(),
            "msr" => self.msr = flag()?,
            "msrs" => self.msrs = value.split(',').map(|m| m.trim().to_string()).collect(),
            "nodes" => self.nodes = value.to_string(),
            "numactl" => self.numactl = flag()?,
            "objdump" => self.objdump = value.to_string(),
            "perf-lbr" => self.perf_lbr = value.to_string(),
            "perf-pebs" => self.perf_pebs = value.to_string(),
            "perf-record" => self.perf_record = value.to_string(),
            "perf-stat" => self.perf_stat = value.to_string(),
            "perf-stat-def" => self.perf_stat_def = value.to_string(),
            "perf-stat-ipc" => self.perf_stat_ipc = value.to_string(),
            "profile" => self.profile = flag()?,
            "repeat" => self.repeat = number()?,
            "sample" => self.sample = number()?,
            "tee" => self.tee = flag()?,
            "toplev-levels" => self.toplev_levels = number()?,
            "toplev-full" => self.toplev_full = value.to_string(),
            "xed" => self.xed = flag()?,
            "top" => self.top = number()?,
            _ => return Err(ConfigError::UnknownTunable(key.to_string())),
        }
        Ok(())
    }
}

fn unquote(value: &str) -> &str {
    let v = value.trim();
    for q in ['"', '\''] {
        if let Some(inner) = v.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    v
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "True" => Some(true),
        "0" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Everything a profile run reads, fixed before the first stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub namer: ArtifactNamer,
    pub settings: Settings,
    pub mask: StageMask,
    pub perf: String,
    pub pmu_tools: String,
    pub toplev_args: String,
    pub verbose: u8,
    pub dry_run: bool,
    /// Run the no-multiplexing topdown pass
    pub no_multiplex: bool,
    pub power: bool,
    pub events: Option<String>,
    pub tools_dir: PathBuf,
}

impl RunContext {
    /// Build the context from validated arguments and probed capabilities.
    ///
    /// # Errors
    /// Returns a `ConfigError` if a `--tune` item or a user event is invalid
    pub fn from_args(args: &Args, mask: StageMask, caps: &Capabilities) -> Result<Self, ConfigError> {
        if let Some(events) = &args.events {
            perf_format(events, caps.pmu_prefix())?;
        }
        let mut settings = Settings::defaults(caps);
        if let Some(app) = &args.app_name {
            settings.run.clone_from(app);
        }
        settings.nodes = format!("{},{}", settings.nodes, args.metrics);
        let mut settings = settings.tuned(&args.tune)?;

        let mut verbose = args.verbose;
        if args.print_only && verbose == 0 {
            verbose = 1;
        }

        let mut toplev_args = args.toplev_args.clone();
        if verbose > 4 {
            toplev_args.push_str(" -g");
        }
        if verbose > 2 {
            toplev_args.push_str(" --perf");
        }
        if verbose > 1 {
            toplev_args.push_str(" -v");
        }

        let mut mask = mask;
        let sys_wide = u64::try_from(args.sys_wide).unwrap_or(0);
        if sys_wide > 0 {
            log::info!("system-wide profiling for {sys_wide}s");
            settings.run = format!("sleep {sys_wide}");
            for flags in [
                &mut settings.perf_stat,
                &mut settings.perf_record,
                &mut settings.perf_lbr,
                &mut settings.perf_pebs,
                &mut settings.perf_stat_ipc,
            ] {
                flags.push_str(" -a");
            }
            toplev_args.push_str(" -a");
            mask = mask.without(Stage::SystemCounting);
        }

        let iterations = args.gen_args.as_ref().map(|_| args.app_iterations.as_str());
        let base = BaseName::from_workload(args.app_name.as_deref(), iterations);

        Ok(Self {
            namer: ArtifactNamer::new(base),
            settings,
            mask,
            perf: args.perf.clone(),
            pmu_tools: args.pmu_tools.clone(),
            toplev_args,
            verbose,
            dry_run: args.print_only,
            no_multiplex: !args.no_multiplex,
            power: args.power,
            events: args.events.clone(),
            tools_dir: args.tools_dir.clone(),
        })
    }

    #[must_use]
    pub fn base(&self) -> &BaseName {
        self.namer.base()
    }

    /// Path of a helper script shipped in the tools directory.
    #[must_use]
    pub fn tool(&self, name: &str) -> String {
        if self.tools_dir == Path::new(".") {
            format!("./{name}")
        } else {
            self.tools_dir.join(name).to_string_lossy().into_owned()
        }
    }

    /// Whether `perf` is a custom build rather than the one on `PATH`.
    #[must_use]
    pub fn custom_perf(&self) -> bool {
        self.perf != "perf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("perfdo").chain(["profile"]).chain(extra.iter().copied()))
    }

    #[test]
    fn test_tune_sets_typed_values() {
        let s = Settings::defaults(&Capabilities::unknown());
        let t = s.tuned(&[":sample:3", ":xed:0", ":perf-record:'-e cycles:pp'"]).unwrap();
        assert_eq!(t.sample, 3);
        assert!(!t.xed);
        assert_eq!(t.perf_record, "-e cycles:pp");
        // original is untouched
        assert_eq!(s.sample, 2);
    }

    #[test]
    fn test_tune_errors() {
        let s = Settings::defaults(&Capabilities::unknown());
        assert!(matches!(s.tuned(&[":nope:1"]), Err(ConfigError::UnknownTunable(_))));
        assert!(matches!(s.tuned(&[":repeat:many"]), Err(ConfigError::InvalidTuneValue { .. })));
        assert!(matches!(s.tuned(&["sample=3"]), Err(ConfigError::MalformedTune(_))));
    }

    #[test]
    fn test_defaults_follow_capabilities() {
        let s = Settings::defaults(&Capabilities::unknown());
        assert!(s.perf_lbr.contains("-e r20c4:ppp"));
        assert!(s.perf_pebs.contains(" cpu/event=0xc6"));
    }

    #[test]
    fn test_context_from_args() {
        let caps = Capabilities::unknown();
        let ctx = RunContext::from_args(&args(&["-a", "./matmul 64", "-v", "3"]), StageMask::DEFAULT, &caps)
            .unwrap();
        assert_eq!(ctx.settings.run, "./matmul 64");
        assert_eq!(ctx.base().as_str(), "matmul-64");
        assert!(ctx.settings.nodes.ends_with(",+L2MPKI,+ILP,+IpTB,+IpMispredict"));
        assert_eq!(ctx.toplev_args, "--metric-group +Summary --perf -v");
        assert!(ctx.no_multiplex);
    }

    #[test]
    fn test_sys_wide_adjusts_flags_and_mask() {
        let caps = Capabilities::unknown();
        let ctx = RunContext::from_args(&args(&["-s", "10"]), StageMask::DEFAULT, &caps).unwrap();
        assert_eq!(ctx.settings.run, "sleep 10");
        assert!(ctx.settings.perf_lbr.ends_with(" -a"));
        assert!(ctx.toplev_args.ends_with(" -a"));
        assert!(!ctx.mask.enabled(Stage::SystemCounting));
    }

    #[test]
    fn test_generated_workload_name() {
        let caps = Capabilities::unknown();
        let ctx = RunContext::from_args(
            &args(&["-a", "jumpy", "-g", "4", "--app-iterations", "1e6"]),
            StageMask::DEFAULT,
            &caps,
        )
        .unwrap();
        assert_eq!(ctx.base().as_str(), "jumpy-1e6");
    }

    #[test]
    fn test_bad_user_event_rejected() {
        let caps = Capabilities::unknown();
        let err = RunContext::from_args(&args(&["-e", "r2cc:FOO"]), StageMask::DEFAULT, &caps).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEvent { .. }));
    }

    #[test]
    fn test_tool_path() {
        let caps = Capabilities::unknown();
        let ctx = RunContext::from_args(&args(&[]), StageMask::DEFAULT, &caps).unwrap();
        assert_eq!(ctx.tool("ptage"), "./ptage");
    }
}
