//! CLI argument definitions

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::context::{DEFAULT_METRICS, DEFAULT_TOPLEV_ARGS};

#[derive(Parser, Debug)]
#[command(
    name = "perfdo",
    version,
    about = "Drive perf and toplev through a staged CPU profiling pipeline",
    after_help = "\
EXAMPLES:
    perfdo profile -a './matmul 512'              Default profile steps
    perfdo profile -a ./app --profile-mask 2      Per-app counting only
    perfdo profile --profile-mask 3 --print-only  Show commands without running them
    perfdo log                                    Host/software inventory only

PROFILE MASK BITS:
    0 host inventory     1 per-app counting    2 system-wide counting
    3 call-stack sampling 4 topdown full       5 topdown levels
    6 topdown drilldown  7 topdown no-multiplex 8 LBR stats   9 PEBS stats"
)]
pub struct Args {
    /// Commands to run: profile, all, log, forgive-me
    #[arg(value_name = "COMMAND", required = true)]
    pub commands: Vec<String>,

    /// Custom perf tool
    #[arg(long, default_value = "perf")]
    pub perf: String,

    /// Custom pmu-tools invocation prefix
    #[arg(long, default_value = "python3 ./pmu-tools")]
    pub pmu_tools: String,

    /// Arguments to pass through to toplev
    #[arg(long, default_value = DEFAULT_TOPLEV_ARGS, allow_hyphen_values = true)]
    pub toplev_args: String,

    /// Print the commands without running them
    #[arg(long)]
    pub print_only: bool,

    /// User metrics to pass to toplev's --nodes
    #[arg(short, long, default_value = DEFAULT_METRICS)]
    pub metrics: String,

    /// User events to pass to perf stat's -e
    #[arg(short, long, allow_hyphen_values = true)]
    pub events: Option<String>,

    /// Collect power events as well
    #[arg(long)]
    pub power: bool,

    /// Name of the user application/kernel/command to profile
    #[arg(short, long)]
    pub app_name: Option<String>,

    /// Profile system-wide for N seconds (0 = disabled)
    #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
    pub sys_wide: i64,

    /// Arguments the generated kernel was built with
    #[arg(short, long, allow_hyphen_values = true)]
    pub gen_args: Option<String>,

    /// Number of iterations of a generated kernel
    #[arg(long, default_value = "1e9")]
    pub app_iterations: String,

    /// Hexadecimal mask selecting the profile steps
    #[arg(long, default_value = "17F")]
    pub profile_mask: String,

    /// Skip the no-multiplexing topdown rerun
    #[arg(short = 'N', long)]
    pub no_multiplex: bool,

    /// Verbosity: 0 none, 1 commands, 2 +toplev -v, 3 +toplev --perf, 5 +event groups
    #[arg(short, long, default_value = "0")]
    pub verbose: u8,

    /// Override a setting before the run, as :key:value
    #[arg(long, num_args = 1.., action = ArgAction::Append)]
    pub tune: Vec<String>,

    /// Directory holding the helper filters (ptage, lbr_stats, loop_stats, addrbits)
    #[arg(long, default_value = ".")]
    pub tools_dir: PathBuf,

    /// Sysfs mount used for capability probing
    #[arg(long, default_value = "/sys")]
    pub sysfs_root: PathBuf,
}
