//! Top-level commands and run-start validation

use std::fmt;
use std::str::FromStr;

use crate::capability::Capabilities;
use crate::cli::Args;
use crate::context::RunContext;
use crate::domain::{ConfigError, PipelineError};
use crate::executor::CommandExecutor;
use crate::pipeline::orchestrator::{PipelineOrchestrator, RunReport};
use crate::pipeline::{ArtifactLedger, StageMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the stages selected by the mask
    Profile,
    /// Profile with the host inventory forced on
    All,
    /// Host inventory only
    Log,
    /// Does nothing; accepted for scripted invocations
    ForgiveMe,
}

impl FromStr for Command {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profile" => Ok(Command::Profile),
            "all" => Ok(Command::All),
            "log" => Ok(Command::Log),
            "forgive-me" => Ok(Command::ForgiveMe),
            other => Err(ConfigError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Profile => "profile",
            Command::All => "all",
            Command::Log => "log",
            Command::ForgiveMe => "forgive-me",
        })
    }
}

impl Command {
    /// Whether the command runs profile stages and leaves a manifest.
    #[must_use]
    pub fn profiles(self) -> bool {
        matches!(self, Command::Profile | Command::All)
    }
}

/// Commands and stage mask, checked before anything touches the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub commands: Vec<Command>,
    pub mask: StageMask,
}

/// Validate the arguments that can be checked without probing the host.
///
/// # Errors
/// Returns the first `ConfigError` found
pub fn validate(args: &Args) -> Result<RunPlan, ConfigError> {
    if (args.gen_args.is_some() || args.commands.iter().any(|c| c == "build")) && args.app_name.is_none() {
        return Err(ConfigError::MissingAppName);
    }

    let mask = StageMask::parse(&args.profile_mask)?;
    if args.print_only && mask.has_branch_sampling() {
        return Err(ConfigError::DryRunWithBranchSampling { mask: mask.bits() });
    }
    if args.sys_wide < 0 {
        return Err(ConfigError::NegativeDuration(args.sys_wide));
    }

    let commands = args.commands.iter().map(|c| c.parse()).collect::<Result<Vec<Command>, _>>()?;
    Ok(RunPlan { commands, mask })
}

/// Report and artifacts of one profiling command.
#[derive(Debug)]
pub struct CommandOutcome {
    pub report: RunReport,
    pub ledger: ArtifactLedger,
}

/// Run one command.
///
/// # Errors
/// Returns a `PipelineError` if a stage invariant fails
pub fn dispatch<E: CommandExecutor>(
    command: Command,
    ctx: &RunContext,
    caps: &Capabilities,
    exec: &E,
) -> Result<Option<CommandOutcome>, PipelineError> {
    let mut orchestrator = PipelineOrchestrator::new(ctx, caps, exec);
    match command {
        Command::ForgiveMe => return Ok(None),
        Command::Log => orchestrator.run_inventory(),
        Command::Profile => orchestrator.run()?,
        Command::All => {
            orchestrator = orchestrator.with_inventory(true);
            orchestrator.run()?;
        }
    }
    let (report, ledger) = orchestrator.into_parts();
    Ok(Some(CommandOutcome { report, ledger }))
}
