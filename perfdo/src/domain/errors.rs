//! Structured error types for perfdo
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! The split mirrors how a run reacts to each failure:
//! - [`ConfigError`]: detected before any stage runs, the run never starts
//! - [`PreconditionError`]: a stage invariant fails, the rest of the run is abandoned
//! - [`ExecError`]: an external command failed, logged and the run continues

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid profile mask '{0}': expected a hexadecimal value")]
    InvalidMask(String),

    #[error("Invalid event syntax in '{token}': {reason}")]
    InvalidEvent { token: String, reason: String },

    #[error("--print-only cannot be combined with LBR/PEBS profile steps (mask 0x{mask:x})")]
    DryRunWithBranchSampling { mask: u32 },

    #[error("Missing required argument: --app-name must be given with --gen-args or build")]
    MissingAppName,

    #[error("Negative system-wide duration provided: {0}")]
    NegativeDuration(i64),

    #[error("Unknown command: '{0}'")]
    UnknownCommand(String),

    #[error("Malformed tune item '{0}': expected :key:value")]
    MalformedTune(String),

    #[error("Unknown tunable '{0}'")]
    UnknownTunable(String),

    #[error("Invalid value '{value}' for tunable '{key}'")]
    InvalidTuneValue { key: String, value: String },
}

#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("No unfiltered LBRs! tag={tag} flags='{flags}'")]
    UnfilteredBranchRecords { tag: String, flags: String },

    #[error("Incorrect event for LBR in: '{flags}' (expected {event})")]
    IncorrectLbrEvent { event: String, flags: String },

    #[error("{step}: expected output missing from {source_path}")]
    MissingOutput { step: String, source_path: String },
}

/// An external command that could not be run or exited unsuccessfully.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with status {status}: {command}")]
    Failed { command: String, status: i32 },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

impl PipelineError {
    /// Configuration problems are usage errors from the caller's point of view.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, PipelineError::Config(_))
    }
}
