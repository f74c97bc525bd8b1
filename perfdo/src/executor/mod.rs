//! Command execution boundary
//!
//! Stage builders never spawn processes themselves. They hand an
//! [`Invocation`] to a [`CommandExecutor`], which decides whether to run it,
//! print it, or comment it out, and appends it to the command history.
//!
//! - [`ShellExecutor`]: runs commands through `sh -c`
//! - [`CommandHistory`]: the append-only `.<base>.cmd` record of a run

pub mod history;
pub mod shell;

pub use history::CommandHistory;
pub use shell::{ExecPolicy, ShellExecutor};

use crate::domain::ExecError;

/// How stderr of a command is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Redirect {
    /// `2>&1`
    #[default]
    MergeStderr,
    /// `2>/dev/null`
    DiscardStderr,
    /// Leave both streams alone
    None,
}

impl Redirect {
    #[must_use]
    pub fn as_shell(self) -> Option<&'static str> {
        match self {
            Redirect::MergeStderr => Some("2>&1"),
            Redirect::DiscardStderr => Some("2>/dev/null"),
            Redirect::None => None,
        }
    }
}

/// A command plus the metadata the executor needs to dispatch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    /// Progress message shown before the command runs
    pub message: Option<String>,
    pub redirect: Redirect,
    pub background: bool,
    /// Wrap in `time -f` to report wall-clock time
    pub timed: bool,
    /// Unwrapped command the timing label is taken from
    pub label_source: Option<String>,
    /// Append to the command history
    pub record: bool,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: None,
            redirect: Redirect::default(),
            background: false,
            timed: false,
            label_source: None,
            record: true,
        }
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn redirect(mut self, redirect: Redirect) -> Self {
        self.redirect = redirect;
        self
    }

    #[must_use]
    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    #[must_use]
    pub fn timed(mut self, timed: bool) -> Self {
        self.timed = timed;
        self
    }

    /// Take the timing label from `source` rather than from a `bash -c` wrapper.
    #[must_use]
    pub fn label_source(mut self, source: impl Into<String>) -> Self {
        self.label_source = Some(source.into());
        self
    }

    /// Housekeeping commands (log separators, headers) stay out of the history.
    #[must_use]
    pub fn unrecorded(mut self) -> Self {
        self.record = false;
        self
    }
}

/// Runs commands on behalf of the pipeline.
///
/// Implementations must be shareable across the scoped threads stage 3 uses
/// for its independent report passes.
pub trait CommandExecutor: Sync {
    /// Dispatch a command and wait for it (unless it runs in the background).
    ///
    /// # Errors
    /// Returns `ExecError` if the command could not be spawned or exited non-zero
    fn execute(&self, invocation: &Invocation) -> Result<(), ExecError>;

    /// Run a read-only query and return its first output line, or one
    /// whitespace-separated field of it.
    ///
    /// Returns `Ok(None)` when nothing was captured, including in dry-run.
    ///
    /// # Errors
    /// Returns `ExecError` if the command could not be spawned
    fn capture(&self, command: &str, field: Option<usize>) -> Result<Option<String>, ExecError>;

    /// Record an informational line in the history as a comment, optionally
    /// showing it to the user.
    fn note(&self, text: &str, show: bool);
}

/// Select one whitespace-separated field from the first line of `output`.
#[must_use]
pub fn first_line_field(output: &str, field: Option<usize>) -> Option<String> {
    let line = output.lines().next()?.trim();
    let value = match field {
        Some(i) => line.split_whitespace().nth(i)?,
        None => line,
    };
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("perf stat").message("counting").redirect(Redirect::None).timed(true);
        assert_eq!(inv.message.as_deref(), Some("counting"));
        assert_eq!(inv.redirect.as_shell(), None);
        assert!(inv.timed);
        assert!(inv.record);
        assert!(!Invocation::new("echo").unrecorded().record);
    }

    #[test]
    fn test_first_line_field() {
        assert_eq!(first_line_field("  12 app\n3 other\n", Some(1)), Some("app".to_string()));
        assert_eq!(first_line_field("12 app\n", None), Some("12 app".to_string()));
        assert_eq!(first_line_field("12\n", Some(3)), None);
        assert_eq!(first_line_field("", None), None);
    }
}
