//! Shell-backed command executor

use log::{debug, warn};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use super::{first_line_field, CommandExecutor, CommandHistory, Invocation};
use crate::domain::ExecError;

/// Substrings marking commands that collect profiling data.
const PROFILING_TOOLS: [&str; 3] = ["perf stat", "perf record", "toplev.py"];

/// Global switches that shape every dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecPolicy {
    /// Print commands without running them
    pub dry_run: bool,
    /// 0 quiet, 1 and above echo each command
    pub verbose: u8,
    /// When off, pipelines are cut before their first `|`
    pub tee: bool,
    /// When off, profiling commands are commented out
    pub profile: bool,
}

impl Default for ExecPolicy {
    fn default() -> Self {
        Self { dry_run: false, verbose: 0, tee: true, profile: true }
    }
}

/// Final shell text for an invocation and whether it should actually run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub text: String,
    pub run: bool,
}

/// Runs commands through `sh -c`.
pub struct ShellExecutor {
    policy: ExecPolicy,
    history: Option<Mutex<CommandHistory>>,
}

impl ShellExecutor {
    #[must_use]
    pub fn new(policy: ExecPolicy, history: Option<CommandHistory>) -> Self {
        Self { policy, history: history.map(Mutex::new) }
    }

    #[must_use]
    pub fn policy(&self) -> ExecPolicy {
        self.policy
    }

    /// Apply the policy to an invocation without running it.
    #[must_use]
    pub fn prepare(&self, inv: &Invocation) -> Prepared {
        let label_source = inv.label_source.as_deref().unwrap_or(&inv.command);
        let words: Vec<&str> = label_source.split_whitespace().take(2).collect();
        let mut text = inv.command.clone();

        if !self.policy.tee && inv.redirect.as_shell().is_some() {
            if let Some((head, _)) = text.split_once('|') {
                text = head.trim_end().to_string();
            }
        }
        text = text.replace("  ", " ");
        if inv.timed {
            text = format!("time -f \"\\t%E time-real:{}\" {text} 2>&1", words.join("-"));
        }

        let mut run = !self.policy.dry_run;
        if !self.policy.profile && PROFILING_TOOLS.iter().any(|t| text.contains(t)) {
            text = format!("# {text}");
            run = false;
        }
        if inv.background {
            text.push_str(" &");
        }
        Prepared { text, run }
    }

    fn record(&self, line: &str) {
        let Some(history) = &self.history else {
            return;
        };
        let Ok(mut history) = history.lock() else {
            return;
        };
        if let Err(e) = history.append(line) {
            warn!("Failed to append to {}: {e}", history.path().display());
        }
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, inv: &Invocation) -> Result<(), ExecError> {
        let prepared = self.prepare(inv);
        if inv.record {
            self.record(&prepared.text);
        }

        if let Some(msg) = &inv.message {
            println!("{msg}");
        }
        if self.policy.verbose > 0 || (self.policy.dry_run && inv.record) {
            println!("\t{}", prepared.text);
        }
        if !prepared.run {
            return Ok(());
        }

        let full = match inv.redirect.as_shell() {
            Some(r) => format!("{} {r}", prepared.text),
            None => prepared.text.clone(),
        };
        debug!("exec: {full}");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&full);
        if inv.background {
            cmd.stdin(Stdio::null())
                .spawn()
                .map_err(|source| ExecError::Spawn { command: full.clone(), source })?;
            return Ok(());
        }

        let status =
            cmd.status().map_err(|source| ExecError::Spawn { command: full.clone(), source })?;
        if status.success() {
            Ok(())
        } else {
            Err(ExecError::Failed { command: full, status: status.code().unwrap_or(-1) })
        }
    }

    fn capture(&self, command: &str, field: Option<usize>) -> Result<Option<String>, ExecError> {
        if self.policy.dry_run {
            debug!("dry-run, not capturing: {command}");
            return Ok(None);
        }
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stderr(Stdio::null())
            .output()
            .map_err(|source| ExecError::Spawn { command: command.to_string(), source })?;
        Ok(first_line_field(&String::from_utf8_lossy(&output.stdout), field))
    }

    fn note(&self, text: &str, show: bool) {
        if show {
            println!("{text}");
        }
        self.record(&format!("# {text}"));
    }
}
