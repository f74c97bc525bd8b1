//! Event specifications for `perf stat`
//!
//! Users may pass raw events in the compact `r<umask><event>:<Name>` form
//! (optionally with a leading counter mask byte). They are expanded into
//! full PMU descriptors before reaching perf:
//!
//! ```text
//! r20cc:FOO      -> cpu/event=0xcc,umask=0x20,name=FOO/
//! r0120cc:FOO    -> cpu/event=0xcc,umask=0x20,cmask=0x01,name=FOO/
//! ```

use crate::capability::Capabilities;
use crate::domain::ConfigError;
use std::fmt;

/// Events every counting run collects.
pub const DEFAULT_STAT_EVENTS: &str = "cpu-clock,context-switches,cpu-migrations,page-faults,\
instructions,cycles,ref-cycles,branches,branch-misses";

/// RAPL energy counters.
const POWER_DOMAINS: [&str; 3] = ["pkg", "cores", "ram"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSpec {
    /// Raw encoding decoded from an `r...:Name` token
    Raw { event: String, umask: String, cmask: Option<String>, name: String },
    /// Anything else, passed to perf untouched
    Named(String),
}

impl EventSpec {
    /// Parse one comma-free token.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEvent` for an `r...:` token whose code is
    /// not 4 or 6 hex digits
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        let Some((code, name)) = token.strip_prefix('r').and_then(|t| t.split_once(':')) else {
            return Ok(EventSpec::Named(token.to_string()));
        };

        let invalid = |reason: &str| ConfigError::InvalidEvent {
            token: token.to_string(),
            reason: reason.to_string(),
        };
        if !code.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid("raw code is not hexadecimal"));
        }

        let byte = |i: usize| code[i..i + 2].to_string();
        let name = name.to_string();
        match code.len() {
            4 => Ok(EventSpec::Raw { event: byte(2), umask: byte(0), cmask: None, name }),
            6 => Ok(EventSpec::Raw { event: byte(4), umask: byte(2), cmask: Some(byte(0)), name }),
            _ => Err(invalid("raw code must have 4 or 6 hex digits")),
        }
    }

    /// Render against a PMU device (`cpu` or `cpu_core`).
    #[must_use]
    pub fn render(&self, pmu: &str) -> String {
        match self {
            EventSpec::Named(e) => e.clone(),
            EventSpec::Raw { event, umask, cmask: None, name } => {
                format!("{pmu}/event=0x{event},umask=0x{umask},name={name}/")
            }
            EventSpec::Raw { event, umask, cmask: Some(cmask), name } => {
                format!("{pmu}/event=0x{event},umask=0x{umask},cmask=0x{cmask},name={name}/")
            }
        }
    }
}

impl fmt::Display for EventSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("cpu"))
    }
}

/// Expand a comma separated user event list into perf descriptors.
///
/// # Errors
/// Returns the first malformed raw token
pub fn perf_format(events: &str, pmu: &str) -> Result<String, ConfigError> {
    let formatted = events
        .split(',')
        .map(|token| EventSpec::parse(token).map(|e| e.render(pmu)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(formatted.join(","))
}

/// `power/energy-<domain>/` for every RAPL domain.
#[must_use]
pub fn power_events() -> String {
    POWER_DOMAINS.iter().map(|d| format!("power/energy-{d}/")).collect::<Vec<_>>().join(",")
}

/// Topdown metric group for parts with aggregated topdown support.
///
/// Golden Cove adds the level-2 events; hybrid parts need every topdown
/// event qualified with the big-core PMU.
#[must_use]
pub fn topdown_group(caps: &Capabilities) -> String {
    let mut group = ["{slots", "retiring", "bad-spec", "fe-bound", "be-bound"].join(",topdown-");
    if caps.golden_cove {
        for e in ["heavy-ops", "br-mispredict", "fetch-lat", "mem-bound"] {
            group.push_str(",topdown-");
            group.push_str(e);
        }
    }
    group.push('}');

    if caps.hybrid {
        group = group
            .replace(",topdown-", "/,cpu_core/topdown-")
            .replace('}', "/}")
            .replace("{slots/", "{slots");
    }
    group
}

/// Extra events for a counting run, or an empty string to use perf's defaults.
///
/// # Errors
/// Returns an error if the user event list is malformed
pub fn stat_events(
    caps: &Capabilities,
    core_only: bool,
    extra: &str,
    user_events: Option<&str>,
) -> Result<String, ConfigError> {
    let mut events = extra.to_string();
    let mut append = |e: &str| {
        if !events.is_empty() {
            events.push(',');
        }
        events.push_str(e);
    };

    if caps.perf_metrics && core_only {
        append(&topdown_group(caps));
    }
    if let Some(user) = user_events {
        append(&perf_format(user, caps.pmu_prefix())?);
    }
    Ok(events)
}
