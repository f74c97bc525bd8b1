//! Profile stages and the bit mask that selects them.

use crate::domain::ConfigError;
use serde::Serialize;
use std::fmt;

/// One step of the profile command, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    HostInventory = 0,
    AppCounting = 1,
    SystemCounting = 2,
    CallStackSampling = 3,
    TopdownFull = 4,
    TopdownLevels = 5,
    TopdownDrilldown = 6,
    TopdownNoMultiplex = 7,
    LbrStats = 8,
    PebsStats = 9,
}

impl Stage {
    /// All stages in ascending id order.
    pub const ALL: [Stage; 10] = [
        Stage::HostInventory,
        Stage::AppCounting,
        Stage::SystemCounting,
        Stage::CallStackSampling,
        Stage::TopdownFull,
        Stage::TopdownLevels,
        Stage::TopdownDrilldown,
        Stage::TopdownNoMultiplex,
        Stage::LbrStats,
        Stage::PebsStats,
    ];

    #[must_use]
    pub fn id(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn bit(self) -> u32 {
        1 << self.id()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::HostInventory => "host inventory",
            Stage::AppCounting => "per-app counting",
            Stage::SystemCounting => "system-wide counting",
            Stage::CallStackSampling => "call-stack sampling",
            Stage::TopdownFull => "topdown full",
            Stage::TopdownLevels => "topdown levels",
            Stage::TopdownDrilldown => "topdown auto-drilldown",
            Stage::TopdownNoMultiplex => "topdown no-multiplex",
            Stage::LbrStats => "lbr stats",
            Stage::PebsStats => "pebs stats",
        }
    }

    /// Earlier stages whose artifacts this stage reads when they exist.
    ///
    /// Configuration shared between stages (node sets, repeat count) is not a
    /// dependency; only files are.
    #[must_use]
    pub fn depends_on(self) -> &'static [Stage] {
        match self {
            Stage::LbrStats => &[Stage::AppCounting],
            _ => &[],
        }
    }

    /// Branch-record and PEBS stages need real captured output to continue.
    #[must_use]
    pub fn needs_captured_output(self) -> bool {
        matches!(self, Stage::LbrStats | Stage::PebsStats)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.name())
    }
}

/// Bit vector over [`Stage`] ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageMask(u32);

impl StageMask {
    /// All stages except the no-multiplex rerun and PEBS.
    pub const DEFAULT: StageMask = StageMask(0x17F);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Parse a hexadecimal mask, with or without a `0x` prefix.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidMask` if the value is not hexadecimal
    pub fn parse(hex: &str) -> Result<Self, ConfigError> {
        let trimmed = hex.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u32::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| ConfigError::InvalidMask(hex.to_string()))
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn enabled(self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    #[must_use]
    pub fn without(self, stage: Stage) -> Self {
        Self(self.0 & !stage.bit())
    }

    /// Enabled stages in ascending id order.
    pub fn stages(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |s| self.enabled(*s))
    }

    /// Whether any stage that needs captured output is enabled.
    #[must_use]
    pub fn has_branch_sampling(self) -> bool {
        self.stages().any(Stage::needs_captured_output)
    }
}

impl Default for StageMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::LowerHex for StageMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
