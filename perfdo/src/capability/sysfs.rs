//! Sysfs queries used by the capability probe
//!
//! Reads PMU and SMT facts from a sysfs mount. The root is a parameter so
//! tests can point it at a fixture tree instead of `/sys`.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// PMU device exposed on hybrid parts for the big cores.
pub const HYBRID_CORE_PMU: &str = "cpu_core";

/// PMU device exposed on non-hybrid parts.
pub const CORE_PMU: &str = "cpu";

/// PMU name as reported by the kernel, plus the device it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmuName {
    pub name: String,
    pub device: &'static str,
}

/// Read `devices/<pmu>/caps/pmu_name`, trying the regular core PMU first.
///
/// # Errors
/// Returns an error if neither PMU device exposes a readable name
pub fn read_pmu_name(root: &Path) -> Result<PmuName> {
    let mut last_err = None;
    for device in [CORE_PMU, HYBRID_CORE_PMU] {
        let path = root.join("devices").join(device).join("caps/pmu_name");
        match fs::read_to_string(&path) {
            Ok(content) => {
                return Ok(PmuName { name: content.trim().to_string(), device });
            }
            Err(e) => last_err = Some((path, e)),
        }
    }

    let (path, err) = last_err.context("no PMU device probed")?;
    Err(err).with_context(|| format!("Failed to read {}", path.display()))
}

/// Whether simultaneous multithreading is currently active.
///
/// # Errors
/// Returns an error if `devices/system/cpu/smt/active` cannot be read
pub fn smt_active(root: &Path) -> Result<bool> {
    let path = root.join("devices/system/cpu/smt/active");
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content.trim() == "1")
}
