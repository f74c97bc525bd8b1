//! Host capability probe
//!
//! Answers the fixed set of questions the stage builders ask about the CPU:
//! hybrid core types, microarchitecture generation, aggregated topdown
//! support, DSB set decoding width, SMT state and the branch-record event.
//!
//! Detection runs once per process and never fails a run: anything that
//! cannot be read resolves to [`Microarch::Unknown`], whose capability row
//! has every feature absent.

pub mod sysfs;

use log::{info, warn};
use serde::Serialize;
use std::path::Path;

/// Supported microarchitecture families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Microarch {
    Skylake,
    Icelake,
    AlderlakeHybrid,
    SapphireRapids,
    Unknown,
}

/// One row of the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FamilyTraits {
    hybrid: bool,
    perf_metrics: bool,
    golden_cove: bool,
    perfmon_v5: bool,
    dsb_msb: Option<u8>,
}

impl Microarch {
    /// Map the kernel's `caps/pmu_name` value onto a family.
    #[must_use]
    pub fn from_pmu_name(name: &str) -> Self {
        match name.trim() {
            "skylake" | "skylakex" | "cascadelake" => Microarch::Skylake,
            "icelake" | "icelakex" | "tigerlake" => Microarch::Icelake,
            "sapphire_rapids" => Microarch::SapphireRapids,
            n if n.ends_with("_hybrid") => Microarch::AlderlakeHybrid,
            _ => Microarch::Unknown,
        }
    }

    fn traits(self) -> FamilyTraits {
        let (hybrid, perf_metrics, golden_cove, perfmon_v5, dsb_msb) = match self {
            Microarch::Skylake => (false, false, false, false, Some(9)),
            Microarch::Icelake => (false, true, false, false, Some(9)),
            Microarch::AlderlakeHybrid => (true, true, true, true, Some(10)),
            Microarch::SapphireRapids => (false, true, true, true, Some(10)),
            Microarch::Unknown => (false, false, false, false, None),
        };
        FamilyTraits { hybrid, perf_metrics, golden_cove, perfmon_v5, dsb_msb }
    }
}

/// Immutable capability record computed once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub microarch: Microarch,
    /// Raw PMU name as reported by the kernel (empty when unknown)
    pub pmu_name: String,
    pub hybrid: bool,
    /// Aggregated topdown metrics (`slots` + `topdown-*` events)
    pub perf_metrics: bool,
    /// Golden Cove cores add the level-2 topdown events
    pub golden_cove: bool,
    /// Architectural perfmon version 5 or later
    pub perfmon_v5: bool,
    /// Most significant address bit used for DSB set decoding
    pub dsb_msb: Option<u8>,
    pub smt_on: bool,
    pub objdump_available: bool,
}

impl Capabilities {
    /// Capability record for a known family, with SMT off and no objdump.
    #[must_use]
    pub fn for_microarch(microarch: Microarch) -> Self {
        let t = microarch.traits();
        Self {
            microarch,
            pmu_name: String::new(),
            hybrid: t.hybrid,
            perf_metrics: t.perf_metrics,
            golden_cove: t.golden_cove,
            perfmon_v5: t.perfmon_v5,
            dsb_msb: t.dsb_msb,
            smt_on: false,
            objdump_available: false,
        }
    }

    /// Conservative record: every feature absent.
    #[must_use]
    pub fn unknown() -> Self {
        Self::for_microarch(Microarch::Unknown)
    }

    /// PMU device prefix for raw event descriptors.
    #[must_use]
    pub fn pmu_prefix(&self) -> &'static str {
        if self.hybrid {
            sysfs::HYBRID_CORE_PMU
        } else {
            sysfs::CORE_PMU
        }
    }

    /// Branch-record event (`BR_INST_RETIRED.NEAR_TAKEN`) with its precise modifier.
    #[must_use]
    pub fn lbr_event(&self) -> String {
        if self.hybrid {
            "cpu_core/event=0xc4,umask=0x20/ppp".to_string()
        } else {
            "r20c4:ppp".to_string()
        }
    }

    /// Whether toplev can be restricted to big cores on this part.
    #[must_use]
    pub fn core_type_selectable(&self) -> bool {
        self.hybrid
    }
}

/// Probe the host through the given sysfs root.
///
/// `objdump` is the decoder path configured for `perf report`; it only counts
/// as available when it names an existing file.
#[must_use]
pub fn probe(sysfs_root: &Path, objdump: &Path) -> Capabilities {
    let (microarch, pmu_name, core_pmu_only) = match sysfs::read_pmu_name(sysfs_root) {
        Ok(pmu) => (Microarch::from_pmu_name(&pmu.name), pmu.name, pmu.device == sysfs::HYBRID_CORE_PMU),
        Err(e) => {
            warn!("Could not detect PMU: {e:#}. Assuming no model-specific features.");
            (Microarch::Unknown, String::new(), false)
        }
    };

    let smt_on = sysfs::smt_active(sysfs_root).unwrap_or_else(|e| {
        warn!("Could not read SMT state: {e:#}");
        false
    });

    let base = Capabilities::for_microarch(microarch);
    // a cpu_core device without a plain cpu one means big and small cores
    let caps = Capabilities {
        hybrid: base.hybrid || core_pmu_only,
        pmu_name,
        smt_on,
        objdump_available: objdump.is_file(),
        ..base
    };
    info!("Detected {:?} (pmu '{}'), smt={}", caps.microarch, caps.pmu_name, caps.smt_on);
    caps
}
