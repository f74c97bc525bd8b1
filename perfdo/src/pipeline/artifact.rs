//! Artifact naming and the per-run artifact ledger
//!
//! Every file a stage writes is named from the run's base identifier and the
//! tool flags that produced it, so the same stage with the same flags always
//! lands on the same path. Later stages find earlier outputs by asking the
//! ledger, not by probing the filesystem.

use crate::domain::{BaseName, STRIPPED_CHARS};
use crate::pipeline::mask::Stage;
use serde::Serialize;

/// PMU device names dropped from flag strings after character stripping.
const STRIPPED_PMU_NAMES: [&str; 2] = ["cpu_core", "cpu"];

/// Remove shell-special characters and PMU device names from a flag string.
#[must_use]
pub fn chop_flags(flags: &str) -> String {
    let mut chopped = flags.replace(STRIPPED_CHARS, "");
    for pmu in STRIPPED_PMU_NAMES {
        chopped = chopped.replace(pmu, "");
    }
    chopped
}

/// Canonical artifact stem: `base` followed by the chopped flag string.
#[must_use]
pub fn artifact_name(base: &BaseName, flags: &str) -> String {
    format!("{base}{}", chop_flags(flags))
}

/// Builds every artifact path of a run from its base identifier.
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    base: BaseName,
}

impl ArtifactNamer {
    #[must_use]
    pub fn new(base: BaseName) -> Self {
        Self { base }
    }

    #[must_use]
    pub fn base(&self) -> &BaseName {
        &self.base
    }

    #[must_use]
    pub fn name(&self, flags: &str) -> String {
        artifact_name(&self.base, flags)
    }

    /// `<base>.perf_stat<flags>.log`; flags are kept verbatim apart from trimming.
    #[must_use]
    pub fn perf_stat_log(&self, flags: &str) -> String {
        format!("{}.perf_stat{}.log", self.base, flags.trim())
    }

    /// `<base><chopped flags>.perf.data`
    #[must_use]
    pub fn record_data(&self, flags: &str) -> String {
        format!("{}.perf.data", self.name(flags))
    }

    /// Stem shared by the call-stack sampling reports: `<base>.perf<chopped flags>`.
    #[must_use]
    pub fn sampling_stem(&self, flags: &str) -> String {
        format!("{}.perf{}", self.base, chop_flags(flags))
    }

    /// `<base>.toplev<variant><tag>.log`
    #[must_use]
    pub fn toplev_log(&self, variant: &str, tag: &str) -> String {
        format!("{}.toplev{variant}{tag}.log", self.base)
    }

    #[must_use]
    pub fn imix_log(&self) -> String {
        format!("{}.perf-imix.log", self.base)
    }

    #[must_use]
    pub fn imix_no_operands_log(&self) -> String {
        format!("{}.perf-imix-no.log", self.base)
    }

    /// Logs of the report/annotate pass over the drilldown's own samples.
    #[must_use]
    pub fn locate_log(&self, tool: &str) -> String {
        format!("{}.locate-{tool}.log", self.base)
    }

    #[must_use]
    pub fn history_file(&self) -> String {
        format!(".{}.cmd", self.base)
    }

    #[must_use]
    pub fn manifest(&self) -> String {
        format!("{}.artifacts.json", self.base)
    }
}

/// `<data>.<suffix>.log` for logs derived from a sampling data file.
#[must_use]
pub fn derived_log(data: &str, suffix: &str) -> String {
    format!("{data}.{suffix}.log")
}

/// `<stem>-<suffix>.log` for call-stack sampling reports.
#[must_use]
pub fn stem_log(stem: &str, suffix: &str) -> String {
    format!("{stem}-{suffix}.log")
}

/// Companion CSV that toplev writes next to a log.
#[must_use]
pub fn toplev_csv(log: &str) -> String {
    log.replace(".log", "-perf.csv")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    SetupLog,
    CountingLog,
    SamplingData,
    TopdownLog,
    TopdownCsv,
    ReportLog,
    DecodedLog,
}

/// A file written by a stage, referenced by path only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: String,
    pub kind: ArtifactKind,
    pub producer: Stage,
    pub consumers: Vec<Stage>,
}

impl Artifact {
    #[must_use]
    pub fn new(path: impl Into<String>, kind: ArtifactKind, producer: Stage) -> Self {
        let consumers =
            Stage::ALL.into_iter().filter(|s| s.depends_on().contains(&producer)).collect();
        Self { path: path.into(), kind, producer, consumers }
    }
}

/// Artifacts recorded during one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ArtifactLedger {
    artifacts: Vec<Artifact>,
}

impl ArtifactLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an artifact; an existing entry with the same path is replaced.
    pub fn record(&mut self, artifact: Artifact) {
        self.artifacts.retain(|a| a.path != artifact.path);
        self.artifacts.push(artifact);
    }

    /// Most recent artifact of `kind` produced by `stage`.
    #[must_use]
    pub fn produced_by(&self, stage: Stage, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().rev().find(|a| a.producer == stage && a.kind == kind)
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.path == path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namer() -> ArtifactNamer {
        ArtifactNamer::new(BaseName::raw("app"))
    }

    #[test]
    fn test_name_is_deterministic() {
        let n = namer();
        assert_eq!(n.name("-e foo:pp"), n.name("-e foo:pp"));
    }

    #[test]
    fn test_stripped_characters_collide() {
        let n = namer();
        assert_eq!(n.name("-c 1000,x=1"), n.name("-c1000x1"));
        assert_eq!(n.name("a/b:c"), n.name("abc"));
    }

    #[test]
    fn test_pmu_names_removed() {
        let n = namer();
        assert_eq!(n.name("-b -e cpu/event=0xc6/uppp"), "app-b-eevent0xc6uppp");
        assert_eq!(n.name("-e cpu_core/event=0xc4/"), "app-eevent0xc4");
    }

    #[test]
    fn test_fixed_artifact_shapes() {
        let n = namer();
        assert_eq!(n.perf_stat_log("-r3"), "app.perf_stat-r3.log");
        assert_eq!(n.perf_stat_log("-a "), "app.perf_stat-a.log");
        assert_eq!(n.record_data(""), "app.perf.data");
        assert_eq!(n.sampling_stem(""), "app.perf");
        assert_eq!(stem_log("app.perf", "funcs"), "app.perf-funcs.log");
        assert_eq!(n.toplev_log("-vl6", "-nomux"), "app.toplev-vl6-nomux.log");
        assert_eq!(toplev_csv("app.toplev-vl6.log"), "app.toplev-vl6-perf.csv");
        assert_eq!(derived_log("app.perf.data", "ips"), "app.perf.data.ips.log");
        assert_eq!(n.imix_no_operands_log(), "app.perf-imix-no.log");
        assert_eq!(n.history_file(), ".app.cmd");
    }

    #[test]
    fn test_record_data_appends_flags_to_base() {
        let n = namer();
        assert_eq!(
            n.record_data("-j any,save_type -e r20c4:ppp -c 700001"),
            "app-janysave_type-er20c4ppp-c700001.perf.data"
        );
        assert_eq!(n.record_data("-b -e cpu/event=0xc6/uppp -c 1000003"), "app-b-eevent0xc6uppp-c1000003.perf.data");
    }

    #[test]
    fn test_ledger_last_writer_wins() {
        let mut ledger = ArtifactLedger::new();
        ledger.record(Artifact::new("x.log", ArtifactKind::TopdownLog, Stage::TopdownFull));
        ledger.record(Artifact::new("x.log", ArtifactKind::TopdownLog, Stage::TopdownNoMultiplex));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("x.log").unwrap().producer, Stage::TopdownNoMultiplex);
    }

    #[test]
    fn test_counting_log_declares_lbr_consumer() {
        let a = Artifact::new("app.perf_stat-r3.log", ArtifactKind::CountingLog, Stage::AppCounting);
        assert_eq!(a.consumers, vec![Stage::LbrStats]);
    }
}
