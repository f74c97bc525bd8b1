//! Stage sequencing
//!
//! [`PipelineOrchestrator`] walks the enabled stages in ascending order,
//! builds each stage's commands and hands them to the executor. Failed
//! commands are recorded and the run moves on; a broken stage invariant
//! stops the run.

use log::{info, warn};
use serde::Serialize;
use std::sync::OnceLock;
use std::thread;

use crate::capability::Capabilities;
use crate::context::RunContext;
use crate::domain::{ExecError, PipelineError, PreconditionError};
use crate::executor::{CommandExecutor, Invocation, Redirect};
use crate::pipeline::artifact::{derived_log, stem_log, Artifact, ArtifactKind, ArtifactLedger};
use crate::pipeline::decoder::{trim_selector, DecoderPipeline};
use crate::pipeline::events::{power_events, stat_events};
use crate::pipeline::inventory;
use crate::pipeline::mask::Stage;
use crate::pipeline::shell::Pipeline;
use crate::pipeline::toplev::{
    nonzero_filter, nonzero_filter_all, ToplevStageBuilder, ToplevVariant, BOTTLENECK_FILTER,
    DRILLDOWN_NOISE_FILTER,
};

const APP_STAT_FILTER: &str = r#"| egrep "seconds [st]|CPUs|GHz|insn|topdown""#;
const SYSTEM_STAT_FILTER: &str = r#"| egrep "seconds|insn|topdown|pkg""#;

/// A command that failed without stopping the run.
#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub stage: Stage,
    pub step: String,
    pub error: String,
}

/// A stage or sub-step left out on purpose.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedStep {
    pub stage: Stage,
    pub step: String,
    pub reason: String,
}

/// What happened during a run, for the manifest and the exit summary.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub executed: Vec<Stage>,
    pub failures: Vec<StepFailure>,
    pub skipped: Vec<SkippedStep>,
}

/// Branch-sampling flavor of stages 8 and 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchSampling {
    Lbr,
    Pebs,
}

impl BranchSampling {
    fn tag(self) -> &'static str {
        match self {
            BranchSampling::Lbr => "lbr",
            BranchSampling::Pebs => "pebs",
        }
    }

    fn stage(self) -> Stage {
        match self {
            BranchSampling::Lbr => Stage::LbrStats,
            BranchSampling::Pebs => Stage::PebsStats,
        }
    }
}

pub struct PipelineOrchestrator<'a, E: CommandExecutor> {
    ctx: &'a RunContext,
    caps: &'a Capabilities,
    exec: &'a E,
    force_inventory: bool,
    ledger: ArtifactLedger,
    report: RunReport,
    /// Process with the most samples, captured by the first branch-sampling stage
    comm: OnceLock<String>,
}

impl<'a, E: CommandExecutor> PipelineOrchestrator<'a, E> {
    pub fn new(ctx: &'a RunContext, caps: &'a Capabilities, exec: &'a E) -> Self {
        Self {
            ctx,
            caps,
            exec,
            force_inventory: false,
            ledger: ArtifactLedger::new(),
            report: RunReport::default(),
            comm: OnceLock::new(),
        }
    }

    /// Run the host inventory even if its mask bit is clear.
    #[must_use]
    pub fn with_inventory(mut self, force: bool) -> Self {
        self.force_inventory = force;
        self
    }

    #[must_use]
    pub fn ledger(&self) -> &ArtifactLedger {
        &self.ledger
    }

    #[must_use]
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Hand back the run report and artifact ledger.
    #[must_use]
    pub fn into_parts(self) -> (RunReport, ArtifactLedger) {
        (self.report, self.ledger)
    }

    /// Stages this run will attempt, in order.
    pub fn planned_stages(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(|&stage| {
            self.ctx.mask.enabled(stage) || (stage == Stage::HostInventory && self.force_inventory)
        })
    }

    /// Run every planned stage.
    ///
    /// # Errors
    /// Returns `PipelineError::Precondition` when a stage invariant fails; no
    /// later stage is attempted. Branch-sampling invariants are checked before
    /// the first command is dispatched.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        let stages: Vec<Stage> = self.planned_stages().collect();
        for &stage in &stages {
            if let Some(sampling) = self.branch_sampling(stage) {
                self.check_branch_sampling(sampling)?;
            }
        }

        for stage in stages {
            info!("stage {}: {}", stage.id(), stage.name());
            self.run_stage(stage)?;
        }
        Ok(())
    }

    /// Write the host inventory only.
    pub fn run_inventory(&mut self) {
        self.host_inventory();
        self.report.executed.push(Stage::HostInventory);
    }

    fn run_stage(&mut self, stage: Stage) -> Result<(), PipelineError> {
        let ctx = self.ctx;
        let s = &ctx.settings;
        let ran = match stage {
            Stage::HostInventory => {
                self.host_inventory();
                true
            }
            Stage::AppCounting if s.repeat > 0 => {
                self.app_counting()?;
                true
            }
            Stage::SystemCounting => {
                self.system_counting()?;
                true
            }
            Stage::CallStackSampling if s.sample >= 1 => {
                self.call_stack_sampling();
                true
            }
            Stage::TopdownFull => {
                self.topdown(stage, ToplevVariant::Full, BOTTLENECK_FILTER, "topdown full");
                true
            }
            Stage::TopdownLevels => {
                let msg = format!("topdown {}-levels {} runs", s.toplev_levels, s.repeat);
                let filter = nonzero_filter(ctx.verbose);
                self.topdown(stage, ToplevVariant::Levels(s.toplev_levels), &filter, &msg);
                true
            }
            Stage::TopdownDrilldown => {
                self.topdown_drilldown();
                true
            }
            Stage::TopdownNoMultiplex if ctx.no_multiplex => {
                let filter = nonzero_filter(ctx.verbose);
                let log = self.topdown(stage, ToplevVariant::NoMultiplex, &filter, "topdown full no multiplexing");
                self.exec.note(&format!("cat {log} | {}", nonzero_filter_all()), false);
                true
            }
            Stage::LbrStats if s.sample > 1 => {
                self.lbr_stats()?;
                true
            }
            Stage::PebsStats if s.sample > 2 => {
                self.pebs_stats()?;
                true
            }
            _ => false,
        };

        if ran {
            self.report.executed.push(stage);
        } else {
            self.skip(stage, stage.name(), "disabled by settings");
        }
        Ok(())
    }

    fn branch_sampling(&self, stage: Stage) -> Option<BranchSampling> {
        let sample = self.ctx.settings.sample;
        match stage {
            Stage::LbrStats if sample > 1 => Some(BranchSampling::Lbr),
            Stage::PebsStats if sample > 2 => Some(BranchSampling::Pebs),
            _ => None,
        }
    }

    fn sampling_flags(&self, sampling: BranchSampling) -> &str {
        match sampling {
            BranchSampling::Lbr => &self.ctx.settings.perf_lbr,
            BranchSampling::Pebs => &self.ctx.settings.perf_pebs,
        }
    }

    fn check_branch_sampling(&self, sampling: BranchSampling) -> Result<(), PreconditionError> {
        let flags = self.sampling_flags(sampling);
        if !(flags.contains("-b") || flags.contains("-j any") || self.ctx.settings.forgive) {
            return Err(PreconditionError::UnfilteredBranchRecords {
                tag: sampling.tag().to_string(),
                flags: flags.to_string(),
            });
        }
        if sampling == BranchSampling::Lbr {
            let event = self.caps.lbr_event();
            let mut stem = event.chars();
            stem.next_back();
            if !flags.contains(stem.as_str()) {
                return Err(PreconditionError::IncorrectLbrEvent { event, flags: flags.to_string() });
            }
        }
        Ok(())
    }

    // -- dispatch helpers --

    fn settle(&mut self, stage: Stage, step: &str, result: Result<(), ExecError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("{step}: {e}");
                self.report.failures.push(StepFailure {
                    stage,
                    step: step.to_string(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    fn dispatch(&mut self, stage: Stage, inv: &Invocation) -> bool {
        let step = inv.message.clone().unwrap_or_else(|| inv.command.clone());
        let result = self.exec.execute(inv);
        self.settle(stage, &step, result)
    }

    fn run_cmd(&mut self, stage: Stage, command: impl Into<String>, msg: &str) -> bool {
        self.dispatch(stage, &Invocation::new(command).message(msg))
    }

    /// `perf script` passes print their own output and are timed at higher verbosity.
    fn perf_script(&mut self, stage: Stage, pipeline: &Pipeline, msg: &str) -> bool {
        let inv = Invocation::new(pipeline.render())
            .message(msg)
            .redirect(Redirect::None)
            .timed(self.ctx.verbose > 1)
            .label_source(pipeline.source());
        self.dispatch(stage, &inv)
    }

    fn capture(&mut self, stage: Stage, command: &str, field: Option<usize>) -> Option<String> {
        match self.exec.capture(command, field) {
            Ok(value) => value,
            Err(e) => {
                self.settle(stage, command, Err(e));
                None
            }
        }
    }

    fn skip(&mut self, stage: Stage, step: &str, reason: &str) {
        info!("skipping {step}: {reason}");
        self.report.skipped.push(SkippedStep {
            stage,
            step: step.to_string(),
            reason: reason.to_string(),
        });
    }

    fn produce(&mut self, path: impl Into<String>, kind: ArtifactKind, stage: Stage) {
        self.ledger.record(Artifact::new(path, kind, stage));
    }

    fn perf_report(&self) -> String {
        let mut cmd = format!("{} report", self.ctx.perf);
        if self.caps.objdump_available {
            cmd.push_str(&format!(" --objdump {}", self.ctx.settings.objdump));
        }
        cmd
    }

    // -- stages --

    fn host_inventory(&mut self) {
        let stage = Stage::HostInventory;
        println!("{}", self.caps.pmu_name);
        for step in inventory::steps(self.ctx, self.caps) {
            if self.dispatch(stage, &step.invocation) {
                if let Some(log) = step.creates {
                    self.produce(log, ArtifactKind::SetupLog, stage);
                }
            }
        }
    }

    /// `perf stat` command line and its log path.
    fn perf_stat(&self, flags: &str, extra: &str, filter: &str) -> Result<(String, String), PipelineError> {
        let s = &self.ctx.settings;
        let mut perf_args = format!("{flags} {}", s.perf_stat);
        let events = stat_events(self.caps, s.core, extra, self.ctx.events.as_deref())?;
        // user-defined events are shown unfiltered
        let filter = if self.ctx.events.is_some() { "" } else { filter };
        if !events.is_empty() {
            perf_args.push_str(&format!(" -e \"{},{events}\"", s.perf_stat_def));
        }
        let log = self.ctx.namer.perf_stat_log(flags);
        let cmd = format!("{} stat {perf_args} -- {} | tee {log} {filter}", self.ctx.perf, s.run);
        Ok((cmd, log))
    }

    fn app_counting(&mut self) -> Result<(), PipelineError> {
        let repeat = self.ctx.settings.repeat;
        let (cmd, log) = self.perf_stat(&format!("-r{repeat}"), "", APP_STAT_FILTER)?;
        if self.run_cmd(Stage::AppCounting, cmd, &format!("per-app counting {repeat} runs")) {
            self.produce(log, ArtifactKind::CountingLog, Stage::AppCounting);
        }
        Ok(())
    }

    fn system_counting(&mut self) -> Result<(), PipelineError> {
        let power = if self.ctx.power && !self.caps.perfmon_v5 { power_events() } else { String::new() };
        let (cmd, log) = self.perf_stat("-a", &power, SYSTEM_STAT_FILTER)?;
        if self.run_cmd(Stage::SystemCounting, cmd, "system-wide counting") {
            self.produce(log, ArtifactKind::CountingLog, Stage::SystemCounting);
        }
        Ok(())
    }

    fn call_stack_sampling(&mut self) {
        let stage = Stage::CallStackSampling;
        let ctx = self.ctx;
        let s = &ctx.settings;
        let record_flags = if s.perf_record.is_empty() { String::new() } else { format!("{} ", s.perf_record) };
        let data = ctx.namer.record_data(&record_flags);
        let stem = ctx.namer.sampling_stem(&record_flags);
        let perf_report = self.perf_report();

        let record = format!("{} record -c 1000003 -g -o {data} {record_flags}{}", ctx.perf, s.run);
        if !self.run_cmd(stage, record, &format!("sampling {record_flags}w/ stacks")) {
            return;
        }
        self.produce(&data, ArtifactKind::SamplingData, stage);
        self.exec.note(&format!("Try '{perf_report} -i {data}' to browse time-consuming sources"), true);

        let funcs_log = stem_log(&stem, "funcs");
        let modules_log = stem_log(&stem, "modules");
        let code_log = stem_log(&stem, "code");
        let code_nz_log = stem_log(&stem, "code_nz");
        let derivations = [
            Invocation::new(format!(
                "{perf_report} --stdio -F sample,overhead,comm,dso,sym -n --no-call-graph -i {data} \
                 | tee {funcs_log} | grep -A7 Overhead | egrep -v '^# \\.|^\\s+$|^$' | head | sed 's/[ \\t]*$//'"
            ))
            .message("@report functions"),
            Invocation::new(format!(
                "{perf_report} --stdio --hierarchy --header -i {data} | grep -v ' 0\\.0.%' \
                 | tee {modules_log} | grep -A22 Overhead"
            ))
            .message("@report modules"),
            Invocation::new(format!(
                "{} annotate --stdio -n -l -i {data} | c++filt | tee {code_log} \
                 | egrep -v -E '^(\\-|\\s+([A-Za-z:]|[0-9] :))' > {code_nz_log}",
                ctx.perf
            ))
            .message("@annotate code")
            .redirect(Redirect::DiscardStderr),
        ];

        let exec = self.exec;
        let results: Vec<Result<(), ExecError>> = thread::scope(|scope| {
            let handles: Vec<_> =
                derivations.iter().map(|inv| scope.spawn(move || exec.execute(inv))).collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });
        let outputs = [vec![funcs_log], vec![modules_log], vec![code_log.clone(), code_nz_log]];
        let mut annotated = false;
        for ((inv, result), logs) in derivations.iter().zip(results).zip(outputs) {
            let step = inv.message.clone().unwrap_or_default();
            let ok = self.settle(stage, &step, result);
            if ok {
                for log in logs {
                    self.produce(log, ArtifactKind::ReportLog, stage);
                }
            }
            if step == "@annotate code" {
                annotated = ok;
            }
        }

        if annotated {
            match self.capture(stage, &format!("sort -n {code_log} | tail -1"), Some(0)) {
                Some(hottest) => {
                    self.run_cmd(stage, format!("egrep -w -5 '{hottest} :' {code_log}"), "@hottest block");
                }
                None => self.skip(stage, "@hottest block", "no annotated samples captured"),
            }
        }

        if s.xed {
            let decoder = DecoderPipeline::new(ctx);
            let hot_insts = stem_log(&stem, "hot-insts");
            let pipeline = Pipeline::new(format!("{} script -i {data} -F insn --xed", ctx.perf))
                .pipe(decoder.sort_to_percent())
                .tee(&hot_insts)
                .pipe("tail");
            if self.perf_script(stage, &pipeline, "@time-consuming instructions") {
                self.produce(hot_insts, ArtifactKind::ReportLog, stage);
            }
        }
    }

    /// Dispatch one toplev variant piped through `filter`; returns its log path.
    fn topdown(&mut self, stage: Stage, variant: ToplevVariant, filter: &str, msg: &str) -> String {
        let inv = ToplevStageBuilder::new(self.ctx, self.caps).invocation(variant);
        let cmd = format!("{} | tee {} | {filter}", inv.command, inv.log);
        if self.run_cmd(stage, cmd, msg) {
            self.produce(&inv.log, ArtifactKind::TopdownLog, stage);
            self.produce(inv.csv, ArtifactKind::TopdownCsv, stage);
        }
        inv.log
    }

    fn topdown_drilldown(&mut self) {
        let stage = Stage::TopdownDrilldown;
        let log = self.topdown(stage, ToplevVariant::Drilldown, DRILLDOWN_NOISE_FILTER, "topdown auto-drilldown");
        if self.ctx.settings.sample > 3 {
            if let Err(e) = self.locate_bottleneck(&log) {
                warn!("{e}");
                self.report.failures.push(StepFailure {
                    stage,
                    step: "@sampling on bottleneck".to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Re-run the drilldown's own `perf record` and report on its samples.
    fn locate_bottleneck(&mut self, log: &str) -> Result<(), PreconditionError> {
        let stage = Stage::TopdownDrilldown;
        let step = "@sampling on bottleneck";
        if self.ctx.dry_run {
            self.skip(stage, step, "drilldown output is not produced in dry-run");
            return Ok(());
        }
        let missing = || PreconditionError::MissingOutput {
            step: step.to_string(),
            source_path: log.to_string(),
        };

        let record = self.capture(stage, &format!("grep 'perf record' {log} | tail -1"), None).ok_or_else(missing)?;
        let data = record
            .split_once("-o ")
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .map(str::to_string)
            .ok_or_else(missing)?;

        if !self.run_cmd(stage, record, step) {
            return Ok(());
        }
        self.produce(&data, ArtifactKind::SamplingData, stage);
        self.exec.note(
            &format!("Try '{} -i {data}' to browse sources for critical bottlenecks", self.perf_report()),
            true,
        );
        for tool in ["report", "annotate"] {
            let out = self.ctx.namer.locate_log(tool);
            let cmd = format!("{} {tool} --stdio -i {data} > {out}", self.ctx.perf);
            if self.run_cmd(stage, cmd, &format!("@{tool}")) {
                self.produce(out, ArtifactKind::ReportLog, stage);
            }
        }
        Ok(())
    }

    /// Record with the branch-sampling flags and return the data path.
    fn branch_record(&mut self, sampling: BranchSampling) -> String {
        let stage = sampling.stage();
        let ctx = self.ctx;
        let flags = self.sampling_flags(sampling).to_string();
        let data = ctx.namer.record_data(&flags);
        let cmd = format!(
            "{} record {flags} -o {data} {} -- {}",
            ctx.perf, ctx.settings.perf_stat_ipc, ctx.settings.run
        );
        let msg = format!("sampling w/ {}", sampling.tag().to_uppercase());
        if self.run_cmd(stage, cmd, &msg) {
            self.produce(&data, ArtifactKind::SamplingData, stage);
        }
        self.exec.note(
            &format!("Try '{} -i {data} --branch-history --samples 9' to browse streams", self.perf_report()),
            true,
        );
        data
    }

    /// Process with the most samples in `data`, captured once per run.
    fn process_name(&mut self, stage: Stage, data: &str) -> Result<String, PreconditionError> {
        if let Some(comm) = self.comm.get() {
            return Ok(comm.clone());
        }
        let query = DecoderPipeline::new(self.ctx).dominant_process_query(data);
        let comm = self.capture(stage, &query, Some(1)).ok_or_else(|| PreconditionError::MissingOutput {
            step: "process name".to_string(),
            source_path: data.to_string(),
        })?;
        info!("profiled process: {comm}");
        Ok(self.comm.get_or_init(|| comm).clone())
    }

    fn lbr_stats(&mut self) -> Result<(), PipelineError> {
        let stage = Stage::LbrStats;
        self.check_branch_sampling(BranchSampling::Lbr)?;
        let ctx = self.ctx;
        let decoder = DecoderPipeline::new(ctx);

        let data = self.branch_record(BranchSampling::Lbr);
        let comm = self.process_name(stage, &data)?;
        let info = derived_log(&data, "info");

        if self.perf_script(stage, &decoder.branch_statistics(&data, &info), "@stats") {
            self.produce(&info, ArtifactKind::DecodedLog, stage);
        }
        let counting = self.ledger.produced_by(Stage::AppCounting, ArtifactKind::CountingLog).map(|a| a.path.clone());
        if let Some(counting) = counting {
            let summary = DecoderPipeline::counting_summary(&counting, &info);
            self.dispatch(stage, &Invocation::new(summary.render()));
        }
        if !ctx.settings.xed {
            self.skip(stage, "@instruction-mix", "instruction decoding is off");
            return Ok(());
        }

        let ips = derived_log(&data, "ips");
        let hits = derived_log(&data, "hitcounts");
        let namer = &ctx.namer;
        self.dispatch(
            stage,
            &Invocation::new(format!("printf \"\\n# LBR-based Statistics:\\n#\\n\" >> {info}")).unrecorded(),
        );
        self.exec.note(&decoder.lbr_stats_hint(&data, &comm), true);

        let imix = decoder.instruction_mix(&data, &comm, &info);
        if self.perf_script(stage, &imix, &format!("@instruction-mix for '{comm}'")) {
            for path in [&hits, &ips, &derived_log(&data, "loops"), &namer.imix_log(), &namer.imix_no_operands_log()] {
                self.produce(path.as_str(), ArtifactKind::DecodedLog, stage);
            }
        }
        self.run_cmd(
            stage,
            format!("tail {}", namer.imix_no_operands_log()),
            &format!("@i-mix no operands for '{comm}'"),
        );
        self.run_cmd(stage, format!("tail -4 {ips}"), &format!("@top-3 hitcounts of basic-blocks to examine in {hits}"));
        self.run_cmd(
            stage,
            DecoderPipeline::info_summary(&info),
            &format!("@hottest loops & more stats in {info}"),
        );

        let loops = ctx.settings.loops;
        if loops > 0 {
            self.dispatch(stage, &Invocation::new(format!("echo >> {info}")).unrecorded());
            let selectors: Vec<String> = (1..=loops)
                .rev()
                .filter_map(|rank| {
                    let query = DecoderPipeline::loop_selector_query(&data, rank);
                    self.capture(stage, &query, Some(2)).map(|field| trim_selector(&field))
                })
                .collect();
            if selectors.is_empty() {
                self.skip(stage, "@stats for top loops", "no loops captured");
            } else {
                let pipeline = decoder.loop_stats(&data, &comm, &selectors, &info);
                self.perf_script(stage, &pipeline, &format!("@stats for top {loops} loops"));
            }
        }

        self.refine_hot_ips(stage, &data, Some(&comm), &ips);
        Ok(())
    }

    fn pebs_stats(&mut self) -> Result<(), PipelineError> {
        let stage = Stage::PebsStats;
        self.check_branch_sampling(BranchSampling::Pebs)?;
        let ctx = self.ctx;
        let decoder = DecoderPipeline::new(ctx);

        let data = self.branch_record(BranchSampling::Pebs);
        self.process_name(stage, &data)?;

        if self.run_cmd(stage, decoder.pebs_modules(&data).render(), "@ top-10 modules") {
            self.produce(derived_log(&data, "modules"), ArtifactKind::DecodedLog, stage);
        }
        let ips = derived_log(&data, "ips");
        if self.perf_script(stage, &decoder.ip_histogram(&data), "@ top-10 IPs") {
            self.produce(&ips, ArtifactKind::DecodedLog, stage);
        }

        if let Some(msb) = self.caps.dsb_msb.filter(|_| ctx.settings.perf_pebs.contains("DSB_MISS")) {
            if self.caps.smt_on {
                warn!("Disable SMT for DSB robust analysis");
                self.skip(stage, "@ DSB-miss sets", "SMT is on; PEBS event stats run without DSB sets");
            } else if self.perf_script(stage, &decoder.dsb_sets(&data, msb), "@ DSB-miss sets") {
                self.produce(derived_log(&data, "dsb-sets"), ArtifactKind::DecodedLog, stage);
            }
        }

        if ctx.settings.top != 1 {
            self.perf_script(stage, &decoder.event_stats_pass(&data, None, &ips), "@ stats on PEBS event");
        }
        self.refine_hot_ips(stage, &data, None, &ips);
        Ok(())
    }

    /// Extra stats passes on the hottest IPs, all appended to `ips`.
    fn refine_hot_ips(&mut self, stage: Stage, data: &str, comm: Option<&str>, ips: &str) {
        let top = self.ctx.settings.top;
        let decoder = DecoderPipeline::new(self.ctx);
        match top {
            0 => {}
            1 => match self.capture(stage, &DecoderPipeline::next_hottest_query(ips), Some(2)) {
                Some(ip) => {
                    let pipeline = decoder.combined_ip_pass(data, comm, &ip, ips);
                    self.perf_script(stage, &pipeline, &format!("@ stats on ip={ip}"));
                }
                None => self.skip(stage, "@ stats on hottest ip", "no ip captured"),
            },
            _ => {
                for rank in (1..=top).rev() {
                    match self.capture(stage, &DecoderPipeline::ip_rank_query(ips, rank), Some(2)) {
                        Some(ip) => {
                            let pipeline = decoder.ip_stats_pass(data, comm, &ip, ips);
                            self.perf_script(stage, &pipeline, &format!("@ stats on ip={ip}"));
                        }
                        None => self.skip(stage, &format!("@ stats on ip rank {rank}"), "no ip captured"),
                    }
                }
            }
        }
    }
}
