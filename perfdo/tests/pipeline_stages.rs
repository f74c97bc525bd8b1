use clap::Parser;
use std::sync::Mutex;

use perfdo::capability::{Capabilities, Microarch};
use perfdo::cli::Args;
use perfdo::commands::{self, Command};
use perfdo::context::RunContext;
use perfdo::domain::{ConfigError, ExecError, PipelineError, PreconditionError};
use perfdo::executor::{first_line_field, CommandExecutor, Invocation};
use perfdo::pipeline::{ArtifactKind, PipelineOrchestrator, Stage, StageMask};

/// Records every invocation and answers captures from canned output.
#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<Invocation>>,
    /// (substring of the query, first output line)
    answers: Vec<(&'static str, &'static str)>,
    /// Commands containing this substring exit non-zero
    fail_on: Option<&'static str>,
}

impl RecordingExecutor {
    fn answering(answers: &[(&'static str, &'static str)]) -> Self {
        Self { answers: answers.to_vec(), ..Self::default() }
    }

    fn commands(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|i| i.command.clone()).collect()
    }

    fn messages(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().filter_map(|i| i.message.clone()).collect()
    }

    fn position(&self, needle: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(needle))
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<(), ExecError> {
        self.calls.lock().unwrap().push(invocation.clone());
        match self.fail_on {
            Some(pattern) if invocation.command.contains(pattern) => {
                Err(ExecError::Failed { command: invocation.command.clone(), status: 1 })
            }
            _ => Ok(()),
        }
    }

    fn capture(&self, command: &str, field: Option<usize>) -> Result<Option<String>, ExecError> {
        Ok(self
            .answers
            .iter()
            .find(|(pattern, _)| command.contains(pattern))
            .and_then(|(_, line)| first_line_field(line, field)))
    }

    fn note(&self, _text: &str, _show: bool) {}
}

/// Captured output every branch-sampling stage needs.
const SAMPLING_ANSWERS: [(&str, &str); 5] = [
    ("-F comm", "  812 app"),
    ("loops.log", "[loop 1] 0x401000: 12"),
    ("| tail -3 | head -1", "3.1% 40 0x4011aa"),
    ("| tail -2 | head -1", "9.8% 120 0x4010f0"),
    ("tail -2 ", "9.8% 120 0x4010f0"),
];

fn context(argv: &[&str], mask: u32, caps: &Capabilities) -> RunContext {
    let args = Args::parse_from(["perfdo", "profile", "-a", "./app"].iter().chain(argv.iter()));
    RunContext::from_args(&args, StageMask::from_bits(mask), caps).unwrap()
}

#[test]
fn test_stages_follow_mask_in_ascending_order() {
    let caps = Capabilities::unknown();
    for mask in [0x0, 0x2, 0x55, 0xF0, 0x17F, 0x3FF] {
        let ctx = context(&["--tune", ":sample:3"], mask, &caps);
        let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
        let mut orchestrator = PipelineOrchestrator::new(&ctx, &caps, &exec);
        orchestrator.run().unwrap();

        let expected: Vec<Stage> = StageMask::from_bits(mask).stages().collect();
        assert_eq!(orchestrator.report().executed, expected, "mask 0x{mask:x}");
    }
}

#[test]
fn test_stage_messages_in_order() {
    let caps = Capabilities::unknown();
    let ctx = context(&["--tune", ":sample:3"], 0x3FF, &caps);
    let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
    PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap();

    let top_level: Vec<String> = exec.messages().into_iter().filter(|m| !m.starts_with('@')).collect();
    assert_eq!(
        top_level,
        vec![
            "logging setup",
            "per-app counting 3 runs",
            "system-wide counting",
            "sampling w/ stacks",
            "topdown full",
            "topdown 2-levels 3 runs",
            "topdown auto-drilldown",
            "topdown full no multiplexing",
            "sampling w/ LBR",
            "sampling w/ PEBS",
        ]
    );
}

#[test]
fn test_unfiltered_lbr_aborts_before_any_command() {
    let caps = Capabilities::unknown();
    for mask in [0x100, 0x103] {
        let ctx = context(&["--tune", ":perf-lbr:-e r20c4:ppp -c 700001"], mask, &caps);
        let exec = RecordingExecutor::default();
        let err = PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Precondition(PreconditionError::UnfilteredBranchRecords { ref tag, .. }) if tag == "lbr"
        ));
        assert!(exec.commands().is_empty(), "mask 0x{mask:x} dispatched commands");
    }
}

#[test]
fn test_forgive_accepts_filtered_lbr() {
    let caps = Capabilities::unknown();
    let ctx = context(&["--tune", ":perf-lbr:-e r20c4:ppp -c 700001", ":forgive:1"], 0x100, &caps);
    let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
    PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap();
    assert!(exec.position("record -e r20c4:ppp -c 700001").is_some());
}

#[test]
fn test_wrong_lbr_event_is_precondition_error() {
    let caps = Capabilities::for_microarch(Microarch::AlderlakeHybrid);
    // hybrid parts expect the cpu_core event, not the raw one
    let ctx = context(&["--tune", ":perf-lbr:-j any -e r20c4:ppp"], 0x100, &caps);
    let exec = RecordingExecutor::default();
    let err = PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap_err();
    assert!(matches!(err, PipelineError::Precondition(PreconditionError::IncorrectLbrEvent { .. })));
    assert!(exec.commands().is_empty());
}

#[test]
fn test_dry_run_with_lbr_rejected_at_validation() {
    let args = Args::parse_from(["perfdo", "profile", "--print-only", "--profile-mask", "0x200"]);
    let err = commands::validate(&args).unwrap_err();
    assert!(matches!(err, ConfigError::DryRunWithBranchSampling { mask: 0x200 }));
}

#[test]
fn test_app_counting_only() {
    let caps = Capabilities::unknown();
    let ctx = context(&[], 0x02, &caps);
    let exec = RecordingExecutor::default();
    let mut orchestrator = PipelineOrchestrator::new(&ctx, &caps, &exec);
    orchestrator.run().unwrap();

    let cmds = exec.commands();
    assert_eq!(cmds.len(), 1);
    assert!(cmds[0].starts_with("perf stat -r3 "));
    assert!(cmds[0].contains("-- ./app | tee app.perf_stat-r3.log"));
    assert!(!cmds.iter().any(|c| c.contains("toplev") || c.contains("record")));

    let ledger = orchestrator.ledger();
    assert_eq!(ledger.len(), 1);
    let artifact = ledger.get("app.perf_stat-r3.log").unwrap();
    assert_eq!(artifact.kind, ArtifactKind::CountingLog);
    assert_eq!(artifact.producer, Stage::AppCounting);
}

#[test]
fn test_lbr_top_two_refines_in_descending_rank() {
    let caps = Capabilities::unknown();
    let ctx = context(&["--tune", ":top:2"], 0x100, &caps);
    let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
    PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap();

    let calls = exec.calls.lock().unwrap().clone();
    let passes: Vec<&Invocation> =
        calls.iter().filter(|i| i.message.as_deref().is_some_and(|m| m.starts_with("@ stats on ip="))).collect();
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].message.as_deref(), Some("@ stats on ip=0x4011aa"));
    assert_eq!(passes[1].message.as_deref(), Some("@ stats on ip=0x4010f0"));

    let data = ctx.namer.record_data(&ctx.settings.perf_lbr);
    let ips = format!("{data}.ips.log");
    for pass in passes {
        assert!(pass.command.ends_with(&format!("| tee -a {ips}")), "{}", pass.command);
        assert!(pass.command.contains(" -c app"));
    }
}

#[test]
fn test_lbr_stage_builds_instruction_mix_and_loop_stats() {
    let caps = Capabilities::unknown();
    let ctx = context(&[], 0x102, &caps);
    let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
    let mut orchestrator = PipelineOrchestrator::new(&ctx, &caps, &exec);
    orchestrator.run().unwrap();

    let data = ctx.namer.record_data(&ctx.settings.perf_lbr);
    let cmds = exec.commands();
    assert!(cmds.iter().any(|c| c == &format!("egrep '  branches|instructions' app.perf_stat-r3.log >> {data}.info.log")));

    let imix = exec.position("LBR_LOOPS_LOG").unwrap();
    assert!(cmds[imix].starts_with("bash -c \"perf script -i "));
    assert!(cmds[imix].ends_with("| tee app.perf-imix.log | tail\""));

    // three loop selectors, two of them as tee branches
    let loops = exec.position("loop_stats").unwrap();
    assert_eq!(cmds[loops].matches("tee >(./loop_stats 0x401000").count(), 2);
    assert!(loops > imix);

    let ledger = orchestrator.ledger();
    assert!(ledger.get("app.perf-imix-no.log").is_some());
    assert_eq!(ledger.get(&format!("{data}.hitcounts.log")).unwrap().producer, Stage::LbrStats);
}

#[test]
fn test_lbr_stage_without_xed_skips_decoding() {
    let caps = Capabilities::unknown();
    let ctx = context(&["--tune", ":xed:0"], 0x100, &caps);
    let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
    let mut orchestrator = PipelineOrchestrator::new(&ctx, &caps, &exec);
    orchestrator.run().unwrap();

    assert!(exec.position("--xed").is_none());
    assert!(orchestrator.report().skipped.iter().any(|s| s.step == "@instruction-mix"));
}

#[test]
fn test_missing_process_name_aborts() {
    let caps = Capabilities::unknown();
    let ctx = context(&[], 0x100, &caps);
    let exec = RecordingExecutor::default();
    let err = PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap_err();
    assert!(matches!(err, PipelineError::Precondition(PreconditionError::MissingOutput { .. })));
}

#[test]
fn test_call_stack_sampling_derivations() {
    let caps = Capabilities::unknown();
    let ctx = context(&[], 0x08, &caps);
    let exec = RecordingExecutor::answering(&[("sort -n app.perf-code.log", "  42.1 :   401136:  add")]);
    let mut orchestrator = PipelineOrchestrator::new(&ctx, &caps, &exec);
    orchestrator.run().unwrap();

    assert_eq!(exec.position("record -c 1000003 -g -o app.perf.data ./app"), Some(0));
    let annotate = exec.position("annotate --stdio -n -l").unwrap();
    let hottest = exec.position("egrep -w -5 '42.1 :' app.perf-code.log").unwrap();
    assert!(hottest > annotate);
    assert!(exec.position("tee app.perf-hot-insts.log").is_some());

    let ledger = orchestrator.ledger();
    for log in ["app.perf-funcs.log", "app.perf-modules.log", "app.perf-code.log", "app.perf-code_nz.log"] {
        assert_eq!(ledger.get(log).unwrap().kind, ArtifactKind::ReportLog, "{log}");
    }
}

#[test]
fn test_failed_command_does_not_stop_run() {
    let caps = Capabilities::unknown();
    let ctx = context(&[], 0x32, &caps);
    let exec = RecordingExecutor { fail_on: Some("perf stat"), ..RecordingExecutor::default() };
    let mut orchestrator = PipelineOrchestrator::new(&ctx, &caps, &exec);
    orchestrator.run().unwrap();

    let report = orchestrator.report();
    assert_eq!(report.executed, vec![Stage::AppCounting, Stage::TopdownFull, Stage::TopdownLevels]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, Stage::AppCounting);
    assert!(orchestrator.ledger().get("app.perf_stat-r3.log").is_none());
    assert!(orchestrator.ledger().get("app.toplev-vl6.log").is_some());
}

#[test]
fn test_drilldown_without_record_line_continues() {
    let caps = Capabilities::unknown();
    let ctx = context(&["--tune", ":sample:4"], 0xC0, &caps);
    let exec = RecordingExecutor::default();
    let mut orchestrator = PipelineOrchestrator::new(&ctx, &caps, &exec);
    orchestrator.run().unwrap();

    let report = orchestrator.report();
    assert_eq!(report.executed, vec![Stage::TopdownDrilldown, Stage::TopdownNoMultiplex]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, "@sampling on bottleneck");
    assert!(exec.position("--no-multiplex").is_some());
}

#[test]
fn test_drilldown_reruns_embedded_record() {
    let caps = Capabilities::unknown();
    let ctx = context(&["--tune", ":sample:4"], 0x40, &caps);
    let exec = RecordingExecutor::answering(&[(
        "grep 'perf record'",
        "perf record -g -e cycles:pp -o app.toplev-drill.data -- ./app",
    )]);
    let mut orchestrator = PipelineOrchestrator::new(&ctx, &caps, &exec);
    orchestrator.run().unwrap();

    let cmds = exec.commands();
    assert!(cmds.contains(&"perf record -g -e cycles:pp -o app.toplev-drill.data -- ./app".to_string()));
    assert!(cmds.contains(&"perf report --stdio -i app.toplev-drill.data > app.locate-report.log".to_string()));
    assert!(cmds.contains(&"perf annotate --stdio -i app.toplev-drill.data > app.locate-annotate.log".to_string()));
    assert!(orchestrator.report().failures.is_empty());
}

#[test]
fn test_pebs_dsb_sets_need_smt_off() {
    let mut caps = Capabilities::for_microarch(Microarch::Skylake);
    caps.smt_on = true;
    let ctx = context(&["--tune", ":sample:3"], 0x200, &caps);
    {
        let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
        let mut orchestrator = PipelineOrchestrator::new(&ctx, &caps, &exec);
        orchestrator.run().unwrap();
        assert!(exec.position("addrbits").is_none());
        let skipped = &orchestrator.report().skipped;
        let dsb = skipped.iter().find(|s| s.step == "@ DSB-miss sets").unwrap();
        assert!(dsb.reason.contains("SMT is on"));
        assert!(dsb.reason.contains("without DSB sets"));
        // the event stats pass still runs
        assert!(exec.messages().contains(&"@ stats on PEBS event".to_string()));
    }

    caps.smt_on = false;
    let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
    PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap();
    assert!(exec.position("./addrbits 9 6").is_some());
    // general stats pass runs when top != 1
    assert!(exec.messages().contains(&"@ stats on PEBS event".to_string()));
}

#[test]
fn test_pebs_top_one_uses_combined_pass() {
    let caps = Capabilities::unknown();
    let ctx = context(&["--tune", ":sample:3", ":top:1"], 0x200, &caps);
    let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
    PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap();

    assert!(!exec.messages().contains(&"@ stats on PEBS event".to_string()));
    let combined = exec.position("tee >(./lbr_stats 0x4010f0").unwrap();
    assert!(exec.commands()[combined].starts_with("bash -c"));
}

#[test]
fn test_system_wide_power_events() {
    let caps = Capabilities::for_microarch(Microarch::Icelake);
    let ctx = context(&["--power"], 0x04, &caps);
    let exec = RecordingExecutor::default();
    PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap();

    let cmd = &exec.commands()[0];
    assert!(cmd.starts_with("perf stat -a "));
    assert!(cmd.contains("power/energy-pkg/"));
    assert!(cmd.contains("{slots,topdown-retiring"));
    assert!(cmd.ends_with(r#"| egrep "seconds|insn|topdown|pkg""#));
}

#[test]
fn test_all_command_forces_inventory() {
    let caps = Capabilities::unknown();
    let ctx = context(&[], 0x02, &caps);
    let exec = RecordingExecutor::default();
    let outcome = commands::dispatch(Command::All, &ctx, &caps, &exec).unwrap().unwrap();

    assert_eq!(outcome.report.executed, vec![Stage::HostInventory, Stage::AppCounting]);
    assert_eq!(exec.commands()[0], "uname -a > setup-system.log");
    assert!(outcome.ledger.get("setup-system.log").is_some());
    assert!(commands::dispatch(Command::ForgiveMe, &ctx, &caps, &exec).unwrap().is_none());
}

#[test]
fn test_timed_passes_keep_unwrapped_label_source() {
    let caps = Capabilities::unknown();
    let ctx = context(&["-v", "2"], 0x100, &caps);
    let exec = RecordingExecutor::answering(&SAMPLING_ANSWERS);
    PipelineOrchestrator::new(&ctx, &caps, &exec).run().unwrap();

    let calls = exec.calls.lock().unwrap().clone();
    let imix = calls.iter().find(|i| i.command.contains("LBR_LOOPS_LOG")).unwrap();
    assert!(imix.timed);
    assert!(imix.command.starts_with("bash -c"));
    assert!(imix.label_source.as_deref().unwrap().starts_with("perf script -i "));
}

#[test]
fn test_setup_logs_recorded_only_when_written() {
    let caps = Capabilities::unknown();
    let ctx = context(&[], 0x01, &caps);
    let exec = RecordingExecutor { fail_on: Some("lscpu"), ..RecordingExecutor::default() };
    let outcome = commands::dispatch(Command::Log, &ctx, &caps, &exec).unwrap().unwrap();

    assert_eq!(outcome.report.failures.len(), 1);
    assert!(outcome.ledger.get("setup-lscpu.log").is_none());
    for log in ["setup-system.log", "setup-cpuid.log", "setup-dmesg.log", "setup-lsmod.log", "setup-ulimit.log"] {
        assert_eq!(outcome.ledger.get(log).unwrap().kind, ArtifactKind::SetupLog, "{log}");
    }
}
