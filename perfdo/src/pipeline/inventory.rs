//! Host and software inventory (stage 0)
//!
//! Snapshot of the machine a profile was taken on: OS, CPU, PMU, perf
//! settings, memory topology and loaded modules. Everything lands in
//! `setup-*.log` files in the working directory.

use crate::capability::Capabilities;
use crate::context::RunContext;
use crate::executor::Invocation;
use crate::pipeline::shell::grep_or_true;

pub const SYSTEM_LOG: &str = "setup-system.log";
pub const LSCPU_LOG: &str = "setup-lscpu.log";
pub const CPUID_LOG: &str = "setup-cpuid.log";
pub const DMESG_LOG: &str = "setup-dmesg.log";
pub const LSMOD_LOG: &str = "setup-lsmod.log";
pub const ULIMIT_LOG: &str = "setup-ulimit.log";
pub const MEMORY_LOG: &str = "setup-memory.log";

const MEMORY_SYSFILES: [&str; 3] = [
    "/sys/kernel/mm/transparent_hugepage/enabled",
    "/proc/sys/vm/nr_hugepages",
    "/proc/sys/vm/nr_overcommit_hugepages",
];

const PERF_SYSFILES: [&str; 5] = [
    "/proc/sys/kernel/perf_event_paranoid",
    "/proc/sys/kernel/perf_event_mlock_kb",
    "/proc/sys/kernel/kptr_restrict",
    "/proc/sys/kernel/nmi_watchdog",
    "/proc/sys/kernel/soft_watchdog",
];

/// `<path> : <value>` appended to `out`.
fn sysfile_line(path: &str, out: &str) -> Invocation {
    Invocation::new(format!("echo \"{path} : $(cat {path} 2>/dev/null)\" >> {out}")).unrecorded()
}

fn separator(out: &str) -> Invocation {
    Invocation::new(format!("echo >> {out}")).unrecorded()
}

/// One inventory command and the setup log it creates, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryStep {
    pub invocation: Invocation,
    pub creates: Option<&'static str>,
}

impl InventoryStep {
    fn creating(invocation: Invocation, log: &'static str) -> Self {
        Self { invocation, creates: Some(log) }
    }
}

impl From<Invocation> for InventoryStep {
    fn from(invocation: Invocation) -> Self {
        Self { invocation, creates: None }
    }
}

/// Inventory commands in order, each with the log it creates.
#[must_use]
pub fn steps(ctx: &RunContext, caps: &Capabilities) -> Vec<InventoryStep> {
    let out = SYSTEM_LOG;
    let s = &ctx.settings;
    let mut cmds: Vec<InventoryStep> = Vec::new();

    // OS
    cmds.push(InventoryStep::creating(
        Invocation::new(format!("uname -a > {out}")).message("logging setup"),
        SYSTEM_LOG,
    ));
    cmds.push(Invocation::new(format!("cat /etc/os-release | egrep -v 'URL|ID_LIKE|CODENAME' >> {out}")).into());
    cmds.extend(MEMORY_SYSFILES.iter().map(|f| InventoryStep::from(sysfile_line(f, out))));

    // CPU
    cmds.push(separator(out).into());
    cmds.push(InventoryStep::creating(
        Invocation::new(format!(
            r"lscpu | tee {LSCPU_LOG} | egrep 'family|Model|Step|(Socket|Core|Thread)\(' >> {out}"
        )),
        LSCPU_LOG,
    ));
    if s.msr {
        for m in &s.msrs {
            cmds.push(
                Invocation::new(format!("echo \"MSR {m:>5}:\t$(sudo {}/msr.py {m})\" >> {out}", ctx.pmu_tools))
                    .into(),
            );
        }
    }
    if s.cpuid {
        cmds.push(InventoryStep::creating(
            Invocation::new(format!(
                "cpuid -1 > {CPUID_LOG} && cpuid -1r | tee -a {CPUID_LOG} | grep ' 0x00000001' >> {out}"
            )),
            CPUID_LOG,
        ));
    }
    cmds.push(InventoryStep::creating(
        Invocation::new(format!(
            "dmesg -T | tee {DMESG_LOG} | {} >> {out} && {} | tail -1 >> {out}",
            grep_or_true("Performance E|micro", ""),
            grep_or_true("BIOS ", DMESG_LOG)
        )),
        DMESG_LOG,
    ));

    // PMU
    cmds.push(separator(out).into());
    cmds.push(Invocation::new(format!("echo \"PMU: {}\" >> {out}", caps.pmu_name)).into());
    cmds.push(Invocation::new(format!("{} --version >> {out}", ctx.perf)).into());
    cmds.extend(PERF_SYSFILES.iter().map(|f| InventoryStep::from(sysfile_line(f, out))));
    let mux = format!("/sys/devices/{}/perf_event_mux_interval_ms", caps.pmu_prefix());
    cmds.push(sysfile_line(&mux, out).into());
    cmds.push(Invocation::new(format!("echo \"perfdo version: {}\" >> {out}", env!("CARGO_PKG_VERSION"))).into());

    // Memory
    cmds.push(separator(out).into());
    if s.numactl {
        cmds.push(Invocation::new(format!("numactl -H >> {out}")).into());
    }

    // Devices
    cmds.push(separator(out).into());
    cmds.push(InventoryStep::creating(
        Invocation::new(format!("lsmod | tee {LSMOD_LOG} | egrep 'Module|kvm' >> {out}")),
        LSMOD_LOG,
    ));
    cmds.push(InventoryStep::creating(Invocation::new(format!("ulimit -a > {ULIMIT_LOG}")), ULIMIT_LOG));
    if s.dmidecode {
        cmds.push(InventoryStep::creating(Invocation::new(format!("sudo dmidecode > {MEMORY_LOG}")), MEMORY_LOG));
    }
    cmds
}
