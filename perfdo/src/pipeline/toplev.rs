//! Topdown analysis invocations
//!
//! Builds `toplev.py` command lines for the four topdown stages. Building is
//! pure: the orchestrator decides what to pipe the output through and when to
//! dispatch it.

use crate::capability::Capabilities;
use crate::context::{RunContext, DEFAULT_TOPLEV_ARGS};
use crate::pipeline::artifact::toplev_csv;

/// Node set of the auto-drilldown pass.
pub const DRILLDOWN_NODES: &str = "+IPC,+Heavy_Operations,+Time";

/// Keeps the bottleneck lines of a full breakdown.
pub const BOTTLENECK_FILTER: &str = "egrep '<==|MUX|Info.Bott' | sort";

/// Drops toplev's progress chatter from the drilldown output.
pub const DRILLDOWN_NOISE_FILTER: &str = r#"egrep -v "^(Run toplev|Add|Using|Sampling|perf record)" "#;

const NONZERO_FILTER: &str = r"egrep -iv '^((FE|BE|BAD|RET).*[ \-][10]\.. |Info.* 0\.0[01]? |RUN|Add)|not (found|supported)|##placeholder##' ";

/// Drops near-zero nodes; below verbosity 2 also drops the below-threshold markers.
#[must_use]
pub fn nonzero_filter(verbose: u8) -> String {
    if verbose < 2 {
        NONZERO_FILTER.replace("##placeholder##", r" < [\[\+]|<$")
    } else {
        NONZERO_FILTER.to_string()
    }
}

/// Verbosity-independent non-zero filter, suggested for browsing the no-multiplex log.
#[must_use]
pub fn nonzero_filter_all() -> &'static str {
    NONZERO_FILTER
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToplevVariant {
    /// All levels, full detail
    Full,
    /// The first N levels
    Levels(u32),
    /// Automatic drilldown with sampling of the critical node
    Drilldown,
    /// Full detail without counter multiplexing
    NoMultiplex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToplevInvocation {
    pub command: String,
    pub log: String,
    pub csv: String,
}

pub struct ToplevStageBuilder<'a> {
    ctx: &'a RunContext,
    caps: &'a Capabilities,
}

impl<'a> ToplevStageBuilder<'a> {
    #[must_use]
    pub fn new(ctx: &'a RunContext, caps: &'a Capabilities) -> Self {
        Self { ctx, caps }
    }

    /// `[PERF=<perf> ]<pmu-tools>/toplev.py --no-desc[ --cputype=core]`
    #[must_use]
    pub fn tool(&self) -> String {
        let mut tool = String::new();
        if self.ctx.custom_perf() {
            tool.push_str(&format!("PERF={} ", self.ctx.perf));
        }
        tool.push_str(&self.ctx.pmu_tools);
        tool.push_str("/toplev.py --no-desc");
        if self.caps.core_type_selectable() && self.ctx.settings.core {
            tool.push_str(" --cputype=core");
        }
        tool
    }

    fn variant_flags(&self, variant: ToplevVariant) -> String {
        let full = &self.ctx.settings.toplev_full;
        match variant {
            ToplevVariant::Full => full.clone(),
            ToplevVariant::Levels(n) => format!("-vl{n}"),
            ToplevVariant::Drilldown => "--drilldown --show-sample -l1".to_string(),
            ToplevVariant::NoMultiplex => format!("{full} --no-multiplex"),
        }
    }

    /// Node set a variant requests by default.
    #[must_use]
    pub fn nodes(&self, variant: ToplevVariant) -> String {
        let s = &self.ctx.settings;
        match variant {
            ToplevVariant::Full | ToplevVariant::Levels(_) => s.nodes.clone(),
            ToplevVariant::Drilldown => DRILLDOWN_NODES.to_string(),
            ToplevVariant::NoMultiplex => format!("{},{}", s.nodes, s.extra_metrics),
        }
    }

    /// User pass-through arguments for a variant.
    #[must_use]
    pub fn user_args(&self, variant: ToplevVariant) -> String {
        let args = &self.ctx.toplev_args;
        match variant {
            ToplevVariant::Levels(_) => format!("{args} -r{}", self.ctx.settings.repeat),
            ToplevVariant::Drilldown if args == DEFAULT_TOPLEV_ARGS => String::new(),
            _ => args.clone(),
        }
    }

    /// Command and output paths for a variant with explicit nodes and arguments.
    #[must_use]
    pub fn build(&self, variant: ToplevVariant, nodes: &str, user_args: &str) -> ToplevInvocation {
        let flags = self.variant_flags(variant);
        let tag = if variant == ToplevVariant::NoMultiplex { "-nomux" } else { "" };
        let first = flags.split_whitespace().next().unwrap_or_default();
        let log = self.ctx.namer.toplev_log(first, tag);
        let csv = toplev_csv(&log);
        let command = format!(
            "{} {flags} --nodes '{nodes}' -V {csv} {user_args} -- {}",
            self.tool(),
            self.ctx.settings.run
        );
        ToplevInvocation { command, log, csv }
    }

    /// Command with the variant's default nodes and arguments.
    #[must_use]
    pub fn invocation(&self, variant: ToplevVariant) -> ToplevInvocation {
        self.build(variant, &self.nodes(variant), &self.user_args(variant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Microarch;
    use crate::cli::Args;
    use crate::pipeline::mask::StageMask;
    use clap::Parser;

    fn ctx(extra: &[&str], caps: &Capabilities) -> RunContext {
        let args = Args::parse_from(["perfdo", "profile", "-a", "./app"].iter().chain(extra.iter()));
        RunContext::from_args(&args, StageMask::DEFAULT, caps).unwrap()
    }

    #[test]
    fn test_full_variant() {
        let caps = Capabilities::unknown();
        let ctx = ctx(&[], &caps);
        let inv = ToplevStageBuilder::new(&ctx, &caps).invocation(ToplevVariant::Full);
        assert_eq!(inv.log, "app.toplev-vl6.log");
        assert_eq!(inv.csv, "app.toplev-vl6-perf.csv");
        assert!(inv.command.starts_with("python3 ./pmu-tools/toplev.py --no-desc -vl6 --nodes '+CoreIPC,"));
        assert!(inv.command.ends_with("-V app.toplev-vl6-perf.csv --metric-group +Summary -- ./app"));
    }

    #[test]
    fn test_levels_variant_repeats() {
        let caps = Capabilities::unknown();
        let ctx = ctx(&[], &caps);
        let inv = ToplevStageBuilder::new(&ctx, &caps).invocation(ToplevVariant::Levels(2));
        assert_eq!(inv.log, "app.toplev-vl2.log");
        assert!(inv.command.contains("--metric-group +Summary -r3 -- ./app"));
    }

    #[test]
    fn test_drilldown_drops_default_args() {
        let caps = Capabilities::unknown();
        let ctx = ctx(&[], &caps);
        let inv = ToplevStageBuilder::new(&ctx, &caps).invocation(ToplevVariant::Drilldown);
        assert_eq!(inv.log, "app.toplev--drilldown.log");
        assert!(inv.command.contains("--nodes '+IPC,+Heavy_Operations,+Time'"));
        assert!(!inv.command.contains("Summary"));

        let ctx = self::ctx(&["--toplev-args", "-l3"], &caps);
        let inv = ToplevStageBuilder::new(&ctx, &caps).invocation(ToplevVariant::Drilldown);
        assert!(inv.command.contains(" -l3 -- ./app"));
    }

    #[test]
    fn test_no_multiplex_variant() {
        let caps = Capabilities::unknown();
        let ctx = ctx(&[], &caps);
        let inv = ToplevStageBuilder::new(&ctx, &caps).invocation(ToplevVariant::NoMultiplex);
        assert_eq!(inv.log, "app.toplev-vl6-nomux.log");
        assert!(inv.command.contains("-vl6 --no-multiplex"));
        assert!(inv.command.contains(",+Mispredictions,+IpTB,"));
    }

    #[test]
    fn test_hybrid_and_custom_perf() {
        let caps = Capabilities::for_microarch(Microarch::AlderlakeHybrid);
        let ctx = ctx(&["--perf", "/opt/perf"], &caps);
        let tool = ToplevStageBuilder::new(&ctx, &caps).tool();
        assert_eq!(tool, "PERF=/opt/perf python3 ./pmu-tools/toplev.py --no-desc --cputype=core");
    }

    #[test]
    fn test_nonzero_filter_by_verbosity() {
        assert!(nonzero_filter(0).contains(r" < [\[\+]|<$"));
        assert!(nonzero_filter(2).contains("##placeholder##"));
    }
}
