//! Branch-record (LBR) and PEBS post-processing chains
//!
//! One decoded event stream feeds several consumers at once: the loop
//! tracker, the basic-block hit counter and the two instruction-mix
//! histograms. The consumers themselves (`lbr_stats`, `loop_stats`, `ptage`,
//! `addrbits`) are external filters from the tools directory.
//!
//! ```text
//! perf script --xed ─┬─► lbr_stats ─────────────► <data>.info.log
//!                    ├─► sort|uniq ─► hitcounts ─► <data>.ips.log
//!                    ├─► opcodes ───────────────► <base>.perf-imix-no.log
//!                    └─► instructions ──────────► <base>.perf-imix.log
//! ```

use crate::context::RunContext;
use crate::pipeline::artifact::derived_log;
use crate::pipeline::shell::{grep_or_true, Pipeline, SORT_UNIQ};

pub struct DecoderPipeline<'a> {
    ctx: &'a RunContext,
}

impl<'a> DecoderPipeline<'a> {
    #[must_use]
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    fn perf(&self) -> &str {
        &self.ctx.perf
    }

    /// `sort | uniq -c | sort -n | ptage`
    #[must_use]
    pub fn sort_to_percent(&self) -> String {
        format!("{SORT_UNIQ} | {}", self.ctx.tool("ptage"))
    }

    /// Decoded branch-record stream, optionally restricted to one process.
    #[must_use]
    pub fn decoded_stream(&self, data: &str, comm: Option<&str>) -> String {
        let mut cmd = format!("{} script -i {data} -F +brstackinsn --xed", self.perf());
        if let Some(comm) = comm {
            cmd.push_str(&format!(" -c {comm}"));
        }
        cmd
    }

    fn lbr_stats(&self, args: &str) -> String {
        format!("{} {args}", self.ctx.tool("lbr_stats"))
    }

    /// Query for the process with the most samples: `<count> <comm>`, field 1.
    #[must_use]
    pub fn dominant_process_query(&self, data: &str) -> String {
        format!("{} script -i {data} -F comm | {SORT_UNIQ} | tail -1", self.perf())
    }

    /// Branch statistics summary written to the info log.
    #[must_use]
    pub fn branch_statistics(&self, data: &str, info: &str) -> Pipeline {
        Pipeline::new(format!("{} report -i {data}", self.perf()))
            .pipe("grep -A11 'Branch Statistics:'")
            .tee(info)
    }

    /// Counting summary lines copied into the info log.
    #[must_use]
    pub fn counting_summary(stat_log: &str, info: &str) -> Pipeline {
        Pipeline::new(format!("egrep '  branches|instructions' {stat_log}")).append_to(info)
    }

    /// Command shown to the user for browsing LBR statistics by hand.
    #[must_use]
    pub fn lbr_stats_hint(&self, data: &str, comm: &str) -> String {
        format!("{} | {}", self.decoded_stream(data, Some(comm)), self.lbr_stats(&self.ctx.settings.lbr_stats_tk))
    }

    /// The fan-out producing loop stats, hit counts and both instruction mixes.
    #[must_use]
    pub fn instruction_mix(&self, data: &str, comm: &str, info: &str) -> Pipeline {
        let namer = &self.ctx.namer;
        let loops = derived_log(data, "loops");
        let hits = derived_log(data, "hitcounts");
        let ips = derived_log(data, "ips");
        let sort2up = self.sort_to_percent();

        let loop_tracker = Pipeline::new(format!(
            "LBR_LOOPS_LOG={loops} {}",
            self.lbr_stats(&self.ctx.settings.lbr_stats_tk)
        ))
        .append_to(info);

        let hit_counter = Pipeline::new("sort|uniq -c|sort -k2")
            .tee(hits)
            .pipe("cut -f-2")
            .pipe("sort -nu")
            .pipe(self.ctx.tool("ptage"))
            .write_to(ips);

        let opcodes = Pipeline::new("cut -d' ' -f1").pipe(&sort2up).write_to(namer.imix_no_operands_log());

        Pipeline::new(self.decoded_stream(data, Some(comm)))
            .fan_out(loop_tracker)
            .pipe(r"egrep '^\s[0f7]'")
            .pipe(r"sed 's/#.*//;s/^\s*//;s/\s*$//'")
            .fan_out(hit_counter)
            .pipe("cut -f4-")
            .fan_out(opcodes)
            .pipe(sort2up)
            .tee(namer.imix_log())
            .pipe("tail")
    }

    /// `tail -<rank> <loops> | head -1`: the loop listed `rank` lines from the bottom.
    #[must_use]
    pub fn loop_selector_query(data: &str, rank: u32) -> String {
        let loops = derived_log(data, "loops");
        if rank > 1 {
            format!("tail -{rank} {loops} | head -1")
        } else {
            format!("tail -1 {loops}")
        }
    }

    /// Loop statistics for each selector, all from one decoded pass.
    ///
    /// Every selector but the last gets its own tee branch; the last consumes
    /// the main stream.
    #[must_use]
    pub fn loop_stats(&self, data: &str, comm: &str, selectors: &[String], info: &str) -> Pipeline {
        let loop_stats = self.ctx.tool("loop_stats");
        let mut pipeline = Pipeline::new(self.decoded_stream(data, Some(comm)));
        let Some((last, branches)) = selectors.split_last() else {
            return pipeline;
        };
        for sel in branches {
            pipeline = pipeline.fan_out(Pipeline::new(format!("{loop_stats} {sel}")).append_to(info));
        }
        pipeline.pipe(format!("{loop_stats} {last}")).append_to(info)
    }

    /// The hottest IP at `rank` (1 = hottest) in a percentage listing.
    #[must_use]
    pub fn ip_rank_query(ips: &str, rank: u32) -> String {
        format!("egrep '^[0-9]' {ips} | tail -{} | head -1", rank + 1)
    }

    /// The single next-hottest IP in a percentage listing.
    #[must_use]
    pub fn next_hottest_query(ips: &str) -> String {
        format!("tail -2 {ips} | head -1")
    }

    /// General stats pass over the sampled event, appended to the IP log.
    #[must_use]
    pub fn event_stats_pass(&self, data: &str, comm: Option<&str>, ips: &str) -> Pipeline {
        Pipeline::new(self.decoded_stream(data, comm))
            .pipe(self.lbr_stats(&self.ctx.settings.lbr_stats))
            .tee_append(ips)
    }

    /// Stats pass restricted to one instruction pointer.
    #[must_use]
    pub fn ip_stats_pass(&self, data: &str, comm: Option<&str>, ip: &str, ips: &str) -> Pipeline {
        Pipeline::new(self.decoded_stream(data, comm)).pipe(self.lbr_stats(ip)).tee_append(ips)
    }

    /// One decoded pass feeding both the single-IP stats and the general stats.
    #[must_use]
    pub fn combined_ip_pass(&self, data: &str, comm: Option<&str>, ip: &str, ips: &str) -> Pipeline {
        Pipeline::new(self.decoded_stream(data, comm))
            .fan_out(Pipeline::new(self.lbr_stats(ip)).tee_append(ips))
            .pipe(self.lbr_stats(&self.ctx.settings.lbr_stats))
            .tee_append(ips)
    }

    /// Top modules of a PEBS profile.
    #[must_use]
    pub fn pebs_modules(&self, data: &str) -> Pipeline {
        Pipeline::new(format!("{} report -i {data} --stdio -F overhead,comm,dso", self.perf()))
            .tee(derived_log(data, "modules"))
            .pipe("grep -A12 Overhead")
    }

    /// Percentage listing of sampled instruction pointers.
    #[must_use]
    pub fn ip_histogram(&self, data: &str) -> Pipeline {
        Pipeline::new(format!("{} script -i {data} -F ip", self.perf()))
            .pipe(self.sort_to_percent())
            .tee(derived_log(data, "ips"))
            .pipe("tail -11")
    }

    /// DSB set histogram from the address bits below `msb`.
    #[must_use]
    pub fn dsb_sets(&self, data: &str, msb: u8) -> Pipeline {
        Pipeline::new(format!("{} script -i {data} -F ip", self.perf()))
            .pipe(format!("{} {msb} 6", self.ctx.tool("addrbits")))
            .pipe(self.sort_to_percent())
            .tee(derived_log(data, "dsb-sets"))
            .pipe("tail -11")
    }

    /// Show the hottest loops and the rest of the info log.
    #[must_use]
    pub fn info_summary(info: &str) -> String {
        format!("{} && tail {info}", grep_or_true("code footprint", info))
    }
}

/// Drop the trailing separator captured with a loop selector.
#[must_use]
pub fn trim_selector(field: &str) -> String {
    let mut chars = field.chars();
    chars.next_back();
    chars.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::cli::Args;
    use crate::pipeline::mask::StageMask;
    use crate::pipeline::shell::Segment;
    use clap::Parser;

    fn ctx() -> RunContext {
        let args = Args::parse_from(["perfdo", "profile", "-a", "./app"]);
        RunContext::from_args(&args, StageMask::DEFAULT, &Capabilities::unknown()).unwrap()
    }

    #[test]
    fn test_instruction_mix_shape() {
        let ctx = ctx();
        let p = DecoderPipeline::new(&ctx).instruction_mix("app.perf.data", "app", "app.perf.data.info.log");

        assert_eq!(p.source(), "perf script -i app.perf.data -F +brstackinsn --xed -c app");
        assert_eq!(p.branches().count(), 3);
        assert!(p.needs_bash());
        let outputs = p.outputs();
        for expected in [
            "app.perf.data.info.log",
            "app.perf.data.hitcounts.log",
            "app.perf.data.ips.log",
            "app.perf-imix-no.log",
            "app.perf-imix.log",
        ] {
            assert!(outputs.contains(&expected), "missing {expected}");
        }
        assert!(p.render().starts_with("bash -c \"perf script"));
    }

    #[test]
    fn test_loop_stats_one_branch_per_extra_selector() {
        let ctx = ctx();
        let selectors = vec!["0x401000".to_string(), "0x402000".to_string(), "0x403000".to_string()];
        let p = DecoderPipeline::new(&ctx).loop_stats("d", "app", &selectors, "info");

        assert_eq!(p.branches().count(), 2);
        assert_eq!(
            p.segments().last(),
            Some(&Segment::AppendTo("info".to_string()))
        );
        assert!(p.render_inner().contains("| ./loop_stats 0x403000 >> info"));
    }

    #[test]
    fn test_loop_stats_single_selector_is_linear() {
        let ctx = ctx();
        let p = DecoderPipeline::new(&ctx).loop_stats("d", "app", &["0x1".to_string()], "info");
        assert!(!p.needs_bash());
    }

    #[test]
    fn test_queries() {
        assert_eq!(DecoderPipeline::ip_rank_query("d.ips.log", 2), "egrep '^[0-9]' d.ips.log | tail -3 | head -1");
        assert_eq!(DecoderPipeline::loop_selector_query("d", 3), "tail -3 d.loops.log | head -1");
        assert_eq!(DecoderPipeline::loop_selector_query("d", 1), "tail -1 d.loops.log");
    }

    #[test]
    fn test_combined_ip_pass_fans_out() {
        let ctx = ctx();
        let p = DecoderPipeline::new(&ctx).combined_ip_pass("d", None, "0x4010", "d.ips.log");
        assert_eq!(p.branches().count(), 1);
        assert_eq!(p.outputs(), vec!["d.ips.log", "d.ips.log"]);
    }

    #[test]
    fn test_dsb_sets() {
        let ctx = ctx();
        let p = DecoderPipeline::new(&ctx).dsb_sets("d", 10);
        assert_eq!(p.segments()[0], Segment::Filter("./addrbits 10 6".to_string()));
        assert_eq!(p.outputs(), vec!["d.dsb-sets.log"]);
    }

    #[test]
    fn test_trim_selector() {
        assert_eq!(trim_selector("0x401000:"), "0x401000");
        assert_eq!(trim_selector(""), "");
    }
}
