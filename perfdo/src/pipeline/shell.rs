//! Structured shell pipelines
//!
//! Stage builders compose commands as a source followed by an ordered list of
//! segments instead of splicing strings. Only [`Pipeline::render`] produces
//! shell text, so tests can assert on the pipeline shape.
//!
//! ```text
//! source | filter | tee out.log | tee >(branch > side.log) | filter >> info.log
//! ```

use std::fmt::Write as _;

/// One step after the pipeline source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `| <command>`
    Filter(String),
    /// `| tee <path>`
    Tee(String),
    /// `| tee -a <path>`
    TeeAppend(String),
    /// `| tee >(<pipeline>)`: a second consumer of the same stream
    FanOut(Pipeline),
    /// `> <path>`, terminal
    WriteTo(String),
    /// `>> <path>`, terminal
    AppendTo(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    source: String,
    segments: Vec<Segment>,
}

impl Pipeline {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), segments: Vec::new() }
    }

    #[must_use]
    pub fn pipe(mut self, filter: impl Into<String>) -> Self {
        self.segments.push(Segment::Filter(filter.into()));
        self
    }

    #[must_use]
    pub fn tee(mut self, path: impl Into<String>) -> Self {
        self.segments.push(Segment::Tee(path.into()));
        self
    }

    #[must_use]
    pub fn tee_append(mut self, path: impl Into<String>) -> Self {
        self.segments.push(Segment::TeeAppend(path.into()));
        self
    }

    #[must_use]
    pub fn fan_out(mut self, branch: Pipeline) -> Self {
        self.segments.push(Segment::FanOut(branch));
        self
    }

    #[must_use]
    pub fn write_to(mut self, path: impl Into<String>) -> Self {
        self.segments.push(Segment::WriteTo(path.into()));
        self
    }

    #[must_use]
    pub fn append_to(mut self, path: impl Into<String>) -> Self {
        self.segments.push(Segment::AppendTo(path.into()));
        self
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Direct fan-out branches, in stream order.
    pub fn branches(&self) -> impl Iterator<Item = &Pipeline> {
        self.segments.iter().filter_map(|s| match s {
            Segment::FanOut(p) => Some(p),
            _ => None,
        })
    }

    /// Files written by `tee`, `tee -a` or redirection anywhere in the pipeline.
    #[must_use]
    pub fn outputs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for seg in &self.segments {
            match seg {
                Segment::Tee(p) | Segment::TeeAppend(p) | Segment::WriteTo(p) | Segment::AppendTo(p) => {
                    out.push(p.as_str());
                }
                Segment::FanOut(branch) => out.extend(branch.outputs()),
                Segment::Filter(_) => {}
            }
        }
        out
    }

    /// Process substitution needs bash rather than `sh`.
    #[must_use]
    pub fn needs_bash(&self) -> bool {
        self.branches().next().is_some()
    }

    /// Shell text without the `bash -c` wrapper.
    #[must_use]
    pub fn render_inner(&self) -> String {
        let mut out = self.source.trim().to_string();
        for seg in &self.segments {
            match seg {
                Segment::Filter(f) => {
                    let _ = write!(out, " | {}", f.trim());
                }
                Segment::Tee(p) => {
                    let _ = write!(out, " | tee {p}");
                }
                Segment::TeeAppend(p) => {
                    let _ = write!(out, " | tee -a {p}");
                }
                Segment::FanOut(branch) => {
                    let _ = write!(out, " | tee >({})", branch.render_inner());
                }
                Segment::WriteTo(p) => {
                    let _ = write!(out, " > {p}");
                }
                Segment::AppendTo(p) => {
                    let _ = write!(out, " >> {p}");
                }
            }
        }
        out
    }

    /// Final command text, wrapped in `bash -c "..."` when fan-out is used.
    #[must_use]
    pub fn render(&self) -> String {
        let inner = self.render_inner();
        if self.needs_bash() {
            format!("bash -c \"{}\"", inner.replace('"', "\\\""))
        } else {
            inner
        }
    }
}

/// `egrep` that never fails the pipeline when nothing matches.
#[must_use]
pub fn grep_or_true(pattern: &str, file: &str) -> String {
    format!("(egrep '{pattern}' {file} || true)")
}

/// Count identical lines, least frequent first.
pub const SORT_UNIQ: &str = "sort | uniq -c | sort -n";
