//! Small domain newtypes shared across the pipeline.

use std::fmt;

/// Characters removed from flag strings before they become part of a file name.
pub const STRIPPED_CHARS: &[char] = &[' ', ':', '/', ',', '='];

/// Base identifier every artifact name of a run starts with.
///
/// Derived from the workload command and, for generated workloads, the
/// iteration count. Runs without a named workload share `run-default`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseName(String);

impl BaseName {
    pub const DEFAULT: &'static str = "run-default";

    /// Build the base identifier for a workload command.
    ///
    /// The program path is reduced to its file name, arguments are joined with
    /// `-`, and the result is cleared of [`STRIPPED_CHARS`].
    #[must_use]
    pub fn from_workload(app: Option<&str>, iterations: Option<&str>) -> Self {
        let Some(app) = app.map(str::trim).filter(|a| !a.is_empty()) else {
            return Self(Self::DEFAULT.to_string());
        };

        let mut tokens = app.split_whitespace();
        let program = tokens.next().unwrap_or(app);
        let program = std::path::Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(program);

        let mut name = std::iter::once(program)
            .chain(tokens)
            .collect::<Vec<_>>()
            .join("-")
            .replace(STRIPPED_CHARS, "");
        if let Some(n) = iterations {
            name.push('-');
            name.push_str(n);
        }
        Self(name)
    }

    /// Wrap an already-formed identifier without any normalization.
    #[must_use]
    pub fn raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl fmt::Display for BaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
