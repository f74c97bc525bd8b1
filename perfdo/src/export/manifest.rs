use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::capability::Capabilities;
use crate::pipeline::orchestrator::RunReport;
use crate::pipeline::{ArtifactLedger, StageMask};

/// Everything one run produced and how it went.
#[derive(Debug, Serialize)]
pub struct RunManifest<'a> {
    /// Run identifier shared by all artifact names
    base: &'a str,
    /// Stage mask as given, in hex
    mask: String,
    version: &'static str,
    capabilities: &'a Capabilities,
    #[serde(flatten)]
    report: &'a RunReport,
    artifacts: &'a ArtifactLedger,
}

impl<'a> RunManifest<'a> {
    #[must_use]
    pub fn new(
        base: &'a str,
        mask: StageMask,
        capabilities: &'a Capabilities,
        report: &'a RunReport,
        artifacts: &'a ArtifactLedger,
    ) -> Self {
        Self {
            base,
            mask: format!("0x{mask:x}"),
            version: env!("CARGO_PKG_VERSION"),
            capabilities,
            report,
            artifacts,
        }
    }

    /// Write the manifest as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails
    pub fn export<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self).context("Failed to write run manifest")?;
        Ok(())
    }

    /// Write the manifest to `path`, replacing an earlier one.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.export(&mut writer)?;
        writer.flush().with_context(|| format!("Failed to flush {}", path.display()))
    }
}
