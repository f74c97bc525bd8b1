//! Command history file
//!
//! Every command a run issues is appended to `.<base>.cmd`, so a run can be
//! replayed or audited later. A history left behind by an earlier run is moved
//! aside to `.<base>-<pid>.cmd` instead of being overwritten.

use log::info;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct CommandHistory {
    path: PathBuf,
    file: File,
}

impl CommandHistory {
    /// Open a fresh history at `path` and write the header comment.
    ///
    /// # Errors
    /// Returns an error if the previous history cannot be renamed or the new
    /// one cannot be created
    pub fn create(path: impl Into<PathBuf>, header: &str) -> io::Result<Self> {
        let path = path.into();
        if path.exists() {
            let aside = aside_path(&path, std::process::id());
            info!("Moving previous command history to {}", aside.display());
            fs::rename(&path, &aside)?;
        }

        let mut file = File::create(&path)?;
        writeln!(file, "# {header}")?;
        Ok(Self { path, file })
    }

    /// Append one command line.
    ///
    /// # Errors
    /// Returns an error if the write fails
    pub fn append(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{line}")?;
        self.file.flush()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `.<base>.cmd` → `.<base>-<pid>.cmd`
fn aside_path(path: &Path, pid: u32) -> PathBuf {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or(".run.cmd");
    let stem = name.strip_suffix(".cmd").unwrap_or(name);
    path.with_file_name(format!("{stem}-{pid}.cmd"))
}
