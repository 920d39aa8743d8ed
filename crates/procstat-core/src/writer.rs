//! Atomic replacement of the textfile collector output.
//!
//! Content is written to a temporary file in the target directory and renamed
//! over the target, so a concurrent reader sees either the old or the new file,
//! never a partial one. On failure the temporary file is removed and the
//! existing output is left untouched.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::exposition::OUTPUT_FILE_NAME;

/// Error type for output write failures.
#[derive(Debug)]
pub enum WriteError {
    /// The temporary file could not be created or written.
    Temp(io::Error),
    /// The rename over the target failed.
    Persist(io::Error),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Temp(e) => write!(f, "failed to write temporary file: {}", e),
            WriteError::Persist(e) => write!(f, "failed to replace output file: {}", e),
        }
    }
}

impl std::error::Error for WriteError {}

/// Writes rendered metrics to `<dir>/procstats.prom`.
#[derive(Debug, Clone)]
pub struct TextfileWriter {
    dir: PathBuf,
    target: PathBuf,
}

impl TextfileWriter {
    /// Creates a writer for the default file name inside `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_file_name(dir, OUTPUT_FILE_NAME)
    }

    pub fn with_file_name(dir: impl Into<PathBuf>, file_name: &str) -> Self {
        let dir = dir.into();
        let target = dir.join(file_name);
        Self { dir, target }
    }

    /// Creates the output directory if it does not exist.
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically replaces the target with `content`.
    pub fn write(&self, content: &str) -> Result<(), WriteError> {
        // Same directory as the target so the rename never crosses filesystems.
        // Dot prefix: the textfile collector only reads `*.prom`.
        let mut tmp = tempfile::Builder::new()
            .prefix(".procstats")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(WriteError::Temp)?;

        write_content(&mut tmp, content).map_err(WriteError::Temp)?;

        // Dropping `tmp` on the error path removes the temporary file
        tmp.persist(&self.target)
            .map_err(|e| WriteError::Persist(e.error))?;
        Ok(())
    }
}

fn write_content(tmp: &mut NamedTempFile, content: &str) -> io::Result<()> {
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;

    // tempfile creates files as 0600; the node exporter usually runs as
    // another user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    Ok(())
}
