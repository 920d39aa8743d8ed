//! Abstractions over the operating system so the sampler can run against
//! fixtures.
//!
//! `FileSystem` hides `/proc` access, `ProcessSource` is the per-process view
//! built on top of it, and `GpuSource` hides the `nvidia-smi` invocation.

use std::io;
use std::path::{Path, PathBuf};

use crate::collector::gpu::{GpuProcessMap, GpuQueryError};
use crate::collector::procfs::{CollectError, ProcessDetail};

/// Abstraction for filesystem operations.
///
/// This trait allows collectors to read from the real filesystem or from
/// a mock implementation for testing purposes.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    ///
    /// # Returns
    /// A vector of paths to entries in the directory, or an I/O error.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
///
/// Use this in production to read from the actual `/proc` filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}

/// Source of per-process raw metrics.
pub trait ProcessSource {
    /// Lists the pids currently present in the process table.
    fn enumerate_processes(&self) -> Result<Vec<u32>, CollectError>;

    /// Reads raw counters for one process.
    ///
    /// Returns `CollectError::ProcessGone` if the process exited after it was
    /// enumerated.
    fn read_process_detail(&self, pid: u32) -> Result<ProcessDetail, CollectError>;
}

/// Source of per-process GPU usage.
pub trait GpuSource {
    /// Queries per-process GPU usage keyed by pid.
    fn query_gpu_processes(&mut self) -> Result<GpuProcessMap, GpuQueryError>;
}

/// GPU source used when GPU collection is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGpu;

impl GpuSource for NoGpu {
    fn query_gpu_processes(&mut self) -> Result<GpuProcessMap, GpuQueryError> {
        Err(GpuQueryError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_real_fs_read_to_string() {
        let fs = RealFs::new();
        // Cargo runs unit tests from the package root
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        let content = fs.read_to_string(&cargo_toml).unwrap();
        assert!(content.contains("procstat-core"));
    }

    #[test]
    fn test_real_fs_exists() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        assert!(fs.exists(&cargo_toml));
        assert!(!fs.exists(Path::new("/nonexistent/path/12345")));
    }

    #[test]
    fn test_real_fs_read_dir() {
        let fs = RealFs::new();
        let src_dir = env::current_dir().unwrap().join("src");
        let entries = fs.read_dir(&src_dir).unwrap();
        assert!(entries.iter().any(|p| p.ends_with("lib.rs")));
    }

    #[test]
    fn test_no_gpu_is_disabled() {
        let mut gpu = NoGpu;
        assert!(matches!(
            gpu.query_gpu_processes(),
            Err(GpuQueryError::Disabled)
        ));
    }
}
