//! `GpuSource` backed by the `nvidia-smi` command line tool.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::collector::gpu::{GpuProcessMap, GpuQueryError, merge, parse_compute_apps, parse_pmon};
use crate::collector::traits::GpuSource;

/// Default timeout of a single `nvidia-smi` invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const PMON_ARGS: &[&str] = &["pmon", "-s", "u", "-c", "1"];
const COMPUTE_APPS_ARGS: &[&str] = &[
    "--query-compute-apps=pid,used_memory,gpu_index",
    "--format=csv,noheader,nounits",
];

/// Queries per-process GPU usage by running `nvidia-smi`.
///
/// Once the binary is found to be missing the source stops spawning it and
/// reports `GpuQueryError::NotInstalled` on every call.
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    binary: PathBuf,
    timeout: Duration,
    installed: bool,
}

impl Default for NvidiaSmi {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl NvidiaSmi {
    /// Creates a source that runs `nvidia-smi` from `PATH`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_binary("nvidia-smi", timeout)
    }

    /// Creates a source that runs the given binary.
    pub fn with_binary(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            installed: true,
        }
    }

    /// Returns false once the binary has been found missing.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    fn run(&mut self, args: &[&str]) -> Result<String, GpuQueryError> {
        let result = run_with_timeout(&self.binary, args, self.timeout);
        if matches!(result, Err(GpuQueryError::NotInstalled)) {
            self.installed = false;
        }
        result
    }
}

impl GpuSource for NvidiaSmi {
    fn query_gpu_processes(&mut self) -> Result<GpuProcessMap, GpuQueryError> {
        if !self.installed {
            return Err(GpuQueryError::NotInstalled);
        }

        let pmon = self.run(PMON_ARGS);
        if matches!(pmon, Err(GpuQueryError::NotInstalled)) {
            return Err(GpuQueryError::NotInstalled);
        }
        let apps = self.run(COMPUTE_APPS_ARGS);

        match (pmon, apps) {
            (Err(e), Err(_)) => Err(e),
            (pmon, apps) => {
                let pmon_rows = match pmon {
                    Ok(out) => parse_pmon(&out),
                    Err(e) => {
                        debug!("nvidia-smi pmon failed: {}", e);
                        Vec::new()
                    }
                };
                let app_rows = match apps {
                    Ok(out) => parse_compute_apps(&out),
                    Err(e) => {
                        debug!("nvidia-smi query-compute-apps failed: {}", e);
                        Vec::new()
                    }
                };
                Ok(merge(&pmon_rows, &app_rows))
            }
        }
    }
}

/// Runs a program and returns its stdout, killing it after `timeout`.
///
/// A missing program maps to `GpuQueryError::NotInstalled`, a non-zero exit
/// to `GpuQueryError::Failed`.
pub fn run_with_timeout(
    program: impl AsRef<std::ffi::OsStr>,
    args: &[&str],
    timeout: Duration,
) -> Result<String, GpuQueryError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => GpuQueryError::NotInstalled,
            _ => GpuQueryError::Io(e),
        })?;

    // Drained on a separate thread so a chatty child never blocks on a full pipe.
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| GpuQueryError::Io(io::Error::other("child stdout not captured")))?;
    let reader = thread::spawn(move || -> io::Result<String> {
        let mut buf = String::new();
        stdout.read_to_string(&mut buf)?;
        Ok(buf)
    });

    let deadline = Instant::now() + timeout;
    loop {
        let exited = match child.try_wait() {
            Ok(exited) => exited,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GpuQueryError::Io(e));
            }
        };
        if let Some(status) = exited {
            let output = reader
                .join()
                .map_err(|_| GpuQueryError::Io(io::Error::other("stdout reader panicked")))??;
            if !status.success() {
                return Err(GpuQueryError::Failed(status.to_string()));
            }
            return Ok(output);
        }

        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GpuQueryError::Timeout(timeout));
        }

        thread::sleep(POLL_INTERVAL);
    }
}
