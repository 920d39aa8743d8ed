//! Per-process NVIDIA GPU usage via `nvidia-smi`.
//!
//! Two queries are merged per `(pid, gpu)`: `pmon` provides SM and memory
//! utilization, `--query-compute-apps` provides framebuffer usage. Either may
//! fail independently; the result holds whatever was collected.

pub mod nvidia_smi;
pub mod parser;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::model::GpuUsage;

pub use nvidia_smi::NvidiaSmi;
pub use parser::{ComputeAppRow, PmonRow, parse_compute_apps, parse_pmon};

/// GPU usage entries keyed by pid.
pub type GpuProcessMap = HashMap<u32, Vec<GpuUsage>>;

/// Error type for GPU query failures.
#[derive(Debug)]
pub enum GpuQueryError {
    /// GPU collection is turned off.
    Disabled,
    /// The `nvidia-smi` binary could not be found.
    NotInstalled,
    /// The query did not finish within the timeout and was killed.
    Timeout(Duration),
    /// The query exited with a failure status.
    Failed(String),
    /// I/O error spawning or reading from the query.
    Io(std::io::Error),
}

impl std::fmt::Display for GpuQueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuQueryError::Disabled => write!(f, "GPU collection disabled"),
            GpuQueryError::NotInstalled => write!(f, "nvidia-smi not found"),
            GpuQueryError::Timeout(t) => {
                write!(f, "nvidia-smi timed out after {:.1}s", t.as_secs_f64())
            }
            GpuQueryError::Failed(msg) => write!(f, "nvidia-smi failed: {}", msg),
            GpuQueryError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for GpuQueryError {}

impl From<std::io::Error> for GpuQueryError {
    fn from(e: std::io::Error) -> Self {
        GpuQueryError::Io(e)
    }
}

/// Merges `pmon` and compute-apps rows into per-pid GPU usage.
///
/// Rows are joined on `(pid, gpu)`. A process that only appears in the
/// compute-apps query (typically right after CUDA init) gets zero
/// utilization. Entries of one pid are ordered by GPU index.
pub fn merge(pmon: &[PmonRow], apps: &[ComputeAppRow]) -> GpuProcessMap {
    let mut by_key: BTreeMap<(u32, String), GpuUsage> = BTreeMap::new();

    for row in pmon {
        by_key.insert(
            (row.pid, row.gpu.clone()),
            GpuUsage {
                gpu: row.gpu.clone(),
                sm_percent: row.sm_percent,
                mem_percent: row.mem_percent,
                fb_mib: 0,
            },
        );
    }

    for row in apps {
        by_key
            .entry((row.pid, row.gpu.clone()))
            .or_insert_with(|| GpuUsage {
                gpu: row.gpu.clone(),
                ..GpuUsage::default()
            })
            .fb_mib = row.used_memory_mib;
    }

    let mut map: GpuProcessMap = HashMap::new();
    for ((pid, _), usage) in by_key {
        map.entry(pid).or_default().push(usage);
    }
    map
}
