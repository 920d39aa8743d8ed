//! Scriptable `GpuSource` for sampler tests.

use crate::collector::gpu::{GpuProcessMap, GpuQueryError};
use crate::collector::traits::GpuSource;
use crate::model::GpuUsage;

/// GPU source returning a fixed map, or failing as if `nvidia-smi` was absent.
#[derive(Debug, Clone, Default)]
pub struct MockGpu {
    processes: Option<GpuProcessMap>,
    /// Number of queries made so far.
    pub calls: usize,
}

impl MockGpu {
    /// Creates a source where no GPU tooling is installed.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Creates a source reporting the given per-pid usage.
    pub fn with_processes(processes: GpuProcessMap) -> Self {
        Self {
            processes: Some(processes),
            calls: 0,
        }
    }

    /// Creates a source where a single process runs on GPU 0.
    pub fn single(pid: u32, sm_percent: u32, mem_percent: u32, fb_mib: u64) -> Self {
        let mut map = GpuProcessMap::new();
        map.insert(
            pid,
            vec![GpuUsage {
                gpu: "0".to_string(),
                sm_percent,
                mem_percent,
                fb_mib,
            }],
        );
        Self::with_processes(map)
    }

    /// Switches between available and unavailable between ticks.
    pub fn set_processes(&mut self, processes: Option<GpuProcessMap>) {
        self.processes = processes;
    }
}

impl GpuSource for MockGpu {
    fn query_gpu_processes(&mut self) -> Result<GpuProcessMap, GpuQueryError> {
        self.calls += 1;
        self.processes.clone().ok_or(GpuQueryError::NotInstalled)
    }
}
