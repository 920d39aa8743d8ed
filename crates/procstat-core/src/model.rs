//! Data model for one sampling tick.

/// Per-device GPU usage of a single process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuUsage {
    /// GPU index as reported by `nvidia-smi`.
    pub gpu: String,
    /// SM (shader) utilization percent.
    pub sm_percent: u32,
    /// GPU memory controller utilization percent.
    pub mem_percent: u32,
    /// Framebuffer memory in MiB.
    pub fb_mib: u64,
}

/// Metrics of a single process at sample time.
///
/// Identity is the pid at sample time only; samples are not correlated
/// across ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    /// Command name (`/proc/[pid]/comm`).
    pub name: String,
    /// Owning user name, or the numeric uid when it cannot be resolved.
    pub user: String,
    /// First `cmdline` argument, or the command name for kernel threads.
    pub exe: String,
    /// CPU usage over the last interval, in percent of one core.
    pub cpu_percent: f64,
    pub rss_bytes: u64,
    pub vms_bytes: u64,
    pub open_fds: u64,
    pub threads: u64,
    /// One entry per GPU the process runs on. Empty when GPU data is absent.
    pub gpu: Vec<GpuUsage>,
}

impl ProcessSample {
    /// Returns true if this sample carries any GPU data.
    pub fn has_gpu(&self) -> bool {
        !self.gpu.is_empty()
    }
}

/// Ordered samples produced by one tick.
pub type SampleSet = Vec<ProcessSample>;

#[cfg(test)]
pub(crate) fn sample(pid: u32, cpu_percent: f64, rss_bytes: u64) -> ProcessSample {
    ProcessSample {
        pid,
        name: format!("proc{}", pid),
        user: "root".to_string(),
        exe: format!("/usr/bin/proc{}", pid),
        cpu_percent,
        rss_bytes,
        ..Default::default()
    }
}
