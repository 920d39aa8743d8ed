//! Process collector for gathering per-process counters from `/proc/[pid]/`.

use std::path::{Path, PathBuf};

use crate::collector::procfs::parser::{
    UserResolver, parse_cmdline_exe, parse_proc_stat, parse_proc_status,
};
use crate::collector::traits::{FileSystem, ProcessSource};

/// Used when the page size cannot be queried.
const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Returns the kernel memory page size in bytes.
pub fn system_page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        DEFAULT_PAGE_SIZE
    }
}

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// Process disappeared during collection.
    ProcessGone(u32),
    /// I/O error reading process files.
    Io(std::io::Error),
    /// Parse error in process files.
    Parse(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::ProcessGone(pid) => write!(f, "process {} disappeared", pid),
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// Raw counters of one process as read from `/proc`.
///
/// CPU time is cumulative; the sampler turns it into a percentage using the
/// previous tick's value for the same `(pid, starttime)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessDetail {
    pub pid: u32,
    pub name: String,
    pub user: String,
    pub exe: String,
    /// Start time after boot in clock ticks. Distinguishes reused pids.
    pub starttime: u64,
    /// utime + stime in clock ticks.
    pub cpu_ticks: u64,
    pub rss_bytes: u64,
    pub vms_bytes: u64,
    pub open_fds: u64,
    pub threads: u64,
}

/// Collects process information from `/proc/[pid]/` files.
pub struct ProcessCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
    user_resolver: UserResolver,
    page_size: u64,
}

impl<F: FileSystem> ProcessCollector<F> {
    /// Creates a new process collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    ///
    /// User names are resolved from `/etc/passwd` read through `fs`; if it is
    /// unreadable, numeric uids are reported instead.
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        let mut user_resolver = UserResolver::new();
        if let Ok(passwd) = fs.read_to_string(Path::new("/etc/passwd")) {
            user_resolver.load_from_content(&passwd);
        }

        Self {
            fs,
            proc_path: proc_path.into(),
            user_resolver,
            page_size: system_page_size(),
        }
    }

    /// Overrides the page size used for `rss` when `VmRSS` is missing.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Returns the underlying filesystem, e.g. to mutate a `MockFs` between ticks.
    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    /// Reads the kernel host name from `<proc>/sys/kernel/hostname`.
    pub fn hostname(&self) -> Option<String> {
        self.fs
            .read_to_string(&self.proc_path.join("sys/kernel/hostname"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Counts entries of `/proc/[pid]/fd`.
    ///
    /// Reading another user's fd directory needs privileges; 0 is reported
    /// when it cannot be listed.
    fn count_fds(&self, proc_dir: &Path) -> u64 {
        self.fs
            .read_dir(&proc_dir.join("fd"))
            .map(|entries| entries.len() as u64)
            .unwrap_or(0)
    }

    /// Collects raw counters of a single process.
    pub fn collect_process(&self, pid: u32) -> Result<ProcessDetail, CollectError> {
        let proc_dir = self.proc_path.join(pid.to_string());

        let stat_content = self
            .fs
            .read_to_string(&proc_dir.join("stat"))
            .map_err(|_| CollectError::ProcessGone(pid))?;
        let stat =
            parse_proc_stat(&stat_content).map_err(|e| CollectError::Parse(e.message.clone()))?;

        let status_content = self
            .fs
            .read_to_string(&proc_dir.join("status"))
            .map_err(|_| CollectError::ProcessGone(pid))?;
        let status = parse_proc_status(&status_content)
            .map_err(|e| CollectError::Parse(e.message.clone()))?;

        let name = self
            .fs
            .read_to_string(&proc_dir.join("comm"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| stat.comm.clone());

        // VmRSS is in kB regardless of the page size
        let rss_bytes = match status.vm_rss {
            Some(kb) => kb * 1024,
            None => (stat.rss.max(0) as u64) * self.page_size,
        };

        let exe = self
            .fs
            .read_to_string(&proc_dir.join("cmdline"))
            .ok()
            .and_then(|content| parse_cmdline_exe(&content))
            .unwrap_or_else(|| name.clone());

        Ok(ProcessDetail {
            pid: stat.pid,
            name,
            user: self.user_resolver.resolve(status.uid),
            exe,
            starttime: stat.starttime,
            cpu_ticks: stat.utime + stat.stime,
            rss_bytes,
            vms_bytes: stat.vsize,
            open_fds: self.count_fds(&proc_dir),
            threads: stat.num_threads.max(0) as u64,
        })
    }

    /// Lists numeric entries of the proc directory.
    pub fn list_pids(&self) -> Result<Vec<u32>, CollectError> {
        let entries = self.fs.read_dir(&self.proc_path)?;

        let mut pids: Vec<u32> = entries
            .iter()
            .filter_map(|entry| entry.file_name().and_then(|n| n.to_str()))
            .filter_map(|name| name.parse::<u32>().ok())
            .collect();
        pids.sort_unstable();

        Ok(pids)
    }
}

impl<F: FileSystem> ProcessSource for ProcessCollector<F> {
    fn enumerate_processes(&self) -> Result<Vec<u32>, CollectError> {
        self.list_pids()
    }

    fn read_process_detail(&self, pid: u32) -> Result<ProcessDetail, CollectError> {
        self.collect_process(pid)
    }
}
