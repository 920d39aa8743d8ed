//! In-memory mock filesystem for testing collectors without real `/proc`.
//!
//! This module provides `MockFs` which simulates a filesystem in memory,
//! allowing tests to run on macOS and in CI environments without Linux.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use crate::collector::traits::FileSystem;

/// In-memory filesystem for testing.
///
/// Stores files and directories in memory, allowing tests to simulate
/// various `/proc` filesystem states without needing actual Linux access.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
}

/// Description of a process to materialize under `/proc/[pid]/`.
///
/// Only the fields the collector reads are modelled; `stat` is generated with
/// zeroes for everything else.
#[derive(Debug, Clone)]
pub struct MockProcess {
    pub pid: u32,
    pub ppid: u32,
    pub comm: String,
    pub state: char,
    pub uid: u32,
    pub utime: u64,
    pub stime: u64,
    pub threads: u32,
    pub starttime: u64,
    pub vsize: u64,
    pub rss_pages: u64,
    /// NUL-separated argv, empty for kernel threads.
    pub cmdline: String,
    /// Number of entries in `fd/`. `None` leaves the directory out, as for
    /// processes owned by other users.
    pub fds: Option<u32>,
}

impl Default for MockProcess {
    fn default() -> Self {
        Self {
            pid: 0,
            ppid: 1,
            comm: String::new(),
            state: 'S',
            uid: 0,
            utime: 0,
            stime: 0,
            threads: 1,
            starttime: 0,
            vsize: 0,
            rss_pages: 0,
            cmdline: String::new(),
            fds: None,
        }
    }
}

impl MockProcess {
    /// Renders the `/proc/[pid]/stat` line.
    pub fn stat_line(&self) -> String {
        format!(
            "{pid} ({comm}) {state} {ppid} {pid} {pid} 0 -1 4194304 0 0 0 0 {utime} {stime} 0 0 20 0 {threads} 0 {starttime} {vsize} {rss} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0",
            pid = self.pid,
            comm = self.comm,
            state = self.state,
            ppid = self.ppid,
            utime = self.utime,
            stime = self.stime,
            threads = self.threads,
            starttime = self.starttime,
            vsize = self.vsize,
            rss = self.rss_pages,
        )
    }

    /// Renders `/proc/[pid]/status`.
    pub fn status_text(&self) -> String {
        let mut status = format!(
            "Name:\t{name}\nState:\t{state}\nPid:\t{pid}\nPPid:\t{ppid}\nUid:\t{uid}\t{uid}\t{uid}\t{uid}\nGid:\t{uid}\t{uid}\t{uid}\t{uid}\n",
            name = self.comm,
            state = self.state,
            pid = self.pid,
            ppid = self.ppid,
            uid = self.uid,
        );
        if self.rss_pages > 0 {
            status.push_str(&format!("VmRSS:\t{} kB\n", self.rss_pages * 4));
        }
        status.push_str(&format!("Threads:\t{}\n", self.threads));
        status
    }
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Adds a process from raw `/proc/[pid]/` file contents.
    ///
    /// # Arguments
    /// * `pid` - Process ID
    /// * `stat` - Content of `/proc/[pid]/stat`
    /// * `status` - Content of `/proc/[pid]/status`
    /// * `cmdline` - Content of `/proc/[pid]/cmdline`
    /// * `comm` - Content of `/proc/[pid]/comm`
    pub fn add_process(&mut self, pid: u32, stat: &str, status: &str, cmdline: &str, comm: &str) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat);
        self.add_file(base.join("status"), status);
        self.add_file(base.join("cmdline"), cmdline);
        self.add_file(base.join("comm"), comm);
    }

    /// Adds (or replaces) a process described by `MockProcess`.
    pub fn add_mock_process(&mut self, process: &MockProcess) {
        self.remove_process(process.pid);
        self.add_process(
            process.pid,
            &process.stat_line(),
            &process.status_text(),
            &process.cmdline,
            &format!("{}\n", process.comm),
        );
        if let Some(fds) = process.fds {
            self.add_fds(process.pid, fds);
        }
    }

    /// Adds a user process with the given cumulative CPU ticks.
    ///
    /// Start time is derived from the pid so repeated calls keep the same
    /// process identity.
    pub fn add_simple_process(
        &mut self,
        pid: u32,
        comm: &str,
        uid: u32,
        cpu_ticks: u64,
        rss_pages: u64,
        threads: u32,
    ) {
        self.add_mock_process(&MockProcess {
            pid,
            comm: comm.to_string(),
            uid,
            utime: cpu_ticks,
            threads,
            starttime: u64::from(pid) * 10,
            vsize: rss_pages * 4096 * 4,
            rss_pages,
            cmdline: format!("/usr/bin/{}\0", comm),
            fds: Some(3),
            ..MockProcess::default()
        });
    }

    /// Creates `count` entries under `/proc/[pid]/fd/`.
    pub fn add_fds(&mut self, pid: u32, count: u32) {
        let fd_dir = PathBuf::from(format!("/proc/{}/fd", pid));
        self.add_dir(&fd_dir);
        for fd in 0..count {
            self.add_file(fd_dir.join(fd.to_string()), "");
        }
    }

    /// Removes a process directory and everything below it.
    pub fn remove_process(&mut self, pid: u32) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.files.retain(|path, _| !path.starts_with(&base));
        self.directories.retain(|path| !path.starts_with(&base));
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_file() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/sys/kernel/hostname", "node\n");

        assert!(fs.exists(Path::new("/proc/sys/kernel/hostname")));
        assert!(fs.exists(Path::new("/proc/sys")));

        let content = fs
            .read_to_string(Path::new("/proc/sys/kernel/hostname"))
            .unwrap();
        assert_eq!(content, "node\n");
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/1/stat", "stat content");
        fs.add_file("/proc/1/status", "status content");
        fs.add_file("/proc/2/stat", "stat content 2");

        let proc_entries = fs.read_dir(Path::new("/proc")).unwrap();
        assert_eq!(proc_entries.len(), 2); // /proc/1 and /proc/2

        let proc1_entries = fs.read_dir(Path::new("/proc/1")).unwrap();
        assert_eq!(proc1_entries.len(), 2); // stat and status
    }

    #[test]
    fn test_mock_fs_add_mock_process() {
        let mut fs = MockFs::new();
        fs.add_mock_process(&MockProcess {
            pid: 1234,
            comm: "bash".to_string(),
            cmdline: "/bin/bash\0--login\0".to_string(),
            fds: Some(5),
            ..MockProcess::default()
        });

        assert!(fs.exists(Path::new("/proc/1234/stat")));
        assert!(fs.exists(Path::new("/proc/1234/status")));
        assert!(fs.exists(Path::new("/proc/1234/cmdline")));
        assert!(fs.exists(Path::new("/proc/1234/comm")));
        assert_eq!(fs.read_dir(Path::new("/proc/1234/fd")).unwrap().len(), 5);
    }

    #[test]
    fn test_mock_fs_replace_process_drops_old_fds() {
        let mut fs = MockFs::new();
        fs.add_fds(7, 10);
        fs.add_simple_process(7, "worker", 0, 0, 1, 1);
        assert_eq!(fs.read_dir(Path::new("/proc/7/fd")).unwrap().len(), 3);
    }

    #[test]
    fn test_mock_fs_remove_process() {
        let mut fs = MockFs::new();
        fs.add_simple_process(10, "a", 0, 0, 1, 1);
        fs.add_simple_process(100, "b", 0, 0, 1, 1);
        fs.remove_process(10);

        assert!(!fs.exists(Path::new("/proc/10")));
        assert!(!fs.exists(Path::new("/proc/10/stat")));
        assert!(fs.exists(Path::new("/proc/100/stat")));
    }

    #[test]
    fn test_mock_fs_not_found() {
        let fs = MockFs::new();
        let result = fs.read_to_string(Path::new("/nonexistent"));
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
