//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` filesystem states
//! for testing various system conditions.

use super::filesystem::{MockFs, MockProcess};

impl MockFs {
    /// Creates a typical GPU node with a few processes.
    ///
    /// Includes: init (PID 1), a kernel thread (PID 2), a bash shell
    /// (PID 1000) and a training job (PID 1001).
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file(
            "/etc/passwd",
            "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
user:x:1000:1000:User:/home/user:/bin/bash
",
        );

        fs.add_file("/proc/sys/kernel/hostname", "gpu-node-01\n");

        fs.add_mock_process(&MockProcess {
            pid: 1,
            ppid: 0,
            comm: "systemd".to_string(),
            utime: 1000,
            stime: 500,
            starttime: 1,
            vsize: 170_000_000,
            rss_pages: 3000,
            cmdline: "/sbin/init\0".to_string(),
            fds: Some(12),
            ..MockProcess::default()
        });

        fs.add_mock_process(&MockProcess {
            pid: 2,
            ppid: 0,
            comm: "kthreadd".to_string(),
            stime: 5,
            starttime: 1,
            ..MockProcess::default()
        });

        fs.add_mock_process(&MockProcess {
            pid: 1000,
            ppid: 999,
            comm: "bash".to_string(),
            uid: 1000,
            utime: 100,
            stime: 50,
            starttime: 100_000,
            vsize: 25_000_000,
            rss_pages: 2000,
            cmdline: "/bin/bash\0--login\0".to_string(),
            fds: Some(4),
            ..MockProcess::default()
        });

        fs.add_mock_process(&MockProcess {
            pid: 1001,
            ppid: 1000,
            comm: "python3".to_string(),
            state: 'R',
            uid: 1000,
            utime: 5000,
            stime: 700,
            threads: 8,
            starttime: 200_000,
            vsize: 4_000_000_000,
            rss_pages: 500_000,
            cmdline: "/usr/bin/python3\0train.py\0--epochs\0100\0".to_string(),
            fds: Some(8),
            ..MockProcess::default()
        });

        fs
    }

    /// Creates a system with processes that have special characters in names.
    pub fn with_special_names() -> Self {
        let mut fs = Self::new();

        fs.add_file("/etc/passwd", "root:x:0:0:root:/root:/bin/bash\n");

        // Process with spaces in name
        fs.add_process(
            5000,
            "5000 (Web Content) S 4999 5000 4999 0 -1 4194304 100000 0 500 0 5000 1000 0 0 20 0 20 0 500000 2000000000 50000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "Name:\tWeb Content\nPid:\t5000\nPPid:\t4999\nUid:\t0\t0\t0\t0\nGid:\t0\t0\t0\t0\n",
            "/usr/lib/firefox/firefox\0-contentproc\0",
            "Web Content\n",
        );

        // Process with parentheses and a quote in name
        fs.add_mock_process(&MockProcess {
            pid: 5001,
            comm: "my (\"app\")".to_string(),
            utime: 10,
            rss_pages: 100,
            cmdline: "/opt/my app/bin\0".to_string(),
            ..MockProcess::default()
        });

        fs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::traits::FileSystem;
    use std::path::Path;

    #[test]
    fn test_typical_system_layout() {
        let fs = MockFs::typical_system();
        assert!(fs.exists(Path::new("/proc/1/stat")));
        assert!(fs.exists(Path::new("/proc/1001/fd")));
        assert!(!fs.exists(Path::new("/proc/2/fd")));
        assert!(fs.read_to_string(Path::new("/etc/passwd")).is_ok());
    }

    #[test]
    fn test_special_names_layout() {
        let fs = MockFs::with_special_names();
        let comm = fs.read_to_string(Path::new("/proc/5001/comm")).unwrap();
        assert_eq!(comm.trim(), "my (\"app\")");
    }
}
