//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of various `/proc` files
//! into structured data. They are designed to be easily testable with string inputs.

use std::collections::HashMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Fields of `/proc/[pid]/stat` used by the sampler.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    /// User mode CPU time in clock ticks.
    pub utime: u64,
    /// Kernel mode CPU time in clock ticks.
    pub stime: u64,
    pub num_threads: i64,
    /// Start time after boot in clock ticks.
    pub starttime: u64,
    /// Virtual memory size in bytes.
    pub vsize: u64,
    /// Resident set size in pages.
    pub rss: i64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The format is tricky because the comm field can contain spaces and parentheses.
/// Format: pid (comm) state ppid pgrp session tty_nr ...
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    // comm may itself contain ')' so split on the last one
    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let comm = content[open_paren + 1..close_paren].to_string();

    // Field indices below are relative to the token after ')', i.e. `state` is 0.
    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();

    if fields.len() < 22 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 22+, got {}",
            fields.len()
        )));
    }

    let parse_i64 = |idx: usize, name: &str| -> Result<i64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    let parse_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        utime: parse_u64(11, "utime")?,
        stime: parse_u64(12, "stime")?,
        num_threads: parse_i64(17, "num_threads")?,
        starttime: parse_u64(19, "starttime")?,
        vsize: parse_u64(20, "vsize")?,
        rss: parse_i64(21, "rss")?,
    })
}

/// Fields of `/proc/[pid]/status` used by the sampler.
#[derive(Debug, Clone, Default)]
pub struct ProcStatus {
    /// Real uid.
    pub uid: u32,
    /// Resident set size in kB, absent for kernel threads.
    pub vm_rss: Option<u64>,
}

/// Parses `/proc/[pid]/status` content.
///
/// Format is key:\tvalue pairs, one per line.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let mut status = ProcStatus::default();
    let mut saw_uid = false;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            // Uid has format: real effective saved fs
            "Uid" => {
                status.uid = value
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| ParseError::new("invalid Uid"))?;
                saw_uid = true;
            }
            "VmRSS" => {
                status.vm_rss = value.split_whitespace().next().and_then(|s| s.parse().ok());
            }
            _ => {}
        }
    }

    if !saw_uid {
        return Err(ParseError::new("missing Uid in status"));
    }

    Ok(status)
}

/// Parses `/proc/[pid]/cmdline` into its first argument.
///
/// Arguments are NUL-separated. Kernel threads have an empty cmdline and
/// yield `None`.
pub fn parse_cmdline_exe(content: &str) -> Option<String> {
    content
        .split('\0')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parses /etc/passwd content and returns uid -> username mapping.
pub fn parse_passwd(content: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 3
            && let Ok(uid) = parts[2].parse::<u32>()
        {
            map.insert(uid, parts[0].to_string());
        }
    }
    map
}

/// Resolver for UID -> username mapping.
///
/// Caches the passwd file contents for efficient lookups.
#[derive(Debug, Clone, Default)]
pub struct UserResolver {
    uid_to_name: HashMap<u32, String>,
}

impl UserResolver {
    /// Creates a new empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads user mappings from /etc/passwd content.
    pub fn load_from_content(&mut self, content: &str) {
        self.uid_to_name = parse_passwd(content);
    }

    /// Resolves UID to username, returns UID as string if not found.
    pub fn resolve(&self, uid: u32) -> String {
        self.uid_to_name
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| uid.to_string())
    }
}
