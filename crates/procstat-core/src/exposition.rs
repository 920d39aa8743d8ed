//! Rendering of a sample set into the Prometheus text exposition format.
//!
//! Every family is a gauge and is written contiguously (`# HELP`, `# TYPE`,
//! then one line per process). GPU families get one line per (process, GPU)
//! and are left out entirely when no process has GPU data. No timestamps are
//! written: the textfile collector rejects them.

use crate::model::{GpuUsage, ProcessSample};

/// File name consumed by the node exporter textfile collector.
pub const OUTPUT_FILE_NAME: &str = "procstats.prom";

/// Longest label value kept after sanitizing, in characters.
const MAX_LABEL_LEN: usize = 200;

struct ProcessFamily {
    name: &'static str,
    help: &'static str,
    value: fn(&ProcessSample) -> String,
}

struct GpuFamily {
    name: &'static str,
    help: &'static str,
    value: fn(&GpuUsage) -> String,
}

const PROCESS_FAMILIES: &[ProcessFamily] = &[
    ProcessFamily {
        name: "proc_cpu_percent",
        help: "Process CPU percent over interval",
        value: |s| format!("{:.2}", s.cpu_percent),
    },
    ProcessFamily {
        name: "proc_memory_rss_bytes",
        help: "Resident Set Size in bytes",
        value: |s| s.rss_bytes.to_string(),
    },
    ProcessFamily {
        name: "proc_memory_vms_bytes",
        help: "Virtual Memory Size in bytes",
        value: |s| s.vms_bytes.to_string(),
    },
    ProcessFamily {
        name: "proc_open_fds",
        help: "Open file descriptors count",
        value: |s| s.open_fds.to_string(),
    },
    ProcessFamily {
        name: "proc_threads",
        help: "Number of threads in the process",
        value: |s| s.threads.to_string(),
    },
];

const GPU_FAMILIES: &[GpuFamily] = &[
    GpuFamily {
        name: "proc_gpu_sm_percent",
        help: "NVIDIA per-process SM utilization percent",
        value: |g| g.sm_percent.to_string(),
    },
    GpuFamily {
        name: "proc_gpu_mem_percent",
        help: "NVIDIA per-process GPU memory utilization percent",
        value: |g| g.mem_percent.to_string(),
    },
    GpuFamily {
        name: "proc_gpu_fb_mem_mib",
        help: "NVIDIA per-process framebuffer memory MiB",
        value: |g| g.fb_mib.to_string(),
    },
];

/// Replaces characters outside `[A-Za-z0-9_:.-]` (and non-ASCII
/// alphanumerics) with `_` and caps the length.
///
/// The result never needs escaping inside a quoted label value.
pub fn sanitize_label(value: &str) -> String {
    value
        .chars()
        .take(MAX_LABEL_LEN)
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn process_labels(sample: &ProcessSample, instance: &str) -> String {
    format!(
        "pid=\"{}\",process=\"{}\",user=\"{}\",exe=\"{}\",instance=\"{}\"",
        sample.pid,
        sanitize_label(&sample.name),
        sanitize_label(&sample.user),
        sanitize_label(&sample.exe),
        instance,
    )
}

fn push_header(out: &mut String, name: &str, help: &str) {
    out.push_str(&format!("# HELP {} {}\n# TYPE {} gauge\n", name, help, name));
}

/// Renders samples into exposition text.
///
/// Output depends only on the arguments, so the same input always renders to
/// the same bytes.
pub fn render(samples: &[ProcessSample], instance: &str) -> String {
    let instance = sanitize_label(instance);
    let labels: Vec<String> = samples
        .iter()
        .map(|s| process_labels(s, &instance))
        .collect();

    let mut out = String::new();

    for family in PROCESS_FAMILIES {
        push_header(&mut out, family.name, family.help);
        for (sample, labels) in samples.iter().zip(&labels) {
            out.push_str(&format!(
                "{}{{{}}} {}\n",
                family.name,
                labels,
                (family.value)(sample)
            ));
        }
    }

    if samples.iter().any(ProcessSample::has_gpu) {
        for family in GPU_FAMILIES {
            push_header(&mut out, family.name, family.help);
            for (sample, labels) in samples.iter().zip(&labels) {
                for usage in &sample.gpu {
                    out.push_str(&format!(
                        "{}{{{},gpu=\"{}\"}} {}\n",
                        family.name,
                        labels,
                        sanitize_label(&usage.gpu),
                        (family.value)(usage)
                    ));
                }
            }
        }
    }

    out
}
