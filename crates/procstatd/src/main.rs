//! procstatd - per-process metrics exporter for the node exporter textfile collector.
//!
//! Samples every process from /proc (plus per-process GPU usage from
//! nvidia-smi when available) on a fixed interval and atomically rewrites
//! `procstats.prom` in the textfile collector directory.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use procstat_core::collector::{GpuSource, NoGpu, NvidiaSmi, ProcessCollector, RealFs, Sampler};
use procstat_core::config::{parse_count, parse_limit, parse_percent, parse_seconds};
use procstat_core::{Config, Exporter, TextfileWriter, TickOutcome};

/// Per-process metrics exporter for the node exporter textfile collector.
#[derive(Parser)]
#[command(
    name = "procstatd",
    about = "Per-process metrics exporter for the node exporter textfile collector",
    version
)]
struct Args {
    /// Seconds between ticks (fractions allowed).
    #[arg(short, long, env = "INTERVAL_SECONDS", default_value = "1", value_parser = parse_seconds)]
    interval: Duration,

    /// Keep only the N busiest processes (by CPU, then RSS). 0 keeps all.
    #[arg(long, env = "TOP_N", default_value = "0", value_parser = parse_limit)]
    top_n: usize,

    /// Drop processes with a smaller resident set, in bytes.
    #[arg(long, env = "MIN_RSS_BYTES", default_value = "0", value_parser = parse_count)]
    min_rss_bytes: u64,

    /// Drop processes using less CPU, in percent of one core.
    #[arg(long, env = "MIN_CPU_PERCENT", default_value = "0", value_parser = parse_percent)]
    min_cpu_percent: f64,

    /// Textfile collector directory; procstats.prom is written here.
    #[arg(short, long, env = "OUTPUT_DIR", default_value = "/textfile")]
    output_dir: PathBuf,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, env = "PROC_PATH", default_value = "/proc")]
    proc_path: PathBuf,

    /// Query per-process GPU usage with nvidia-smi. Disable with --gpu=false.
    #[arg(long, env = "GPU_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    gpu: bool,

    /// Timeout of a single nvidia-smi invocation, in seconds.
    #[arg(long, env = "GPU_TIMEOUT_SECONDS", default_value = "2", value_parser = parse_seconds)]
    gpu_timeout: Duration,

    /// Value of the `instance` label. Defaults to the kernel host name.
    #[arg(long, env = "INSTANCE")]
    instance: Option<String>,

    /// Write once and exit.
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["procstatd", "procstat_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Picks the `instance` label: explicit flag, kernel host name, `$HOSTNAME`.
fn resolve_instance(explicit: Option<String>, from_proc: Option<String>) -> String {
    explicit
        .filter(|s| !s.trim().is_empty())
        .or(from_proc)
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let config = Config {
        interval: args.interval,
        top_n: args.top_n,
        min_rss_bytes: args.min_rss_bytes,
        min_cpu_percent: args.min_cpu_percent,
    };
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::from(2);
    }

    info!("procstatd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={:.3}s, top_n={}, min_rss_bytes={}, min_cpu_percent={}",
        config.interval.as_secs_f64(),
        config.top_n,
        config.min_rss_bytes,
        config.min_cpu_percent
    );
    if !config.filters_enabled() {
        debug!("No filters configured, exporting every process");
    }

    let writer = TextfileWriter::new(&args.output_dir);
    if let Err(e) = writer.ensure_dir() {
        error!(
            "Cannot create output directory {}: {}",
            args.output_dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }
    info!("Writing {}", writer.target().display());

    let processes = ProcessCollector::new(RealFs::new(), &args.proc_path);
    let instance = resolve_instance(args.instance.clone(), processes.hostname());
    info!("Instance label: {}", instance);

    if args.gpu {
        info!(
            "GPU collector: nvidia-smi (timeout {:.1}s)",
            args.gpu_timeout.as_secs_f64()
        );
        let gpu = NvidiaSmi::new(args.gpu_timeout);
        run(Sampler::new(processes, gpu), config, writer, instance, args.once)
    } else {
        info!("GPU collector: disabled");
        run(Sampler::new(processes, NoGpu), config, writer, instance, args.once)
    }
}

fn run<G: GpuSource>(
    sampler: Sampler<ProcessCollector<RealFs>, G>,
    config: Config,
    writer: TextfileWriter,
    instance: String,
    once: bool,
) -> ExitCode {
    let interval = config.interval;
    let mut exporter = Exporter::new(sampler, config, writer, instance);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    // Baseline for CPU deltas, so the first written tick is meaningful
    let primed_at = Instant::now();
    match exporter.prime() {
        Ok(count) => debug!("Primed CPU counters for {} processes", count),
        Err(e) => warn!("Failed to prime CPU counters: {}", e),
    }
    sleep_while_running(&running, interval.saturating_sub(primed_at.elapsed()));

    info!("Starting collection loop");

    let mut tick_count: u64 = 0;
    let mut last_failed = false;

    while running.load(Ordering::SeqCst) {
        let tick_started = Instant::now();

        match exporter.tick(|| running.load(Ordering::SeqCst)) {
            Ok(TickOutcome::Written(report)) => {
                tick_count += 1;
                if last_failed {
                    info!("Output written again after failure");
                    last_failed = false;
                }
                debug!(
                    "Tick #{}: {} processes sampled, {} written ({} with GPU), {} bytes in {:?}",
                    tick_count,
                    report.sampled,
                    report.written,
                    report.with_gpu,
                    report.bytes,
                    report.elapsed
                );
                // Periodic liveness line (~every 10 minutes at the default interval)
                if tick_count == 1 || tick_count.is_multiple_of(600) {
                    info!(
                        "Tick #{}: {} processes written of {}",
                        tick_count, report.written, report.sampled
                    );
                }
            }
            Ok(TickOutcome::Abandoned) => {
                debug!("Tick abandoned on shutdown");
                break;
            }
            Err(e) => {
                error!("Tick failed: {}", e);
                last_failed = true;
            }
        }

        if once {
            break;
        }

        let elapsed = tick_started.elapsed();
        if elapsed > interval {
            warn!(
                "Tick took {:?}, longer than the {:?} interval",
                elapsed, interval
            );
        }
        sleep_while_running(&running, interval.saturating_sub(elapsed));
    }

    info!("Shutdown complete");

    if once && last_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Sleeps for `duration` with periodic checks for the shutdown signal.
fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let sleep_interval = Duration::from_millis(100);
    let mut remaining = duration;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let sleep_time = remaining.min(sleep_interval);
        std::thread::sleep(sleep_time);
        remaining = remaining.saturating_sub(sleep_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_defaults_match_documented_values() {
        let args = Args::try_parse_from(["procstatd"]).unwrap();
        assert_eq!(args.interval, Duration::from_secs(1));
        assert_eq!(args.top_n, 0);
        assert_eq!(args.min_rss_bytes, 0);
        assert_eq!(args.min_cpu_percent, 0.0);
        assert_eq!(args.output_dir, PathBuf::from("/textfile"));
        assert!(args.gpu);
        assert_eq!(args.gpu_timeout, Duration::from_secs(2));
    }

    #[test]
    fn args_reject_invalid_values() {
        assert!(Args::try_parse_from(["procstatd", "--top-n", "-1"]).is_err());
        assert!(Args::try_parse_from(["procstatd", "--interval", "0"]).is_err());
        assert!(Args::try_parse_from(["procstatd", "--min-cpu-percent", "abc"]).is_err());
        assert!(Args::try_parse_from(["procstatd", "--min-rss-bytes", "1e6"]).is_err());
    }

    #[test]
    fn args_accept_flags() {
        let args = Args::try_parse_from([
            "procstatd",
            "--interval",
            "0.5",
            "--top-n",
            "20",
            "--min-cpu-percent",
            "1.5",
            "--gpu=false",
            "--once",
        ])
        .unwrap();
        assert_eq!(args.interval, Duration::from_millis(500));
        assert_eq!(args.top_n, 20);
        assert_eq!(args.min_cpu_percent, 1.5);
        assert!(!args.gpu);
        assert!(args.once);
    }

    #[test]
    fn instance_resolution_order() {
        assert_eq!(
            resolve_instance(Some("explicit".to_string()), Some("kernel".to_string())),
            "explicit"
        );
        assert_eq!(
            resolve_instance(Some("  ".to_string()), Some("kernel".to_string())),
            "kernel"
        );
    }

    #[test]
    fn sleep_returns_immediately_when_stopped() {
        let running = AtomicBool::new(false);
        let started = Instant::now();
        sleep_while_running(&running, Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
