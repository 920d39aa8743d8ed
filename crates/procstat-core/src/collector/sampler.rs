//! Turns raw process counters into a `SampleSet` once per tick.
//!
//! CPU percent is computed over the interval since the previous tick:
//! `(ticks_now - ticks_prev) / CLK_TCK / elapsed_secs * 100`. A process seen
//! for the first time (or whose pid was reused, detected by a different start
//! time) reports 0.0 until the next tick. Values above 100 are possible for
//! multi-threaded processes.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::collector::gpu::GpuQueryError;
use crate::collector::procfs::{CollectError, ProcessDetail};
use crate::collector::traits::{GpuSource, ProcessSource};
use crate::model::{ProcessSample, SampleSet};

/// Clock ticks per second (USER_HZ). Standard value for Linux.
pub const CLK_TCK: u64 = 100;

/// Process identity across ticks: pid plus start time.
type ProcessKey = (u32, u64);

/// Last known GPU query outcome, used to log transitions only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GpuState {
    Unknown,
    Available,
    Unavailable,
}

/// GPU availability change that gets logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GpuTransition {
    Found,
    Lost,
    Recovered,
}

impl GpuState {
    /// Returns the state after a query and the change to log, if any.
    fn advance(self, available: bool) -> (GpuState, Option<GpuTransition>) {
        match (self, available) {
            (GpuState::Unknown, true) => (GpuState::Available, Some(GpuTransition::Found)),
            (GpuState::Unavailable, true) => (GpuState::Available, Some(GpuTransition::Recovered)),
            (GpuState::Available, true) => (GpuState::Available, None),
            (GpuState::Unavailable, false) => (GpuState::Unavailable, None),
            (_, false) => (GpuState::Unavailable, Some(GpuTransition::Lost)),
        }
    }
}

/// Samples all processes from a `ProcessSource` and joins GPU usage.
pub struct Sampler<P: ProcessSource, G: GpuSource> {
    processes: P,
    gpu: G,
    prev_ticks: HashMap<ProcessKey, u64>,
    prev_at: Option<Instant>,
    gpu_state: GpuState,
}

impl<P: ProcessSource, G: GpuSource> Sampler<P, G> {
    pub fn new(processes: P, gpu: G) -> Self {
        Self {
            processes,
            gpu,
            prev_ticks: HashMap::new(),
            prev_at: None,
            gpu_state: GpuState::Unknown,
        }
    }

    pub fn processes_mut(&mut self) -> &mut P {
        &mut self.processes
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    /// Returns true if the last GPU query succeeded.
    pub fn gpu_available(&self) -> bool {
        self.gpu_state == GpuState::Available
    }

    /// Records CPU counters without producing samples, so the first real
    /// tick already has a baseline.
    pub fn prime(&mut self) -> Result<usize, CollectError> {
        self.prime_at(Instant::now())
    }

    pub fn prime_at(&mut self, now: Instant) -> Result<usize, CollectError> {
        let details = self.read_all()?;
        self.prev_ticks = details
            .iter()
            .map(|d| ((d.pid, d.starttime), d.cpu_ticks))
            .collect();
        self.prev_at = Some(now);
        Ok(details.len())
    }

    /// Samples all processes now.
    pub fn sample(&mut self) -> Result<SampleSet, CollectError> {
        self.sample_at(Instant::now())
    }

    /// Samples all processes, treating `now` as the sampling instant.
    ///
    /// Fails only if the process table itself cannot be enumerated; individual
    /// processes that vanish or cannot be parsed are skipped.
    pub fn sample_at(&mut self, now: Instant) -> Result<SampleSet, CollectError> {
        let details = self.read_all()?;

        let elapsed_secs = self
            .prev_at
            .map(|prev| now.saturating_duration_since(prev).as_secs_f64())
            .filter(|secs| *secs > 0.0);

        let mut next_ticks = HashMap::with_capacity(details.len());
        let mut samples = Vec::with_capacity(details.len());

        for detail in details {
            let key = (detail.pid, detail.starttime);
            let cpu_percent = match (self.prev_ticks.get(&key), elapsed_secs) {
                (Some(&prev), Some(secs)) => cpu_percent(prev, detail.cpu_ticks, secs),
                _ => 0.0,
            };
            next_ticks.insert(key, detail.cpu_ticks);
            samples.push(into_sample(detail, cpu_percent));
        }

        // Exited processes fall out here
        self.prev_ticks = next_ticks;
        self.prev_at = Some(now);

        self.attach_gpu(&mut samples);
        Ok(samples)
    }

    fn read_all(&self) -> Result<Vec<ProcessDetail>, CollectError> {
        let pids = self.processes.enumerate_processes()?;
        let mut details = Vec::with_capacity(pids.len());

        for pid in pids {
            match self.processes.read_process_detail(pid) {
                Ok(detail) => details.push(detail),
                Err(CollectError::ProcessGone(_)) => {
                    trace!("process {} exited during scan", pid);
                }
                Err(e) => {
                    debug!("skipping process {}: {}", pid, e);
                }
            }
        }

        Ok(details)
    }

    /// Joins GPU usage into `samples` and returns the availability change
    /// that was logged, if any.
    fn attach_gpu(&mut self, samples: &mut [ProcessSample]) -> Option<GpuTransition> {
        let result = self.gpu.query_gpu_processes();
        let (state, transition) = self.gpu_state.advance(result.is_ok());
        self.gpu_state = state;

        match (&result, transition) {
            (Ok(_), Some(GpuTransition::Found)) => debug!("GPU metrics available"),
            (Ok(_), Some(GpuTransition::Recovered)) => info!("GPU metrics available again"),
            (Err(GpuQueryError::Disabled), Some(GpuTransition::Lost)) => {
                debug!("GPU metrics disabled")
            }
            (Err(e), Some(GpuTransition::Lost)) => {
                info!("GPU metrics unavailable, continuing without them: {}", e)
            }
            _ => {}
        }

        if let Ok(mut gpu_map) = result {
            for sample in samples.iter_mut() {
                if let Some(usage) = gpu_map.remove(&sample.pid) {
                    sample.gpu = usage;
                }
            }
        }

        transition
    }
}

fn into_sample(detail: ProcessDetail, cpu_percent: f64) -> ProcessSample {
    ProcessSample {
        pid: detail.pid,
        name: detail.name,
        user: detail.user,
        exe: detail.exe,
        cpu_percent,
        rss_bytes: detail.rss_bytes,
        vms_bytes: detail.vms_bytes,
        open_fds: detail.open_fds,
        threads: detail.threads,
        gpu: Vec::new(),
    }
}

/// CPU percent of one core over `elapsed_secs`. A counter that went
/// backwards yields 0.
pub fn cpu_percent(prev_ticks: u64, curr_ticks: u64, elapsed_secs: f64) -> f64 {
    let delta = curr_ticks.saturating_sub(prev_ticks);
    delta as f64 / CLK_TCK as f64 / elapsed_secs * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockFs, MockGpu, MockProcess};
    use crate::collector::procfs::ProcessCollector;
    use crate::collector::traits::NoGpu;
    use std::collections::HashSet;
    use std::time::Duration;

    /// In-memory process table for exercising the sampler directly.
    #[derive(Default)]
    struct FakeProcesses {
        details: HashMap<u32, ProcessDetail>,
        gone: HashSet<u32>,
        broken: HashSet<u32>,
    }

    impl FakeProcesses {
        fn put(&mut self, pid: u32, starttime: u64, cpu_ticks: u64) {
            self.details.insert(
                pid,
                ProcessDetail {
                    pid,
                    name: format!("p{}", pid),
                    user: "root".to_string(),
                    exe: format!("/bin/p{}", pid),
                    starttime,
                    cpu_ticks,
                    rss_bytes: 4096,
                    ..ProcessDetail::default()
                },
            );
        }
    }

    impl ProcessSource for FakeProcesses {
        fn enumerate_processes(&self) -> Result<Vec<u32>, CollectError> {
            let mut pids: Vec<u32> = self.details.keys().copied().collect();
            pids.extend(self.gone.iter().copied());
            pids.extend(self.broken.iter().copied());
            pids.sort_unstable();
            Ok(pids)
        }

        fn read_process_detail(&self, pid: u32) -> Result<ProcessDetail, CollectError> {
            if self.broken.contains(&pid) {
                return Err(CollectError::Parse("bad stat".to_string()));
            }
            self.details
                .get(&pid)
                .cloned()
                .ok_or(CollectError::ProcessGone(pid))
        }
    }

    fn cpu_of(samples: &[ProcessSample], pid: u32) -> f64 {
        samples.iter().find(|s| s.pid == pid).unwrap().cpu_percent
    }

    #[test]
    fn test_cpu_percent() {
        assert_eq!(cpu_percent(100, 150, 1.0), 50.0);
        assert_eq!(cpu_percent(0, 400, 2.0), 200.0);
        assert_eq!(cpu_percent(500, 100, 1.0), 0.0);
    }

    #[test]
    fn test_first_tick_reports_zero_cpu() {
        let mut procs = FakeProcesses::default();
        procs.put(10, 1, 1000);
        let mut sampler = Sampler::new(procs, NoGpu);

        let samples = sampler.sample_at(Instant::now()).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].cpu_percent, 0.0);
    }

    #[test]
    fn test_cpu_delta_since_previous_tick() {
        let mut procs = FakeProcesses::default();
        procs.put(10, 1, 1000);
        procs.put(20, 1, 0);
        let mut sampler = Sampler::new(procs, NoGpu);

        let t0 = Instant::now();
        sampler.prime_at(t0).unwrap();

        sampler.processes_mut().put(10, 1, 1050);
        sampler.processes_mut().put(20, 1, 200);

        let samples = sampler.sample_at(t0 + Duration::from_secs(1)).unwrap();
        assert!((cpu_of(&samples, 10) - 50.0).abs() < 1e-9);
        assert!((cpu_of(&samples, 20) - 200.0).abs() < 1e-9);

        // Next window only counts new ticks
        sampler.processes_mut().put(10, 1, 1060);
        let samples = sampler.sample_at(t0 + Duration::from_secs(3)).unwrap();
        assert!((cpu_of(&samples, 10) - 5.0).abs() < 1e-9);
        assert_eq!(cpu_of(&samples, 20), 0.0);
    }

    #[test]
    fn test_reused_pid_starts_from_zero() {
        let mut procs = FakeProcesses::default();
        procs.put(10, 1, 1000);
        let mut sampler = Sampler::new(procs, NoGpu);

        let t0 = Instant::now();
        sampler.prime_at(t0).unwrap();

        // Same pid, different start time: a new process
        sampler.processes_mut().put(10, 999, 5000);
        let samples = sampler.sample_at(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(cpu_of(&samples, 10), 0.0);
    }

    #[test]
    fn test_vanished_and_broken_processes_are_skipped() {
        let mut procs = FakeProcesses::default();
        procs.put(10, 1, 0);
        procs.gone.insert(11);
        procs.broken.insert(12);
        let mut sampler = Sampler::new(procs, NoGpu);

        let samples = sampler.sample().unwrap();
        let pids: Vec<u32> = samples.iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![10]);
    }

    #[test]
    fn test_gpu_usage_joined_by_pid() {
        let mut procs = FakeProcesses::default();
        procs.put(10, 1, 0);
        procs.put(20, 1, 0);
        let mut sampler = Sampler::new(procs, MockGpu::single(20, 75, 30, 4096));

        let samples = sampler.sample().unwrap();
        assert!(sampler.gpu_available());

        let p10 = samples.iter().find(|s| s.pid == 10).unwrap();
        let p20 = samples.iter().find(|s| s.pid == 20).unwrap();
        assert!(!p10.has_gpu());
        assert_eq!(p20.gpu.len(), 1);
        assert_eq!(p20.gpu[0].sm_percent, 75);
        assert_eq!(p20.gpu[0].mem_percent, 30);
        assert_eq!(p20.gpu[0].fb_mib, 4096);
    }

    #[test]
    fn test_gpu_unavailable_omits_fields() {
        let mut procs = FakeProcesses::default();
        procs.put(10, 1, 0);
        let mut sampler = Sampler::new(procs, MockGpu::unavailable());

        let samples = sampler.sample().unwrap();
        assert!(!sampler.gpu_available());
        assert!(samples.iter().all(|s| !s.has_gpu()));

        // Queried again next tick, and recovers when the tool comes back
        sampler
            .gpu_mut()
            .set_processes(Some(MockGpu::single(10, 1, 1, 1).query_gpu_processes().unwrap()));
        let samples = sampler.sample().unwrap();
        assert!(sampler.gpu_available());
        assert!(samples[0].has_gpu());
        assert_eq!(sampler.gpu_mut().calls, 2);
    }

    #[test]
    fn test_gpu_state_transitions() {
        use GpuState::*;

        assert_eq!(Unknown.advance(true), (Available, Some(GpuTransition::Found)));
        assert_eq!(Unknown.advance(false), (Unavailable, Some(GpuTransition::Lost)));
        assert_eq!(Available.advance(true), (Available, None));
        assert_eq!(Available.advance(false), (Unavailable, Some(GpuTransition::Lost)));
        assert_eq!(Unavailable.advance(false), (Unavailable, None));
        assert_eq!(
            Unavailable.advance(true),
            (Available, Some(GpuTransition::Recovered))
        );
    }

    #[test]
    fn test_gpu_unavailability_logged_once() {
        let mut sampler = Sampler::new(FakeProcesses::default(), MockGpu::unavailable());

        let transitions: Vec<Option<GpuTransition>> =
            (0..5).map(|_| sampler.attach_gpu(&mut [])).collect();
        assert_eq!(transitions[0], Some(GpuTransition::Lost));
        assert!(transitions[1..].iter().all(Option::is_none));
        assert_eq!(sampler.gpu_mut().calls, 5);

        sampler
            .gpu_mut()
            .set_processes(Some(MockGpu::single(10, 1, 1, 1).query_gpu_processes().unwrap()));
        assert_eq!(sampler.attach_gpu(&mut []), Some(GpuTransition::Recovered));
        assert_eq!(sampler.attach_gpu(&mut []), None);
    }

    #[test]
    fn test_sampler_over_mock_procfs() {
        let fs = MockFs::typical_system();
        let collector = ProcessCollector::new(fs, "/proc");
        let mut sampler = Sampler::new(collector, NoGpu);

        let t0 = Instant::now();
        assert_eq!(sampler.prime_at(t0).unwrap(), 4);

        // python3 burns 2 cores for 2 seconds: 400 ticks
        sampler.processes_mut().fs_mut().add_mock_process(&MockProcess {
            pid: 1001,
            ppid: 1000,
            comm: "python3".to_string(),
            uid: 1000,
            utime: 5300,
            stime: 800,
            threads: 8,
            starttime: 200_000,
            vsize: 4_000_000_000,
            rss_pages: 500_000,
            cmdline: "/usr/bin/python3\0train.py\0".to_string(),
            fds: Some(8),
            ..MockProcess::default()
        });
        // bash exits
        sampler.processes_mut().fs_mut().remove_process(1000);

        let samples = sampler.sample_at(t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(samples.len(), 3);

        let python = samples.iter().find(|s| s.pid == 1001).unwrap();
        assert!((python.cpu_percent - 200.0).abs() < 1e-9);
        assert_eq!(python.user, "user");
        assert_eq!(python.exe, "/usr/bin/python3");
        assert_eq!(python.threads, 8);
        assert_eq!(python.open_fds, 8);
        assert_eq!(python.rss_bytes, 500_000 * 4096);

        let init = samples.iter().find(|s| s.pid == 1).unwrap();
        assert_eq!(init.cpu_percent, 0.0);
    }

    #[test]
    fn test_enumeration_failure_is_an_error() {
        let collector = ProcessCollector::new(MockFs::new(), "/proc");
        let mut sampler = Sampler::new(collector, NoGpu);
        assert!(sampler.sample().is_err());
    }
}
