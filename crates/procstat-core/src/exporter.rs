//! One sampling tick: sample, filter, render, write.

use std::time::{Duration, Instant};

use crate::collector::procfs::CollectError;
use crate::collector::sampler::Sampler;
use crate::collector::traits::{GpuSource, ProcessSource};
use crate::config::Config;
use crate::exposition::render;
use crate::filter;
use crate::writer::{TextfileWriter, WriteError};

/// Summary of a completed tick, for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Processes sampled before filtering.
    pub sampled: usize,
    /// Processes written after filtering.
    pub written: usize,
    /// Processes with GPU data among the written ones.
    pub with_gpu: usize,
    /// Size of the rendered file.
    pub bytes: usize,
    /// Wall time spent in the tick.
    pub elapsed: Duration,
}

/// Result of a tick that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Written(TickReport),
    /// Shutdown was requested after sampling; nothing was written.
    Abandoned,
}

/// Error type for a failed tick. The loop logs it and retries next tick.
#[derive(Debug)]
pub enum TickError {
    Sample(CollectError),
    Write(WriteError),
}

impl std::fmt::Display for TickError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickError::Sample(e) => write!(f, "sampling failed: {}", e),
            TickError::Write(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TickError {}

impl From<CollectError> for TickError {
    fn from(e: CollectError) -> Self {
        TickError::Sample(e)
    }
}

impl From<WriteError> for TickError {
    fn from(e: WriteError) -> Self {
        TickError::Write(e)
    }
}

/// Runs the sample → filter → write pipeline.
pub struct Exporter<P: ProcessSource, G: GpuSource> {
    sampler: Sampler<P, G>,
    config: Config,
    writer: TextfileWriter,
    instance: String,
}

impl<P: ProcessSource, G: GpuSource> Exporter<P, G> {
    pub fn new(
        sampler: Sampler<P, G>,
        config: Config,
        writer: TextfileWriter,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            sampler,
            config,
            writer,
            instance: instance.into(),
        }
    }

    pub fn writer(&self) -> &TextfileWriter {
        &self.writer
    }

    pub fn sampler_mut(&mut self) -> &mut Sampler<P, G> {
        &mut self.sampler
    }

    /// Establishes the CPU baseline. Returns the number of processes seen.
    pub fn prime(&mut self) -> Result<usize, CollectError> {
        self.sampler.prime()
    }

    /// Runs one tick.
    ///
    /// `keep_going` is checked after sampling; if it returns false the tick is
    /// abandoned without touching the output file.
    pub fn tick(&mut self, keep_going: impl Fn() -> bool) -> Result<TickOutcome, TickError> {
        self.tick_at(Instant::now(), keep_going)
    }

    pub fn tick_at(
        &mut self,
        now: Instant,
        keep_going: impl Fn() -> bool,
    ) -> Result<TickOutcome, TickError> {
        let started = Instant::now();

        let samples = self.sampler.sample_at(now)?;
        let sampled = samples.len();

        let samples = filter::apply(samples, &self.config);

        if !keep_going() {
            return Ok(TickOutcome::Abandoned);
        }

        let content = render(&samples, &self.instance);
        self.writer.write(&content)?;

        Ok(TickOutcome::Written(TickReport {
            sampled,
            written: samples.len(),
            with_gpu: samples.iter().filter(|s| s.has_gpu()).count(),
            bytes: content.len(),
            elapsed: started.elapsed(),
        }))
    }
}
