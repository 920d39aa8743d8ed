//! procstat-core - per-process metrics for the node exporter textfile collector.
//!
//! Provides:
//! - `collector` - `/proc` and `nvidia-smi` sampling, with mocks for testing
//! - `filter` - threshold and top-N selection
//! - `exposition` - Prometheus text format rendering
//! - `writer` - atomic replacement of the output file
//! - `exporter` - the per-tick pipeline tying them together
//! - `config` - configuration and its value parsers

pub mod collector;
pub mod config;
pub mod exporter;
pub mod exposition;
pub mod filter;
pub mod model;
pub mod writer;

pub use config::Config;
pub use exporter::{Exporter, TickError, TickOutcome, TickReport};
pub use model::{GpuUsage, ProcessSample, SampleSet};
pub use writer::TextfileWriter;
