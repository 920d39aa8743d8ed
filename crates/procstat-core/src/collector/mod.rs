//! Per-process metrics collection for Linux.
//!
//! This module reads process counters from the `/proc` filesystem and GPU
//! usage from `nvidia-smi`, with mock implementations of both for testing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Sampler                          │
//! │   - CPU percent since last tick                          │
//! │   - joins GPU usage by pid                               │
//! │  ┌──────────────────────┐     ┌───────────────────────┐  │
//! │  │  ProcessSource       │     │  GpuSource            │  │
//! │  │  (trait)             │     │  (trait)              │  │
//! │  └──────────┬───────────┘     └───────────┬───────────┘  │
//! └─────────────┼─────────────────────────────┼──────────────┘
//!               │                             │
//!      ┌────────▼─────────┐         ┌─────────┼─────────┐
//!      │ ProcessCollector │         │         │         │
//!      │  /proc/[pid]/*   │   ┌─────▼────┐ ┌──▼───┐ ┌───▼─────┐
//!      └────────┬─────────┘   │NvidiaSmi │ │NoGpu │ │ MockGpu │
//!               │             └──────────┘ └──────┘ └─────────┘
//!        ┌──────▼──────┐
//!        │  FileSystem │ (trait)
//!        └──────┬──────┘
//!         ┌─────┴──────┐
//!    ┌────▼────┐  ┌────▼────┐
//!    │ RealFs  │  │ MockFs  │
//!    └─────────┘  └─────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use procstat_core::collector::{NvidiaSmi, ProcessCollector, RealFs, Sampler};
//!
//! let processes = ProcessCollector::new(RealFs::new(), "/proc");
//! let mut sampler = Sampler::new(processes, NvidiaSmi::default());
//! sampler.prime().unwrap();
//! let samples = sampler.sample().unwrap();
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use procstat_core::collector::{MockFs, MockGpu, ProcessCollector, Sampler};
//!
//! let processes = ProcessCollector::new(MockFs::typical_system(), "/proc");
//! let mut sampler = Sampler::new(processes, MockGpu::single(1001, 90, 40, 8192));
//! let samples = sampler.sample().unwrap();
//! assert!(samples.iter().any(|s| s.pid == 1001 && s.has_gpu()));
//! ```

pub mod gpu;
pub mod mock;
pub mod procfs;
pub mod sampler;
pub mod traits;

pub use gpu::{GpuProcessMap, GpuQueryError, NvidiaSmi};
pub use mock::{MockFs, MockGpu};
pub use procfs::{CollectError, ProcessCollector, ProcessDetail};
pub use sampler::Sampler;
pub use traits::{FileSystem, GpuSource, NoGpu, ProcessSource, RealFs};
