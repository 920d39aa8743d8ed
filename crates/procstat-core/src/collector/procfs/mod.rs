//! Collectors for Linux `/proc` filesystem.
//!
//! This module provides parsers and the per-process collector that reads
//! raw counters from the `/proc` virtual filesystem.

pub mod parser;
pub mod process;

pub use parser::UserResolver;
pub use process::{CollectError, ProcessCollector, ProcessDetail};
