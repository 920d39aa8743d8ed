//! Mock implementations for testing collectors without Linux or a GPU.
//!
//! Provides `MockFs` (in-memory `/proc`), ready-made scenarios and `MockGpu`.

mod filesystem;
mod gpu;
mod scenarios;

pub use filesystem::{MockFs, MockProcess};
pub use gpu::MockGpu;
