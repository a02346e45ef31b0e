//! The capture loop and its per-cycle bookkeeping.

mod cycle;
mod pacing;
mod runner;

pub use cycle::{CycleRecord, STAMP_FORMAT};
pub use pacing::{pacing_delay, Shutdown};
pub use runner::{CaptureError, CaptureOrchestrator, OutputPaths, Outputs, RunSummary};
