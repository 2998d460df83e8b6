//! Simulation harness: trace input and the driver loop.

/// DRAM trace reader.
pub mod trace;

/// Trace-driven simulation loop.
pub mod driver;

pub use driver::{run, RunOptions, RunOutcome, RunSummary};
pub use trace::{TraceEntry, TraceReader};
