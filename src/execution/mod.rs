//! Execution engine module.
//!
//! This module handles running verified graphs, synchronously or on a
//! worker thread, and the plans and counters that go with it.

pub mod engine;
pub mod perf;
pub mod plan;
pub mod schedule;
pub mod scheduler;

pub use engine::{ExecutionEngine, ExecutionOptions, ExecutionStats};
pub use perf::Perf;
pub use plan::{ExecutionPlan, MemoryEntry, MemoryPlan};
pub use schedule::ScheduledGraph;
pub use scheduler::Scheduler;
