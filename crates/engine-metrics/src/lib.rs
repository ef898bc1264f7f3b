//! Metrics Collector: per-step timing, memory, and retry tracking, rolled
//! up into per-plan totals and a formatted textual report on completion.

pub mod collector;
pub mod memory;
pub mod types;

pub use collector::{format_report, MetricsCollector};
pub use memory::current_process_memory_mb;
pub use types::{ParallelInfo, PlanMetrics, StepMetrics};
