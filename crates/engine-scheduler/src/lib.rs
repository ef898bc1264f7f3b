//! Parallel Executor: dependency DAG construction, a bounded worker pool
//! that releases ready steps as their dependencies complete, and
//! parallelizability analysis for the Planner's strategy selection.

pub mod analysis;
pub mod dag;
pub mod parallel;

pub use analysis::{analyze_parallelizability, ParallelizabilityReport};
pub use dag::DependencyGraph;
pub use parallel::{run_parallel, ParallelRunOutcome, StepRunner};
