use engine_core::{EngineError, Step};
use engine_scheduler::analyze_parallelizability;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Sequential,
    Parallel,
}

const SPEEDUP_THRESHOLD: f64 = 1.5;

/// Choose sequential vs. parallel execution per §4.1.1: parallel requires
/// the executor enabled, a fresh start (no resumption from a checkpoint),
/// and either no declared dependencies or a predicted speedup ≥ 1.5x.
///
/// The dependency graph is validated for cycles unconditionally, before the
/// sequential/parallel choice is made — a cyclic plan must be rejected with
/// `CircularDependency` whether or not it would have run in parallel.
pub fn select_strategy(
    steps: &[Step],
    parallel_enabled: bool,
    current_step: usize,
) -> Result<Strategy, EngineError> {
    let report = analyze_parallelizability(steps)?;

    if !parallel_enabled || current_step != 0 {
        return Ok(Strategy::Sequential);
    }

    let has_dependencies = steps.iter().any(|s| !s.depends_on.is_empty());
    if !has_dependencies {
        return Ok(Strategy::Parallel);
    }

    if report.estimated_speedup >= SPEEDUP_THRESHOLD {
        Ok(Strategy::Parallel)
    } else {
        Ok(Strategy::Sequential)
    }
}
