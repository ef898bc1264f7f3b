use engine_core::{EngineError, Step};
use serde::Serialize;

use crate::dag::DependencyGraph;

#[derive(Debug, Clone, Serialize)]
pub struct ParallelizabilityReport {
    pub total_steps: usize,
    pub max_parallelism: usize,
    pub parallel_groups: Vec<Vec<String>>,
    pub critical_path: Vec<String>,
    pub estimated_speedup: f64,
}

impl ParallelizabilityReport {
    /// Parallel strategy is worth it when the estimated speedup clears
    /// 1.5x (§4.1.1), mirroring the Planner's strategy-selection rule.
    pub fn worth_parallelizing(&self) -> bool {
        self.estimated_speedup >= 1.5
    }
}

/// Simulate a wave-based schedule over `steps` to report how much
/// parallelism the dependency graph actually admits.
pub fn analyze_parallelizability(steps: &[Step]) -> Result<ParallelizabilityReport, EngineError> {
    let graph = DependencyGraph::build(steps);
    let waves = graph.waves()?;
    let critical_path_idx = graph.critical_path()?;

    let total_steps = steps.len();
    let max_parallelism = waves.iter().map(Vec::len).max().unwrap_or(0);
    let parallel_groups: Vec<Vec<String>> = waves
        .iter()
        .map(|wave| wave.iter().map(|&i| graph.id_at(i).to_string()).collect())
        .collect();
    let critical_path: Vec<String> = critical_path_idx
        .iter()
        .map(|&i| graph.id_at(i).to_string())
        .collect();

    let estimated_speedup = if critical_path.is_empty() {
        1.0
    } else {
        total_steps as f64 / critical_path.len() as f64
    };

    Ok(ParallelizabilityReport {
        total_steps,
        max_parallelism,
        parallel_groups,
        critical_path,
        estimated_speedup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, "noop", "").with_depends_on(deps.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn three_way_fan_in_reports_expected_speedup() {
        let steps = vec![
            step("x", &[]),
            step("y", &[]),
            step("z", &[]),
            step("f", &["x", "y", "z"]),
        ];
        let report = analyze_parallelizability(&steps).unwrap();
        assert_eq!(report.total_steps, 4);
        assert_eq!(report.max_parallelism, 3);
        assert_eq!(report.critical_path.len(), 2);
        assert_eq!(report.estimated_speedup, 2.0);
        assert!(report.worth_parallelizing());
    }

    #[test]
    fn fully_sequential_plan_has_no_speedup() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])];
        let report = analyze_parallelizability(&steps).unwrap();
        assert_eq!(report.estimated_speedup, 1.0);
        assert!(!report.worth_parallelizing());
    }

    #[test]
    fn cyclic_plan_propagates_error() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        assert!(analyze_parallelizability(&steps).is_err());
    }
}
