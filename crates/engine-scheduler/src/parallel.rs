use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use engine_core::{EngineError, Step, StepResult};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::dag::DependencyGraph;

/// A step invocation, decoupled from any particular tool registry so the
/// scheduler can move it across spawned tasks.
pub type StepRunner =
    Arc<dyn Fn(&Step, &HashMap<String, Value>) -> Result<StepResult, EngineError> + Send + Sync>;

#[derive(Debug)]
pub struct ParallelRunOutcome {
    /// Results indexed the same as the input step slice; `None` for steps
    /// never dispatched because the run aborted on a circular dependency.
    pub results: Vec<Option<StepResult>>,
    /// First failure observed, by step id (§4.3 "single-slot error channel").
    pub first_error: Option<(String, String)>,
}

/// Run `steps` respecting their dependency graph with up to
/// `max_concurrent` workers in flight at once. Workers run on the
/// blocking pool since tool invocation may perform blocking I/O; each is
/// bounded by `per_step_timeout` (§5), which fails the step with
/// `EngineError::Timeout` on expiry rather than hanging the wave.
pub async fn run_parallel(
    steps: &[Step],
    max_concurrent: usize,
    initial_variables: HashMap<String, Value>,
    runner: StepRunner,
    per_step_timeout: Duration,
) -> Result<ParallelRunOutcome, EngineError> {
    let graph = DependencyGraph::build(steps);
    // Reject up front rather than deadlocking on a circular wait.
    graph.waves()?;

    let n = steps.len();
    if n == 0 {
        return Ok(ParallelRunOutcome {
            results: Vec::new(),
            first_error: None,
        });
    }

    let max_concurrent = max_concurrent.max(1);
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let variables = Arc::new(Mutex::new(initial_variables));

    let mut in_degree: Vec<usize> = (0..n).map(|i| graph.in_degree(i)).collect();
    let mut results: Vec<Option<StepResult>> = vec![None; n];
    let mut first_error: Option<(String, String)> = None;
    let mut ready: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut in_flight: JoinSet<(usize, Result<StepResult, EngineError>)> = JoinSet::new();
    let mut remaining = n;

    loop {
        while let Some(&idx) = ready.front() {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };
            ready.pop_front();
            let step = steps[idx].clone();
            let step_id = step.id.clone();
            let runner = runner.clone();
            let vars_snapshot = variables.lock().expect("lock poisoned").clone();
            in_flight.spawn(async move {
                let _permit = permit;
                let attempt_started = Instant::now();
                let joined = tokio::time::timeout(
                    per_step_timeout,
                    tokio::task::spawn_blocking(move || runner(&step, &vars_snapshot)),
                )
                .await;
                let outcome = match joined {
                    Ok(inner) => inner.expect("step worker panicked"),
                    Err(_) => Ok(StepResult::failure(
                        EngineError::Timeout {
                            step_id,
                            elapsed_ms: attempt_started.elapsed().as_millis() as u64,
                        }
                        .to_string(),
                        attempt_started.elapsed().as_millis() as u64,
                        0,
                    )),
                };
                (idx, outcome)
            });
        }

        if in_flight.is_empty() {
            break;
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };
        let (idx, outcome) = joined.expect("step worker task panicked");
        remaining -= 1;

        match outcome {
            Ok(result) => {
                if !result.success && first_error.is_none() {
                    first_error = Some((
                        steps[idx].id.clone(),
                        result.error.clone().unwrap_or_default(),
                    ));
                }
                if result.success {
                    variables.lock().expect("lock poisoned").insert(
                        format!("{}_output", steps[idx].id),
                        result.output.clone(),
                    );
                }
                results[idx] = Some(result);
                for &dep in graph.dependents_of(idx) {
                    in_degree[dep] -= 1;
                    if in_degree[dep] == 0 {
                        ready.push_back(dep);
                    }
                }
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some((steps[idx].id.clone(), e.to_string()));
                }
            }
        }
    }

    tracing::debug!(remaining, dispatched = n - remaining, "parallel run drained");

    Ok(ParallelRunOutcome {
        results,
        first_error,
    })
}
