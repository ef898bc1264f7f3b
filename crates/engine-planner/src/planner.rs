use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use engine_config::Configuration;
use engine_core::{
    EngineError, GitOperation, Plan, PlanStatus, Step, StepResult, StepStatus, TaskContext,
    ToolRegistry,
};
use engine_executor::{apply_result_to_context, referenced_variables, substitute_params, StepExecutor};
use engine_git::{is_git_tool, record_operation, GitRollbackManager, GitShell};
use engine_metrics::{format_report, MetricsCollector, ParallelInfo, PlanMetrics};
use engine_scheduler::{analyze_parallelizability, run_parallel, StepRunner};
use engine_snapshot::SnapshotManager;
use serde_json::Value;
use ulid::Ulid;

use crate::checkpoint::{create_checkpoint, rollback_to_checkpoint};
use crate::events::{Event, EventBus};
use crate::persistence::{save_plan_best_effort, PlanStore};
use crate::strategy::{select_strategy, Strategy};

fn new_plan_id() -> String {
    format!("plan_{}", Ulid::new())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Cancel,
}

#[derive(Clone)]
struct Template {
    description: String,
    steps: Vec<Step>,
}

struct PlanEntry {
    plan: Plan,
    git: GitRollbackManager,
    metrics: MetricsCollector,
    control: Control,
}

/// The central orchestrator (§4.1): owns every plan's lifecycle, delegating
/// to the analyzer, executor, scheduler, snapshot manager, and git rollback
/// manager, and persisting/broadcasting as it goes.
pub struct Planner {
    config: Configuration,
    registry: Arc<ToolRegistry>,
    store: Box<dyn PlanStore>,
    events: EventBus,
    snapshots: SnapshotManager,
    git_shell: GitShell,
    working_directory: PathBuf,
    plans: Mutex<HashMap<String, PlanEntry>>,
    templates: Mutex<HashMap<String, Template>>,
}

impl Planner {
    pub fn new(
        config: Configuration,
        registry: ToolRegistry,
        store: Box<dyn PlanStore>,
        snapshots: SnapshotManager,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        let working_directory = working_directory.into();
        Self {
            config,
            registry: Arc::new(registry),
            store,
            events: EventBus::default(),
            snapshots,
            git_shell: GitShell::new(&working_directory),
            working_directory,
            plans: Mutex::new(HashMap::new()),
            templates: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Derive a step sequence from a natural-language description via the
    /// task analyzer, then register it as a new plan (§4.1 `CreatePlan`).
    pub fn create_plan(&self, description: &str) -> Result<String, EngineError> {
        let analyzed = engine_analyzer::analyze(description)?;
        self.create_plan_with_steps(description, analyzed.steps)
    }

    /// Register a plan from an already-built step sequence (§4.1
    /// `CreatePlanWithSteps`). Rejects plans over `MaxSteps`.
    pub fn create_plan_with_steps(
        &self,
        description: &str,
        steps: Vec<Step>,
    ) -> Result<String, EngineError> {
        if steps.len() > self.config.max_steps {
            return Err(EngineError::PlanTooLarge {
                steps: steps.len(),
                max: self.config.max_steps,
            });
        }

        let plan_id = new_plan_id();
        let mut plan = Plan::new(plan_id.clone(), description, steps);
        plan.context = TaskContext::new(self.working_directory.to_string_lossy().to_string());

        self.events.emit(Event::PlanCreated {
            plan_id: plan_id.clone(),
        });

        save_plan_best_effort(self.store.as_ref(), &plan);

        let mut plans = self.plans.lock().expect("lock poisoned");
        plans.insert(
            plan_id.clone(),
            PlanEntry {
                plan,
                git: GitRollbackManager::new(),
                metrics: MetricsCollector::new(plan_id.clone()),
                control: Control::Run,
            },
        );
        Ok(plan_id)
    }

    /// Register a reusable step template under `name`.
    pub fn register_template(&self, name: &str, description: &str, steps: Vec<Step>) {
        let mut templates = self.templates.lock().expect("lock poisoned");
        templates.insert(
            name.to_string(),
            Template {
                description: description.to_string(),
                steps,
            },
        );
    }

    /// Instantiate a registered template, interpolating `variables` into its
    /// steps (§4.1 `CreatePlanFromTemplate`). Fails with `MissingVariable`
    /// if any `${NAME}` a step references is absent from `variables`.
    pub fn create_plan_from_template(
        &self,
        name: &str,
        variables: &HashMap<String, Value>,
    ) -> Result<String, EngineError> {
        let template = {
            let templates = self.templates.lock().expect("lock poisoned");
            templates
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::UnknownTemplate(name.to_string()))?
        };

        for step in &template.steps {
            for required in referenced_variables(&step.params) {
                if !variables.contains_key(&required) {
                    return Err(EngineError::MissingVariable {
                        template: name.to_string(),
                        variable: required,
                    });
                }
            }
        }

        let steps = template
            .steps
            .into_iter()
            .map(|step| {
                let params = substitute_params(&step.params, variables);
                step.with_params(params)
            })
            .collect();

        self.create_plan_with_steps(&template.description, steps)
    }

    pub fn get_plan(&self, plan_id: &str) -> Result<Plan, EngineError> {
        let plans = self.plans.lock().expect("lock poisoned");
        plans
            .get(plan_id)
            .map(|e| e.plan.clone())
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))
    }

    pub fn get_report(&self, plan_id: &str) -> Result<String, EngineError> {
        let plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        Ok(format_report(&entry.metrics.finalize()))
    }

    pub fn get_metrics(&self, plan_id: &str) -> Result<PlanMetrics, EngineError> {
        let plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        Ok(entry.metrics.finalize())
    }

    pub fn get_logs(&self, plan_id: &str) -> Result<Vec<String>, EngineError> {
        let plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        Ok(entry
            .plan
            .steps
            .iter()
            .map(|s| match &s.result {
                Some(r) if !r.success => format!(
                    "{} [{}] {}ms: {}",
                    s.id,
                    s.status,
                    r.duration_ms,
                    r.error.clone().unwrap_or_default()
                ),
                Some(r) => format!("{} [{}] {}ms", s.id, s.status, r.duration_ms),
                None => format!("{} [{}]", s.id, s.status),
            })
            .collect())
    }

    pub fn get_git_operations(&self, plan_id: &str) -> Result<Vec<GitOperation>, EngineError> {
        let plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        Ok(entry.git.operations().to_vec())
    }

    pub fn analyze_parallelizability(
        &self,
        plan_id: &str,
    ) -> Result<engine_scheduler::ParallelizabilityReport, EngineError> {
        let plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        analyze_parallelizability(&entry.plan.steps)
    }

    /// What-if preview (§4.2): run every pending step through the executor's
    /// dry-run path, which resolves and substitutes but never invokes the
    /// tool, and return the synthesized results without mutating the plan.
    pub fn preview(&self, plan_id: &str) -> Result<Vec<StepResult>, EngineError> {
        let plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        let executor = StepExecutor::new(&self.registry);
        entry
            .plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .map(|s| executor.dry_run(s, &entry.plan.context.variables))
            .collect()
    }

    /// Flag a running plan to pause at the next step boundary (§4.1 `Pause`).
    pub fn pause(&self, plan_id: &str) -> Result<(), EngineError> {
        let mut plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get_mut(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        entry.control = Control::Pause;
        Ok(())
    }

    /// Un-pause a paused plan; the caller must invoke [`Self::execute`]
    /// again to actually continue from `current_step` (§4.1 `Resume`).
    pub fn resume(&self, plan_id: &str) -> Result<(), EngineError> {
        let mut plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get_mut(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        entry.plan.transition_to(PlanStatus::Executing)?;
        entry.control = Control::Run;
        Ok(())
    }

    /// Flag a plan to cancel at the next step boundary (§4.1 `Cancel`).
    pub fn cancel(&self, plan_id: &str) -> Result<(), EngineError> {
        let mut plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get_mut(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        entry.control = Control::Cancel;
        Ok(())
    }

    pub fn rollback_to_checkpoint(&self, plan_id: &str, checkpoint_id: &str) -> Result<(), EngineError> {
        let mut plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get_mut(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
        rollback_to_checkpoint(
            &mut entry.plan,
            &self.snapshots,
            &mut entry.git,
            &self.git_shell,
            checkpoint_id,
        )?;
        save_plan_best_effort(self.store.as_ref(), &entry.plan);
        self.events.emit(Event::RollbackPerformed {
            plan_id: plan_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
        });
        Ok(())
    }

    /// Run (or resume) a plan to completion, a pause point, or a terminal
    /// failure/cancellation (§4.1 `Execute`).
    pub async fn execute(&self, plan_id: &str) -> Result<(), EngineError> {
        let (strategy, starting) = {
            let mut plans = self.plans.lock().expect("lock poisoned");
            let entry = plans
                .get_mut(plan_id)
                .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;

            match entry.plan.status {
                PlanStatus::Pending => entry.plan.transition_to(PlanStatus::Executing)?,
                PlanStatus::Paused => entry.plan.transition_to(PlanStatus::Executing)?,
                _ => {
                    return Err(EngineError::IllegalStateTransition {
                        from: entry.plan.status.to_string(),
                        to: PlanStatus::Executing.to_string(),
                    })
                }
            }
            entry.control = Control::Run;
            let strategy = select_strategy(
                &entry.plan.steps,
                self.config.parallel_enabled(),
                entry.plan.current_step,
            );
            match strategy {
                Ok(strategy) => (strategy, entry.plan.current_step),
                Err(err) => {
                    // A cyclic plan must end in Failed, not stuck at Executing
                    // (§8 Scenario 5): zero tool invocations, terminal status.
                    entry.plan.transition_to(PlanStatus::Failed)?;
                    save_plan_best_effort(self.store.as_ref(), &entry.plan);
                    self.events.emit(Event::PlanFailed {
                        plan_id: plan_id.to_string(),
                        step_id: String::new(),
                        error: err.to_string(),
                    });
                    return Err(err);
                }
            }
        };

        self.events.emit(Event::PlanStarted {
            plan_id: plan_id.to_string(),
        });

        match strategy {
            Strategy::Sequential => self.execute_sequential(plan_id).await,
            Strategy::Parallel => {
                debug_assert_eq!(starting, 0, "parallel strategy only chosen on a fresh start");
                self.execute_parallel(plan_id).await
            }
        }
    }

    /// Sequential execution loop (§4.1.1). Each iteration re-acquires the
    /// plans lock only around bookkeeping; the actual tool invocation runs
    /// on the blocking pool under a per-step timeout, so the lock is never
    /// held across an `.await`.
    async fn execute_sequential(&self, plan_id: &str) -> Result<(), EngineError> {
        enum NextAction {
            Skipped,
            Run {
                idx: usize,
                step: Step,
                variables: HashMap<String, Value>,
            },
        }

        loop {
            let action = {
                let mut plans = self.plans.lock().expect("lock poisoned");
                let entry = plans
                    .get_mut(plan_id)
                    .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;

                if entry.plan.current_step >= entry.plan.steps.len() {
                    entry.plan.transition_to(PlanStatus::Completed)?;
                    save_plan_best_effort(self.store.as_ref(), &entry.plan);
                    let _ = self.store.save_metrics(plan_id, &entry.metrics.finalize());
                    self.events.emit(Event::PlanCompleted {
                        plan_id: plan_id.to_string(),
                    });
                    return Ok(());
                }

                match entry.control {
                    Control::Pause => {
                        entry.plan.transition_to(PlanStatus::Paused)?;
                        save_plan_best_effort(self.store.as_ref(), &entry.plan);
                        return Ok(());
                    }
                    Control::Cancel => {
                        entry.plan.transition_to(PlanStatus::Cancelled)?;
                        save_plan_best_effort(self.store.as_ref(), &entry.plan);
                        self.events.emit(Event::PlanCancelled {
                            plan_id: plan_id.to_string(),
                        });
                        return Ok(());
                    }
                    Control::Run => {}
                }

                let idx = entry.plan.current_step;
                let step = entry.plan.steps[idx].clone();

                // §4.1.1 point 2: a step whose dependencies aren't all
                // Completed is skipped rather than run.
                let deps_satisfied = step.depends_on.iter().all(|dep_id| {
                    entry
                        .plan
                        .step_index(dep_id)
                        .map(|i| entry.plan.steps[i].status == StepStatus::Completed)
                        .unwrap_or(false)
                });

                if deps_satisfied {
                    NextAction::Run {
                        idx,
                        step,
                        variables: entry.plan.context.variables.clone(),
                    }
                } else {
                    entry.plan.steps[idx].status = StepStatus::Skipped;
                    entry
                        .metrics
                        .record_skipped(step.id.clone(), "dependencies not satisfied");
                    self.events.emit(Event::StepSkipped {
                        plan_id: plan_id.to_string(),
                        step_id: step.id.clone(),
                    });
                    entry.plan.current_step = idx + 1;
                    save_plan_best_effort(self.store.as_ref(), &entry.plan);
                    NextAction::Skipped
                }
            };

            let (idx, step, variables) = match action {
                NextAction::Skipped => continue,
                NextAction::Run { idx, step, variables } => (idx, step, variables),
            };

            let step_id = step.id.clone();
            self.events.emit(Event::StepStarted {
                plan_id: plan_id.to_string(),
                step_id: step_id.clone(),
            });

            let memory_before = {
                let plans = self.plans.lock().expect("lock poisoned");
                plans
                    .get(plan_id)
                    .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?
                    .metrics
                    .start_step()
            };
            let started_at = Utc::now();
            let max_retries = if step.retryable { step.max_retries } else { 0 };
            let per_step_timeout = std::time::Duration::from_millis(self.config.timeout_per_step_ms);

            let mut attempt = 0;
            let result = loop {
                let registry = self.registry.clone();
                let step_for_call = step.clone();
                let vars_for_call = variables.clone();
                let attempt_started = std::time::Instant::now();

                let attempt_result = match tokio::time::timeout(
                    per_step_timeout,
                    tokio::task::spawn_blocking(move || {
                        let executor = StepExecutor::new(&registry);
                        executor.execute(&step_for_call, &vars_for_call)
                    }),
                )
                .await
                {
                    Ok(joined) => joined.expect("step worker panicked")?,
                    Err(_) => StepResult::failure(
                        EngineError::Timeout {
                            step_id: step_id.clone(),
                            elapsed_ms: attempt_started.elapsed().as_millis() as u64,
                        }
                        .to_string(),
                        attempt_started.elapsed().as_millis() as u64,
                        attempt,
                    ),
                };

                if attempt_result.success || attempt >= max_retries {
                    break attempt_result;
                }
                attempt += 1;
            };
            let retries_used = attempt;

            let mut plans = self.plans.lock().expect("lock poisoned");
            let entry = plans
                .get_mut(plan_id)
                .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;

            let modified_before = entry.plan.context.modified_files.len();

            {
                let step_mut = &mut entry.plan.steps[idx];
                step_mut.status = if result.success {
                    StepStatus::Completed
                } else {
                    StepStatus::Failed
                };
                step_mut.result = Some(result.clone());
                step_mut.start_time = Some(started_at);
                step_mut.end_time = Some(Utc::now());
            }

            let step_snapshot = entry.plan.steps[idx].clone();
            apply_result_to_context(&step_snapshot, &result, &mut entry.plan.context);

            let files_modified: Vec<String> = entry
                .plan
                .context
                .modified_files
                .iter()
                .skip(modified_before)
                .cloned()
                .collect();
            let bytes_written: u64 = files_modified
                .iter()
                .map(|path| {
                    std::fs::metadata(self.working_directory.join(path))
                        .map(|m| m.len())
                        .unwrap_or(0)
                })
                .sum();

            entry.metrics.finish_step(
                step_id.clone(),
                started_at,
                memory_before,
                retries_used,
                files_modified,
                bytes_written,
                result.success,
                result.error.clone(),
            );

            if result.success && is_git_tool(&step_snapshot.tool) {
                if let Some(op) = record_operation(&self.git_shell, &step_snapshot, &result) {
                    entry.git.record(op);
                }
            }

            if !result.success {
                self.events.emit(Event::StepFailed {
                    plan_id: plan_id.to_string(),
                    step_id: step_id.clone(),
                    error: result.error.clone().unwrap_or_default(),
                });
                entry.plan.transition_to(PlanStatus::Failed)?;
                save_plan_best_effort(self.store.as_ref(), &entry.plan);
                let _ = self.store.save_metrics(plan_id, &entry.metrics.finalize());
                self.events.emit(Event::PlanFailed {
                    plan_id: plan_id.to_string(),
                    step_id,
                    error: result.error.unwrap_or_default(),
                });
                return Ok(());
            }

            self.events.emit(Event::StepCompleted {
                plan_id: plan_id.to_string(),
                step_id,
                output: result.output.clone(),
            });

            entry.plan.current_step = idx + 1;

            if self.config.enable_checkpoints
                && self.config.checkpoint_every > 0
                && entry.plan.current_step % self.config.checkpoint_every == 0
            {
                let checkpoint_id = create_checkpoint(
                    &mut entry.plan,
                    &self.snapshots,
                    &step_snapshot.id,
                    format!("after {}", step_snapshot.id),
                )?;
                self.events.emit(Event::CheckpointCreated {
                    plan_id: plan_id.to_string(),
                    checkpoint_id,
                });
            }

            save_plan_best_effort(self.store.as_ref(), &entry.plan);
        }
    }

    async fn execute_parallel(&self, plan_id: &str) -> Result<(), EngineError> {
        let (steps, variables) = {
            let plans = self.plans.lock().expect("lock poisoned");
            let entry = plans
                .get(plan_id)
                .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;
            (entry.plan.steps.clone(), entry.plan.context.variables.clone())
        };

        let report = analyze_parallelizability(&steps)?;

        let registry = self.registry.clone();
        let runner: StepRunner = Arc::new(move |step, vars| {
            let executor = StepExecutor::new(&registry);
            executor.execute(step, vars)
        });

        let per_step_timeout = std::time::Duration::from_millis(self.config.timeout_per_step_ms);
        let outcome = run_parallel(
            &steps,
            self.config.max_concurrent_steps,
            variables,
            runner,
            per_step_timeout,
        )
        .await?;

        let mut plans = self.plans.lock().expect("lock poisoned");
        let entry = plans
            .get_mut(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))?;

        entry.metrics.set_parallel_info(ParallelInfo {
            max_parallelism: report.max_parallelism,
            estimated_speedup: report.estimated_speedup,
        });

        let mut settled = Vec::new();
        for (idx, result) in outcome.results.into_iter().enumerate() {
            let Some(result) = result else { continue };
            {
                let step = &mut entry.plan.steps[idx];
                step.status = if result.success {
                    StepStatus::Completed
                } else {
                    StepStatus::Failed
                };
                step.result = Some(result.clone());
                step.end_time = Some(Utc::now());
            }
            settled.push((idx, result));
        }

        for (idx, result) in &settled {
            let step = entry.plan.steps[*idx].clone();
            apply_result_to_context(&step, result, &mut entry.plan.context);
            if result.success && is_git_tool(&step.tool) {
                if let Some(op) = record_operation(&self.git_shell, &step, result) {
                    entry.git.record(op);
                }
            }
            let event = if result.success {
                Event::StepCompleted {
                    plan_id: plan_id.to_string(),
                    step_id: step.id.clone(),
                    output: result.output.clone(),
                }
            } else {
                Event::StepFailed {
                    plan_id: plan_id.to_string(),
                    step_id: step.id.clone(),
                    error: result.error.clone().unwrap_or_default(),
                }
            };
            self.events.emit(event);
        }

        entry.plan.current_step = entry.plan.steps.len();

        if let Some((step_id, error)) = outcome.first_error {
            entry.plan.transition_to(PlanStatus::Failed)?;
            save_plan_best_effort(self.store.as_ref(), &entry.plan);
            let _ = self.store.save_metrics(plan_id, &entry.metrics.finalize());
            self.events.emit(Event::PlanFailed {
                plan_id: plan_id.to_string(),
                step_id,
                error,
            });
        } else {
            entry.plan.transition_to(PlanStatus::Completed)?;
            save_plan_best_effort(self.store.as_ref(), &entry.plan);
            let _ = self.store.save_metrics(plan_id, &entry.metrics.finalize());
            self.events.emit(Event::PlanCompleted {
                plan_id: plan_id.to_string(),
            });
        }

        Ok(())
    }
}
