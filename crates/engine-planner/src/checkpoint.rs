use chrono::Utc;
use engine_core::{Checkpoint, EngineError, Plan, PlanStatus, StepStatus};
use engine_git::GitRollbackManager;
use engine_snapshot::SnapshotManager;
use ulid::Ulid;

/// Snapshot every path in `Context.ModifiedFiles`, copy `Context.Variables`,
/// record currently-Completed step ids, and append the checkpoint (§4.1.2
/// "Checkpoint creation").
pub fn create_checkpoint(
    plan: &mut Plan,
    snapshots: &SnapshotManager,
    step_id: &str,
    description: impl Into<String>,
) -> Result<String, EngineError> {
    let checkpoint_id = format!("chk_{}", Ulid::new());

    let captured = snapshots
        .create_snapshot(&plan.id, &checkpoint_id, &plan.context.modified_files)
        .map_err(|e| EngineError::Io(std::io::Error::other(e.to_string())))?;

    let file_snapshots = captured
        .into_iter()
        .map(|s| (s.file_path, checkpoint_id.clone()))
        .collect();

    let completed_steps = plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .map(|s| s.id.clone())
        .collect();

    plan.checkpoints.push(Checkpoint {
        id: checkpoint_id.clone(),
        step_id: step_id.to_string(),
        timestamp: Utc::now(),
        description: description.into(),
        completed_steps,
        variables: plan.context.variables.clone(),
        file_snapshots,
    });

    Ok(checkpoint_id)
}

/// Restore a plan to `checkpoint_id` (§4.1.2 "Rollback"). File restoration
/// always precedes git inversion.
pub fn rollback_to_checkpoint(
    plan: &mut Plan,
    snapshots: &SnapshotManager,
    git: &mut GitRollbackManager,
    git_shell: &engine_git::GitShell,
    checkpoint_id: &str,
) -> Result<(), EngineError> {
    let checkpoint_index = plan
        .checkpoints
        .iter()
        .position(|c| c.id == checkpoint_id)
        .ok_or_else(|| EngineError::CheckpointNotFound(checkpoint_id.to_string()))?;
    let checkpoint = plan.checkpoints[checkpoint_index].clone();

    plan.current_step = checkpoint.completed_steps.len();
    plan.context.variables = checkpoint.variables.clone();

    for (idx, step) in plan.steps.iter_mut().enumerate() {
        if idx >= plan.current_step || !checkpoint.completed_steps.contains(&step.id) {
            step.reset();
        }
    }

    plan.checkpoints.truncate(checkpoint_index + 1);

    let restored = snapshots
        .restore_snapshot(checkpoint_id)
        .map_err(|e| EngineError::Io(std::io::Error::other(e.to_string())))?;
    plan.context.modified_files = restored;

    let step_id = checkpoint.step_id.clone();
    git.rollback_to_step(git_shell, &step_id)?;

    plan.transition_to(PlanStatus::Paused)?;
    Ok(())
}
