use engine_core::{EngineError, GitOperation};

use crate::shell::GitShell;

/// Tracks git operations recorded during a plan's execution and inverts
/// them on rollback (§4.5).
#[derive(Default)]
pub struct GitRollbackManager {
    operations: Vec<GitOperation>,
}

impl GitRollbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: GitOperation) {
        self.operations.push(op);
    }

    pub fn operations(&self) -> &[GitOperation] {
        &self.operations
    }

    /// Invert `op` per the type-specific rule in §4.5. Returns `Ok(())` on
    /// success or on a recognized no-op type.
    pub fn invert(shell: &GitShell, op: &GitOperation) -> Result<(), EngineError> {
        match op.op_type.as_str() {
            "git_commit" => invert_commit(shell, op),
            "git_merge" => invert_merge(shell, op),
            "git_checkout" => invert_checkout(shell, op),
            "git_branch" => invert_branch(shell, op),
            "git_push" => Err(manual_intervention_push(op)),
            _ => Ok(()),
        }
    }

    /// Collect operations in reverse insertion order through (and including)
    /// the one whose `step_id` equals `step_id`, invert each in that order,
    /// and on success drop them from the tracked list. Aborts on the first
    /// non-refusal error, leaving already-reverted operations dropped and
    /// the rest (including the failing one) intact.
    pub fn rollback_to_step(&mut self, shell: &GitShell, step_id: &str) -> Result<usize, EngineError> {
        let Some(boundary) = self.operations.iter().rposition(|op| op.step_id == step_id) else {
            return Ok(0);
        };

        let mut reverted = 0;
        while self.operations.len() > boundary {
            let op = self.operations.last().expect("non-empty by loop guard");
            Self::invert(shell, op)?;
            self.operations.pop();
            reverted += 1;
        }
        Ok(reverted)
    }
}

fn invert_commit(shell: &GitShell, op: &GitOperation) -> Result<(), EngineError> {
    let Some(hash) = &op.commit_hash else {
        return Ok(());
    };
    if shell.is_on_remote(hash)? {
        shell.run(&["revert", "--no-edit", hash])?;
    } else {
        shell.run(&["reset", "--hard", "HEAD~1"])?;
    }
    Ok(())
}

fn invert_merge(shell: &GitShell, op: &GitOperation) -> Result<(), EngineError> {
    let Some(merge_commit) = &op.merge_commit else {
        return Ok(());
    };
    if shell.is_on_remote(merge_commit)? {
        shell.run(&["revert", "-m", "1", "--no-edit", merge_commit])?;
    } else {
        shell.run(&["reset", "--hard", "HEAD~1"])?;
    }
    Ok(())
}

fn invert_checkout(shell: &GitShell, op: &GitOperation) -> Result<(), EngineError> {
    if let Some(prev) = &op.prev_branch {
        shell.run(&["checkout", prev])?;
    }
    Ok(())
}

fn invert_branch(shell: &GitShell, op: &GitOperation) -> Result<(), EngineError> {
    let Some(branch) = &op.branch else {
        return Ok(());
    };
    if shell.is_branch_pushed(branch)? {
        return Err(EngineError::ManualInterventionRequired {
            reason: format!("branch '{branch}' has already been pushed, refusing to delete it"),
            suggested_command: Some(format!("git push <remote> --delete {branch}")),
        });
    }

    if shell.current_branch().ok().as_deref() == Some(branch.as_str()) {
        let main = shell.detect_main_branch()?;
        shell.run(&["checkout", &main])?;
    }
    shell.run(&["branch", "-D", branch])?;
    Ok(())
}

fn manual_intervention_push(op: &GitOperation) -> EngineError {
    let remote = op.remote_name.clone().unwrap_or_else(|| "origin".to_string());
    let branch = op.branch.clone().unwrap_or_else(|| "HEAD".to_string());
    EngineError::ManualInterventionRequired {
        reason: "pushed commits cannot be reverted automatically".to_string(),
        suggested_command: Some(format!(
            "git push --force-with-lease {remote} {branch}~1:{branch}"
        )),
    }
}
