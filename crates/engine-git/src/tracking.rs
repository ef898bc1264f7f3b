use chrono::Utc;
use engine_core::{GitOperation, Step, StepResult};
use serde_json::Value;

use crate::shell::GitShell;

fn param_str(step: &Step, key: &str) -> Option<String> {
    step.params.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn output_str(result: &StepResult, key: &str) -> Option<String> {
    result.output.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Build the [`GitOperation`] recorded for a successful `git_*` step, per
/// §4.5 "Tracking": commit hash from tool output when applicable, current
/// branch from the shell, remote/branch from the step's own parameters.
pub fn record_operation(shell: &GitShell, step: &Step, result: &StepResult) -> Option<GitOperation> {
    if !step.tool.starts_with("git_") || !result.success {
        return None;
    }

    let commit_hash = output_str(result, "commit_hash").or_else(|| shell.short_head().ok());
    let branch = shell.current_branch().ok();
    let prev_branch = param_str(step, "prev_branch");
    let remote_name = param_str(step, "remote").or_else(|| param_str(step, "remote_name"));
    let merge_commit = output_str(result, "merge_commit");

    Some(GitOperation {
        op_type: step.tool.clone(),
        commit_hash,
        branch,
        prev_branch,
        remote_name,
        merge_commit,
        timestamp: Utc::now(),
        step_id: step.id.clone(),
        params: step.params.clone(),
    })
}

pub fn is_git_tool(tool: &str) -> bool {
    tool.starts_with("git_")
}
