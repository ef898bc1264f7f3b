use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Lifecycle status of a [`Plan`]. Transitions are enforced by
/// [`PlanStatus::can_transition_to`]; terminal states never leave themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Pending,
    Planning,
    Executing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanStatus::Pending => "Pending",
            PlanStatus::Planning => "Planning",
            PlanStatus::Executing => "Executing",
            PlanStatus::Paused => "Paused",
            PlanStatus::Completed => "Completed",
            PlanStatus::Failed => "Failed",
            PlanStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal state-machine edge.
    pub fn can_transition_to(self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Executing)
                | (Pending, Cancelled)
                | (Executing, Paused)
                | (Paused, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Pending, Failed)
                | (Executing, Cancelled)
                | (Paused, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Retrying,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "Pending",
            StepStatus::Running => "Running",
            StepStatus::Completed => "Completed",
            StepStatus::Failed => "Failed",
            StepStatus::Skipped => "Skipped",
            StepStatus::Retrying => "Retrying",
        };
        f.write_str(s)
    }
}

/// Output of a single tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    pub retries: u32,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(output: Value, duration_ms: u64, retries: u32) -> Self {
        Self {
            success: true,
            output,
            error: None,
            retries,
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64, retries: u32) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            retries,
            duration_ms,
        }
    }
}

/// Immutable description plus mutable execution record of one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub tool: String,
    pub params: HashMap<String, Value>,
    pub depends_on: Vec<String>,
    pub retryable: bool,
    pub max_retries: u32,

    pub status: StepStatus,
    pub result: Option<StepResult>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Step {
    pub fn new(id: impl Into<String>, tool: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tool: tool.into(),
            params: HashMap::new(),
            depends_on: Vec::new(),
            retryable: false,
            max_retries: 0,
            status: StepStatus::Pending,
            result: None,
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_retry(mut self, max_retries: u32) -> Self {
        self.retryable = max_retries > 0;
        self.max_retries = max_retries;
        self
    }

    /// Reset execution state to Pending, as performed by rollback.
    pub fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.result = None;
        self.start_time = None;
        self.end_time = None;
    }
}

/// Per-plan shared mutable state threaded through every step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    pub working_directory: String,
    pub environment: HashMap<String, String>,
    pub variables: HashMap<String, Value>,
    pub files: Vec<String>,
    pub modified_files: Vec<String>,
}

impl TaskContext {
    pub fn new(working_directory: impl Into<String>) -> Self {
        Self {
            working_directory: working_directory.into(),
            ..Default::default()
        }
    }

    /// Append a path to `modified_files`, deduplicating.
    pub fn record_modified(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.modified_files.contains(&path) {
            self.modified_files.push(path);
        }
    }
}

/// A restorable point in a plan's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub step_id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub completed_steps: Vec<String>,
    pub variables: HashMap<String, Value>,
    /// filepath -> checkpoint id at which the file's bytes are retrievable.
    pub file_snapshots: HashMap<String, String>,
}

/// A persisted, content-addressed file capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub snapshot_id: String,
    pub plan_id: String,
    pub checkpoint_id: String,
    pub file_path: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub hash: String,
    pub file_mode: u32,
    pub created_at: DateTime<Utc>,
}

impl FileSnapshot {
    pub fn hash_of(content: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }
}

/// Tracked VCS-mutating operation, used to compute inversions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitOperation {
    pub op_type: String,
    pub commit_hash: Option<String>,
    pub branch: Option<String>,
    pub prev_branch: Option<String>,
    pub remote_name: Option<String>,
    pub merge_commit: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub step_id: String,
    pub params: HashMap<String, Value>,
}

/// Root execution aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub description: String,
    pub steps: Vec<Step>,
    pub current_step: usize,
    pub checkpoints: Vec<Checkpoint>,
    pub context: TaskContext,
    pub status: PlanStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Plan {
    pub fn new(id: impl Into<String>, description: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            steps,
            current_step: 0,
            checkpoints: Vec::new(),
            context: TaskContext::default(),
            status: PlanStatus::Pending,
            start_time: None,
            end_time: None,
            completed_at: None,
        }
    }

    /// Attempt a status transition, enforcing the state machine in §4.1.
    pub fn transition_to(&mut self, next: PlanStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::IllegalStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.end_time = Some(Utc::now());
            if next == PlanStatus::Completed {
                self.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }
}
