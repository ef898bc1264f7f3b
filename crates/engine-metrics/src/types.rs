use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetrics {
    pub step_id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub retries: u32,
    pub memory_before_mb: u64,
    pub memory_after_mb: u64,
    pub files_modified: Vec<String>,
    pub bytes_written: u64,
    pub success: bool,
    pub error: Option<String>,
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParallelInfo {
    pub max_parallelism: usize,
    pub estimated_speedup: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub plan_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub total_duration_ms: u64,
    pub parallel_info: Option<ParallelInfo>,
    pub steps: Vec<StepMetrics>,
}
