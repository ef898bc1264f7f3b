use std::fmt::Write as _;

use chrono::Utc;

use crate::memory::current_process_memory_mb;
use crate::types::{ParallelInfo, PlanMetrics, StepMetrics};

/// Accumulates per-step timing/memory/IO observations for one plan run and
/// produces the `PlanMetrics` plus a human-readable report on completion.
pub struct MetricsCollector {
    plan_id: String,
    start: chrono::DateTime<Utc>,
    steps: Vec<StepMetrics>,
    parallel_info: Option<ParallelInfo>,
}

impl MetricsCollector {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            start: Utc::now(),
            steps: Vec::new(),
            parallel_info: None,
        }
    }

    pub fn set_parallel_info(&mut self, info: ParallelInfo) {
        self.parallel_info = Some(info);
    }

    /// Sample memory now; pair with [`finish_step`] once the step returns.
    pub fn start_step(&self) -> u64 {
        current_process_memory_mb()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn finish_step(
        &mut self,
        step_id: impl Into<String>,
        started_at: chrono::DateTime<Utc>,
        memory_before_mb: u64,
        retries: u32,
        files_modified: Vec<String>,
        bytes_written: u64,
        success: bool,
        error: Option<String>,
    ) {
        let end = Utc::now();
        let duration_ms = (end - started_at).num_milliseconds().max(0) as u64;
        self.steps.push(StepMetrics {
            step_id: step_id.into(),
            start: started_at,
            end: Some(end),
            duration_ms,
            retries,
            memory_before_mb,
            memory_after_mb: current_process_memory_mb(),
            files_modified,
            bytes_written,
            success,
            error,
            skipped: false,
        });
    }

    /// Record a step that never reached the executor because its
    /// dependencies weren't all `Completed` (§4.1.1 point 2). Kept separate
    /// from [`Self::finish_step`] so `finalize`'s `skipped` count doesn't
    /// collapse into `failed`.
    pub fn record_skipped(&mut self, step_id: impl Into<String>, reason: impl Into<String>) {
        let now = Utc::now();
        self.steps.push(StepMetrics {
            step_id: step_id.into(),
            start: now,
            end: Some(now),
            duration_ms: 0,
            retries: 0,
            memory_before_mb: 0,
            memory_after_mb: current_process_memory_mb(),
            files_modified: Vec::new(),
            bytes_written: 0,
            success: false,
            error: Some(reason.into()),
            skipped: true,
        });
    }

    pub fn finalize(&self) -> PlanMetrics {
        let completed = self.steps.iter().filter(|s| s.success).count();
        let skipped = self.steps.iter().filter(|s| s.skipped).count();
        let failed = self.steps.iter().filter(|s| !s.success && !s.skipped).count();
        let end = Utc::now();
        PlanMetrics {
            plan_id: self.plan_id.clone(),
            total: self.steps.len(),
            completed,
            failed,
            skipped,
            start: self.start,
            end: Some(end),
            total_duration_ms: (end - self.start).num_milliseconds().max(0) as u64,
            parallel_info: self.parallel_info,
            steps: self.steps.clone(),
        }
    }
}

/// Render a `PlanMetrics` as the formatted textual report emitted on plan
/// completion (§4.7).
pub fn format_report(metrics: &PlanMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Plan {}", metrics.plan_id);
    let _ = writeln!(
        out,
        "  steps: {} total, {} completed, {} failed, {} skipped",
        metrics.total, metrics.completed, metrics.failed, metrics.skipped
    );
    let _ = writeln!(out, "  duration: {}ms", metrics.total_duration_ms);
    if let Some(info) = metrics.parallel_info {
        let _ = writeln!(
            out,
            "  parallelism: max {} steps, {:.1}x estimated speedup",
            info.max_parallelism, info.estimated_speedup
        );
    }
    for step in &metrics.steps {
        let _ = writeln!(
            out,
            "  - {} [{}] {}ms, {} retries, mem {}->{}MB, {} files, {} bytes{}",
            step.step_id,
            if step.success { "ok" } else { "fail" },
            step.duration_ms,
            step.retries,
            step.memory_before_mb,
            step.memory_after_mb,
            step.files_modified.len(),
            step.bytes_written,
            step.error.as_ref().map(|e| format!(" ({e})")).unwrap_or_default(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_counts_success_and_failure() {
        let mut collector = MetricsCollector::new("p1");
        let t0 = Utc::now();
        collector.finish_step("s1", t0, 10, 0, vec!["a.txt".to_string()], 5, true, None);
        collector.finish_step("s2", t0, 10, 1, vec![], 0, false, Some("boom".to_string()));

        let metrics = collector.finalize();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.failed, 1);
    }

    #[test]
    fn skipped_steps_are_counted_separately_from_failures() {
        let mut collector = MetricsCollector::new("p1");
        let t0 = Utc::now();
        collector.finish_step("s1", t0, 10, 0, vec![], 0, false, Some("boom".to_string()));
        collector.record_skipped("s2", "dependencies not satisfied");

        let metrics = collector.finalize();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.skipped, 1);
    }

    #[test]
    fn format_report_includes_plan_and_step_lines() {
        let mut collector = MetricsCollector::new("p1");
        let t0 = Utc::now();
        collector.finish_step("s1", t0, 10, 0, vec![], 0, true, None);
        collector.set_parallel_info(ParallelInfo {
            max_parallelism: 3,
            estimated_speedup: 2.0,
        });

        let report = format_report(&collector.finalize());
        assert!(report.contains("Plan p1"));
        assert!(report.contains("s1"));
        assert!(report.contains("2.0x estimated speedup"));
    }
}
