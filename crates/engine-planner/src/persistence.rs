use std::fs;
use std::path::PathBuf;

use engine_core::Plan;
use engine_metrics::PlanMetrics;
use tracing::warn;

/// Persistence contract the Planner consumes (§6). A failure here is
/// logged as a warning and never fails the plan (§7 propagation policy).
pub trait PlanStore: Send + Sync {
    fn save_plan(&self, plan: &Plan) -> anyhow::Result<()>;
    fn get_plan(&self, plan_id: &str) -> anyhow::Result<Option<Plan>>;
    fn save_metrics(&self, plan_id: &str, metrics: &PlanMetrics) -> anyhow::Result<()>;
}

/// File-backed JSON store: one file per plan under `root/plans/` and one
/// per metrics snapshot under `root/metrics/`.
pub struct FileBackedStore {
    root: PathBuf,
}

impl FileBackedStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn plan_path(&self, plan_id: &str) -> PathBuf {
        self.root.join("plans").join(format!("{plan_id}.json"))
    }

    fn metrics_path(&self, plan_id: &str) -> PathBuf {
        self.root.join("metrics").join(format!("{plan_id}.json"))
    }
}

impl PlanStore for FileBackedStore {
    fn save_plan(&self, plan: &Plan) -> anyhow::Result<()> {
        let path = self.plan_path(&plan.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(plan)?)?;
        Ok(())
    }

    fn get_plan(&self, plan_id: &str) -> anyhow::Result<Option<Plan>> {
        let path = self.plan_path(plan_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save_metrics(&self, plan_id: &str, metrics: &PlanMetrics) -> anyhow::Result<()> {
        let path = self.metrics_path(plan_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(metrics)?)?;
        Ok(())
    }
}

/// Persist `plan`, logging (never propagating) any failure.
pub fn save_plan_best_effort(store: &dyn PlanStore, plan: &Plan) {
    if let Err(e) = store.save_plan(plan) {
        warn!(plan_id = %plan.id, error = %e, "failed to persist plan progress");
    }
}
