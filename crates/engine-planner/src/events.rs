use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Observable lifecycle events emitted to an external broadcaster (§6
/// "Event contract").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    PlanCreated { plan_id: String },
    PlanStarted { plan_id: String },
    StepStarted { plan_id: String, step_id: String },
    StepCompleted { plan_id: String, step_id: String, output: Value },
    StepFailed { plan_id: String, step_id: String, error: String },
    StepSkipped { plan_id: String, step_id: String },
    CheckpointCreated { plan_id: String, checkpoint_id: String },
    RollbackPerformed { plan_id: String, checkpoint_id: String },
    PlanCompleted { plan_id: String },
    PlanFailed { plan_id: String, step_id: String, error: String },
    PlanCancelled { plan_id: String },
}

/// Thin wrapper over a `tokio::sync::broadcast` channel. Dropped events
/// (no subscriber listening) are not an error: the core does not depend
/// on delivery.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
