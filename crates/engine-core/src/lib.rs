//! Core data model and tool contract shared by every other engine crate:
//! Plan/Step/Checkpoint/TaskContext types, the error taxonomy, and the
//! tool registry trait the step executor dispatches through.

pub mod error;
pub mod tool;
pub mod types;

pub use error::EngineError;
pub use tool::{PropertyType, Tool, ToolOutput, ToolRegistry, ToolSchema};
pub use types::{
    Checkpoint, FileSnapshot, GitOperation, Plan, PlanStatus, Step, StepResult, StepStatus,
    TaskContext,
};
