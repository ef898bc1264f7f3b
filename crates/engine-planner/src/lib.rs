//! Planner: the central orchestrator. Turns a description or template into
//! a `Plan`, executes it sequentially or in parallel depending on the
//! declared dependency shape, checkpoints and rolls back file and git
//! state, and persists/broadcasts progress as it goes.

pub mod checkpoint;
pub mod events;
pub mod persistence;
pub mod planner;
pub mod strategy;

pub use checkpoint::{create_checkpoint, rollback_to_checkpoint};
pub use events::{Event, EventBus};
pub use persistence::{save_plan_best_effort, FileBackedStore, PlanStore};
pub use planner::Planner;
pub use strategy::{select_strategy, Strategy};
