//! Snapshot Store & File Rollback: content-addressed blob storage for file
//! bytes captured at checkpoints, plus the manager that captures and
//! restores a plan's working-directory files against that store.

pub mod lockfile;
pub mod manager;
pub mod store;

pub use manager::SnapshotManager;
pub use store::{new_snapshot_id, SnapshotError, SnapshotStore};
