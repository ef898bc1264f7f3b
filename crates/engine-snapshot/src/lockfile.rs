//! Advisory locking for the metadata index, backed by `fd-lock`, the same
//! crate the teacher's todo store uses to guard concurrent writers.

use std::fs::OpenOptions;
use std::path::Path;

use crate::store::{io_err, SnapshotError};

/// Acquire a blocking exclusive lock on `lock_path` (creating it if absent),
/// run `f`, then release. Mirrors the teacher's `with_write_lock` shape.
pub fn with_lock<T>(
    lock_path: &Path,
    f: impl FnOnce() -> Result<T, SnapshotError>,
) -> Result<T, SnapshotError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| io_err(lock_path, e))?;

    let mut lock = fd_lock::RwLock::new(file);
    let _guard = lock
        .write()
        .map_err(|e| io_err(lock_path, e))?;

    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_lock_creates_lock_file_and_runs_closure() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("index.lock");
        let ran = with_lock(&lock_path, || Ok::<_, SnapshotError>(42)).unwrap();
        assert_eq!(ran, 42);
        assert!(lock_path.exists());
    }

    #[test]
    fn lock_can_be_reacquired_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("index.lock");
        with_lock(&lock_path, || Ok::<_, SnapshotError>(())).unwrap();
        with_lock(&lock_path, || Ok::<_, SnapshotError>(())).unwrap();
    }
}
