use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use engine_core::FileSnapshot;

use crate::store::{new_snapshot_id, SnapshotError, SnapshotStore};

/// Coordinates snapshot capture and restore for a single plan's working
/// directory against a [`SnapshotStore`] (§4.4).
pub struct SnapshotManager {
    store: SnapshotStore,
    working_directory: PathBuf,
}

impl SnapshotManager {
    pub fn new(store: SnapshotStore, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            store,
            working_directory: working_directory.into(),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        self.working_directory.join(relative)
    }

    /// Capture the current bytes of each of `files` under `checkpoint_id`.
    /// Files that do not exist yet are skipped, not an error: the checkpoint
    /// still records their path was considered (§4.4 "read-skip-if-absent").
    pub fn create_snapshot(
        &self,
        plan_id: &str,
        checkpoint_id: &str,
        files: &[String],
    ) -> Result<Vec<FileSnapshot>, SnapshotError> {
        let mut captured = Vec::new();
        for relative in files {
            let abs = self.resolve(relative);
            if !abs.exists() {
                continue;
            }
            let content = fs::read(&abs).map_err(|e| SnapshotError::Io {
                path: abs.clone(),
                source: e,
            })?;
            let mode = fs::metadata(&abs)
                .map(|m| m.permissions().mode() & 0o777)
                .unwrap_or(0o644);
            let hash = self.store.write_blob(&content)?;

            let snapshot = FileSnapshot {
                snapshot_id: new_snapshot_id(),
                plan_id: plan_id.to_string(),
                checkpoint_id: checkpoint_id.to_string(),
                file_path: relative.clone(),
                content: Vec::new(),
                hash,
                file_mode: mode,
                created_at: Utc::now(),
            };
            self.store.save_snapshot(snapshot.clone())?;
            captured.push(snapshot);
        }
        Ok(captured)
    }

    /// Restore every file recorded at `checkpoint_id`. Best-effort: each
    /// existing file is backed up alongside itself before being overwritten,
    /// so a mid-restore failure leaves recoverable state rather than a
    /// half-written tree.
    pub fn restore_snapshot(&self, checkpoint_id: &str) -> Result<Vec<String>, SnapshotError> {
        let rows = self.store.get_snapshots(checkpoint_id)?;
        let mut restored = Vec::new();
        for row in &rows {
            self.restore_row(row)?;
            restored.push(row.file_path.clone());
        }
        Ok(restored)
    }

    pub fn restore_file(&self, checkpoint_id: &str, path: &str) -> Result<(), SnapshotError> {
        let rows = self.store.get_snapshots(checkpoint_id)?;
        let row = rows
            .iter()
            .find(|r| r.file_path == path)
            .ok_or_else(|| SnapshotError::BlobMissing(path.to_string()))?;
        self.restore_row(row)
    }

    fn restore_row(&self, row: &FileSnapshot) -> Result<(), SnapshotError> {
        let abs = self.resolve(&row.file_path);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).map_err(|e| SnapshotError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        if abs.exists() {
            let backup = backup_path(&abs);
            let _ = fs::copy(&abs, backup);
        }

        let content = self.store.read_blob(&row.hash)?;
        fs::write(&abs, &content).map_err(|e| SnapshotError::Io {
            path: abs.clone(),
            source: e,
        })?;
        fs::set_permissions(&abs, fs::Permissions::from_mode(row.file_mode)).map_err(|e| {
            SnapshotError::Io {
                path: abs.clone(),
                source: e,
            }
        })?;
        Ok(())
    }
}

fn backup_path(original: &Path) -> PathBuf {
    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamped = format!("{name}.backup.{}", Utc::now().format("%Y%m%dT%H%M%S%.fZ"));
    original.with_file_name(stamped)
}
