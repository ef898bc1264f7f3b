use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use engine_core::FileSnapshot;

use crate::lockfile;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata index corrupt: {0}")]
    IndexCorrupt(String),
    #[error("integrity check failed for hash {expected}: blob content hashes to {actual}")]
    Integrity { expected: String, actual: String },
    #[error("no blob on disk for hash {0}")]
    BlobMissing(String),
}

pub(crate) fn io_err(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Content-addressed file store rooted at `snapshots_root`. Blobs live at
/// `<root>/<hash[0:2]>/<hash[2:]>`, written exactly once per hash (§4.4,
/// §6 "Snapshot on-disk layout"). A sibling `index.json`, guarded by an
/// `flock`-backed lock, holds the metadata rows.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self { root })
    }

    pub fn blob_path(&self, hash: &str) -> PathBuf {
        let (prefix, rest) = hash.split_at(2.min(hash.len()));
        self.root.join(prefix).join(rest)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join("index.lock")
    }

    /// Write `content` under its hash if not already present. Returns the
    /// hash. Idempotent: two calls with identical bytes write one blob (P1/P2).
    pub fn write_blob(&self, content: &[u8]) -> Result<String, SnapshotError> {
        let hash = FileSnapshot::hash_of(content);
        let path = self.blob_path(&hash);
        if path.exists() {
            return Ok(hash);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let mut file = fs::File::create(&path).map_err(|e| io_err(&path, e))?;
        file.write_all(content).map_err(|e| io_err(&path, e))?;
        file.set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| io_err(&path, e))?;
        Ok(hash)
    }

    pub fn read_blob(&self, hash: &str) -> Result<Vec<u8>, SnapshotError> {
        let path = self.blob_path(hash);
        fs::read(&path).map_err(|_| SnapshotError::BlobMissing(hash.to_string()))
    }

    fn load_index(&self) -> Result<Vec<FileSnapshot>, SnapshotError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| SnapshotError::IndexCorrupt(e.to_string()))
    }

    fn save_index(&self, rows: &[FileSnapshot]) -> Result<(), SnapshotError> {
        let path = self.index_path();
        let raw = serde_json::to_string_pretty(rows)
            .map_err(|e| SnapshotError::IndexCorrupt(e.to_string()))?;
        fs::write(&path, raw).map_err(|e| io_err(&path, e))
    }

    /// Idempotent upsert keyed by `(checkpoint_id, file_path)`.
    pub fn save_snapshot(&self, snapshot: FileSnapshot) -> Result<(), SnapshotError> {
        lockfile::with_lock(&self.lock_path(), || {
            let mut rows = self.load_index()?;
            if let Some(existing) = rows.iter_mut().find(|r| {
                r.checkpoint_id == snapshot.checkpoint_id && r.file_path == snapshot.file_path
            }) {
                *existing = snapshot.clone();
            } else {
                rows.push(snapshot.clone());
            }
            self.save_index(&rows)
        })
    }

    pub fn get_snapshots(&self, checkpoint_id: &str) -> Result<Vec<FileSnapshot>, SnapshotError> {
        let rows = self.load_index()?;
        Ok(rows
            .into_iter()
            .filter(|r| r.checkpoint_id == checkpoint_id)
            .collect())
    }

    pub fn get_snapshot_by_hash(&self, hash: &str) -> Result<Option<FileSnapshot>, SnapshotError> {
        let rows = self.load_index()?;
        Ok(rows.into_iter().find(|r| r.hash == hash))
    }

    /// Recompute the blob's hash and compare to the recorded one (P1).
    pub fn verify_snapshot(&self, snapshot: &FileSnapshot) -> Result<(), SnapshotError> {
        let bytes = self.read_blob(&snapshot.hash)?;
        let actual = FileSnapshot::hash_of(&bytes);
        if actual != snapshot.hash {
            return Err(SnapshotError::Integrity {
                expected: snapshot.hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Delete blobs whose mtime predates `retention_days`. Metadata rows
    /// are left untouched; a stale row simply fails `VerifySnapshot` or
    /// restore, which is how staleness is detected (§4.4).
    pub fn cleanup_old_snapshots(&self, retention_days: u64) -> Result<usize, SnapshotError> {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(retention_days * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut deleted = 0;
        if !self.root.exists() {
            return Ok(0);
        }
        for prefix_entry in fs::read_dir(&self.root).map_err(|e| io_err(&self.root, e))? {
            let prefix_entry = prefix_entry.map_err(|e| io_err(&self.root, e))?;
            if !prefix_entry.path().is_dir() {
                continue;
            }
            for blob_entry in fs::read_dir(prefix_entry.path())
                .map_err(|e| io_err(&prefix_entry.path(), e))?
            {
                let blob_entry = blob_entry.map_err(|e| io_err(&prefix_entry.path(), e))?;
                let meta = blob_entry.metadata().map_err(|e| io_err(&blob_entry.path(), e))?;
                let mtime = meta.modified().unwrap_or(SystemTime::now());
                if mtime < cutoff {
                    fs::remove_file(blob_entry.path()).map_err(|e| io_err(&blob_entry.path(), e))?;
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub fn new_snapshot_id() -> String {
    format!("snap_{}", ulid::Ulid::new())
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}
