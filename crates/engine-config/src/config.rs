use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Engine-wide tunables (§6 "recognized options"). Loaded from a TOML
/// file; every field has a sensible default so a missing file behaves
/// like an all-defaults configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_per_step_ms")]
    pub timeout_per_step_ms: u64,
    #[serde(default = "default_true")]
    pub enable_checkpoints: bool,
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    #[serde(default = "default_max_concurrent_steps")]
    pub max_concurrent_steps: usize,
}

fn default_max_steps() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_per_step_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_checkpoint_every() -> usize {
    5
}

fn default_max_concurrent_steps() -> usize {
    4
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_retries: default_max_retries(),
            timeout_per_step_ms: default_timeout_per_step_ms(),
            enable_checkpoints: true,
            checkpoint_every: default_checkpoint_every(),
            max_concurrent_steps: default_max_concurrent_steps(),
        }
    }
}

impl Configuration {
    /// Load from `path`. Returns the default configuration if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Whether the parallel executor may be used at all (§4.1.1).
    pub fn parallel_enabled(&self) -> bool {
        self.max_concurrent_steps > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_nonexistent_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Configuration::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.max_steps, default_max_steps());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Configuration::default();
        config.max_steps = 42;
        config.max_concurrent_steps = 8;
        config.save(&path).unwrap();

        let loaded = Configuration::load(&path).unwrap();
        assert_eq!(loaded.max_steps, 42);
        assert_eq!(loaded.max_concurrent_steps, 8);
    }

    #[test]
    fn parallel_enabled_requires_more_than_one_worker() {
        let mut config = Configuration::default();
        config.max_concurrent_steps = 1;
        assert!(!config.parallel_enabled());
        config.max_concurrent_steps = 2;
        assert!(config.parallel_enabled());
    }
}
