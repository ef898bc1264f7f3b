use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use engine_core::EngineError;

/// Validate a revision/branch spec to prevent option injection through
/// recorded `GitOperation` fields.
pub fn validate_revision(rev: &str) -> Result<(), EngineError> {
    if rev.starts_with('-') {
        return Err(EngineError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid revision '{rev}': must not start with '-'"),
        )));
    }
    Ok(())
}

/// Thin wrapper around shelling out to `git` in a fixed working directory.
pub struct GitShell {
    repo_dir: PathBuf,
}

impl GitShell {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Run `git <args>`, returning trimmed stdout on success.
    pub fn run(&self, args: &[&str]) -> Result<String, EngineError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(EngineError::Io)?;

        if !output.status.success() {
            return Err(EngineError::Io(io::Error::other(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn current_branch(&self) -> Result<String, EngineError> {
        self.run(&["branch", "--show-current"])
    }

    pub fn short_head(&self) -> Result<String, EngineError> {
        self.run(&["rev-parse", "--short", "HEAD"])
    }

    /// Whether `hash` is reachable from any remote-tracking branch.
    pub fn is_on_remote(&self, hash: &str) -> Result<bool, EngineError> {
        validate_revision(hash)?;
        let out = self.run(&["branch", "-r", "--contains", hash])?;
        Ok(!out.trim().is_empty())
    }

    /// `main` if it exists, else `master`, per the spec's auto-detection rule.
    pub fn detect_main_branch(&self) -> Result<String, EngineError> {
        for candidate in ["main", "master"] {
            if self
                .run(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{candidate}")])
                .is_ok()
            {
                return Ok(candidate.to_string());
            }
        }
        Err(EngineError::Io(io::Error::other(
            "neither 'main' nor 'master' branch found",
        )))
    }

    pub fn is_branch_pushed(&self, branch: &str) -> Result<bool, EngineError> {
        validate_revision(branch)?;
        let out = self.run(&["branch", "-r", "--list", &format!("*/{branch}")])?;
        Ok(!out.trim().is_empty())
    }
}
