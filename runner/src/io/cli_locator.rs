//! Lookup of the external measure CLI executable.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Resolves the path of the CLI binary that runs measures.
pub trait CliLocator {
    fn cli_path(&self) -> Result<PathBuf>;
}

/// Uses an explicitly configured path, falling back to a `PATH` search.
#[derive(Debug, Clone)]
pub struct PathCliLocator {
    pub explicit: Option<PathBuf>,
    pub program: String,
}

impl PathCliLocator {
    pub fn new(explicit: Option<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            explicit,
            program: program.into(),
        }
    }
}

impl CliLocator for PathCliLocator {
    fn cli_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.explicit {
            if !path.is_file() {
                return Err(anyhow!("configured cli {} does not exist", path.display()));
            }
            return Ok(path.clone());
        }
        let path = which::which(&self.program)
            .with_context(|| format!("locate `{}` on PATH", self.program))?;
        debug!(cli = %path.display(), "located cli");
        Ok(path)
    }
}

/// Always answers with the same path. Useful when the caller already knows it.
#[derive(Debug, Clone)]
pub struct FixedCliLocator(pub PathBuf);

impl CliLocator for FixedCliLocator {
    fn cli_path(&self) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}
