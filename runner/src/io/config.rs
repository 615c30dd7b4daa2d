//! Runner configuration stored in `<project>/.measure-runner.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::DEFAULT_OUTPUT_LIMIT_BYTES;

/// File name looked up inside a project directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = ".measure-runner.toml";

/// Runner configuration (TOML).
///
/// Missing fields fall back to the defaults below, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Bundling tool invoked for the availability check and fix-ups.
    pub bundle_command: String,

    /// Program name searched on `PATH` when `cli_path` is unset.
    pub cli_program: String,

    /// Explicit path to the measure CLI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<PathBuf>,

    /// Platform that must be present in the lockfile.
    pub lock_platform: String,

    /// Keep at most this many bytes of each captured stream.
    pub output_limit_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            bundle_command: "bundle".to_string(),
            cli_program: "openstudio".to_string(),
            cli_path: None,
            lock_platform: "ruby".to_string(),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bundle_command.trim().is_empty() {
            return Err(anyhow!("bundle_command must be non-empty"));
        }
        if self.cli_program.trim().is_empty() {
            return Err(anyhow!("cli_program must be non-empty"));
        }
        if self.lock_platform.trim().is_empty() {
            return Err(anyhow!("lock_platform must be non-empty"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
