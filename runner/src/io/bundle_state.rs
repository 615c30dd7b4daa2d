//! Readers for the on-disk bundle state: `.bundle/config` and `Gemfile.lock`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::drift::BundleConfig;

/// Source of the bundle state consulted during drift detection.
pub trait BundleStateReader {
    /// Parse the local bundle config. `Ok(None)` when the file does not exist.
    fn read_config(&self, path: &Path) -> Result<Option<BundleConfig>>;

    /// Platforms declared by the lockfile. `Ok(None)` when the file does not exist.
    fn read_lock_platforms(&self, path: &Path) -> Result<Option<Vec<String>>>;
}

/// Reads the real files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBundleStateReader;

impl BundleStateReader for FsBundleStateReader {
    fn read_config(&self, path: &Path) -> Result<Option<BundleConfig>> {
        if !path.is_file() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let config = parse_bundle_config(&contents)
            .with_context(|| format!("parse {}", path.display()))?;
        debug!(path = %path.display(), bundle_path = ?config.bundle_path, "read bundle config");
        Ok(Some(config))
    }

    fn read_lock_platforms(&self, path: &Path) -> Result<Option<Vec<String>>> {
        if !path.is_file() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let platforms = parse_lock_platforms(&contents);
        debug!(path = %path.display(), ?platforms, "read lockfile platforms");
        Ok(Some(platforms))
    }
}

/// Parse the YAML mapping bundler writes to `.bundle/config`.
///
/// An empty file is a valid config with no keys.
pub fn parse_bundle_config(contents: &str) -> Result<BundleConfig> {
    if contents.trim().is_empty() {
        return Ok(BundleConfig::default());
    }
    let map: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_str(contents).context("parse bundle config yaml")?;
    let bundle_path = map.get("BUNDLE_PATH").and_then(|value| match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null => None,
        other => serde_yaml::to_string(other)
            .ok()
            .map(|s| s.trim_end().to_string()),
    });
    Ok(BundleConfig { bundle_path })
}

/// Collect the entries of the lockfile's `PLATFORMS` section.
pub fn parse_lock_platforms(contents: &str) -> Vec<String> {
    let mut platforms = Vec::new();
    let mut in_section = false;
    for line in contents.lines() {
        if !in_section {
            in_section = line.trim_end() == "PLATFORMS";
            continue;
        }
        if !line.starts_with(' ') {
            break;
        }
        let name = line.trim();
        if !name.is_empty() {
            platforms.push(name.to_string());
        }
    }
    platforms
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKFILE: &str = "\
GEM
  remote: https://rubygems.org/
  specs:
    rake (13.0.6)

PLATFORMS
  ruby
  x86_64-linux

DEPENDENCIES
  rake

BUNDLED WITH
   2.4.10
";

    #[test]
    fn parses_bundle_path_from_config() {
        let config = parse_bundle_config("---\nBUNDLE_PATH: \"/proj/.bundle/install/\"\n")
            .expect("parse");
        assert_eq!(config.bundle_path.as_deref(), Some("/proj/.bundle/install/"));
    }

    #[test]
    fn config_without_bundle_path_is_empty() {
        let config = parse_bundle_config("---\nBUNDLE_JOBS: \"4\"\n").expect("parse");
        assert_eq!(config, BundleConfig::default());
        assert_eq!(parse_bundle_config("").expect("parse"), BundleConfig::default());
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(parse_bundle_config("BUNDLE_PATH: [unterminated").is_err());
    }

    #[test]
    fn lock_platforms_reads_only_platforms_section() {
        assert_eq!(parse_lock_platforms(LOCKFILE), vec!["ruby", "x86_64-linux"]);
    }

    #[test]
    fn lock_without_platforms_section_is_empty() {
        assert!(parse_lock_platforms("GEM\n  specs:\n").is_empty());
    }

    #[test]
    fn fs_reader_reports_missing_files_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reader = FsBundleStateReader;
        assert!(reader.read_config(&temp.path().join("config")).expect("read").is_none());
        assert!(
            reader
                .read_lock_platforms(&temp.path().join("Gemfile.lock"))
                .expect("read")
                .is_none()
        );
    }

    #[test]
    fn fs_reader_reads_existing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let lock = temp.path().join("Gemfile.lock");
        fs::write(&lock, LOCKFILE).expect("write lock");
        let config = temp.path().join("config");
        fs::write(&config, "---\nBUNDLE_PATH: \"/x/\"\n").expect("write config");

        let reader = FsBundleStateReader;
        let platforms = reader.read_lock_platforms(&lock).expect("read").expect("some");
        assert!(platforms.contains(&"ruby".to_string()));
        let cfg = reader.read_config(&config).expect("read").expect("some");
        assert_eq!(cfg.bundle_path.as_deref(), Some("/x/"));
    }
}
