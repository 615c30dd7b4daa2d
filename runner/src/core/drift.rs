//! Drift detection between the on-disk bundle state and what a project needs.

use crate::core::invocation::shell_quote;

/// Values of interest from a project's local `.bundle/config`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleConfig {
    /// `BUNDLE_PATH`, verbatim.
    pub bundle_path: Option<String>,
}

/// Which fix-up steps a project needs before commands run against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigDriftFlags {
    pub needs_path_config: bool,
    pub needs_platform_lock: bool,
}

impl ConfigDriftFlags {
    pub fn is_clean(&self) -> bool {
        !self.needs_path_config && !self.needs_platform_lock
    }

    /// Shell commands that bring the bundle back in line, in execution order.
    ///
    /// Platform locking is followed by a full `update` so the lockfile gains
    /// entries for the generic platform.
    pub fn fixup_commands(&self, bundle: &str, install_path: &str, platform: &str) -> Vec<String> {
        let mut commands = Vec::new();
        if self.needs_path_config {
            commands.push(format!(
                "{bundle} config set --local path {}",
                shell_quote(install_path)
            ));
        }
        if self.needs_platform_lock {
            commands.push(format!(
                "{bundle} lock --add_platform {}",
                shell_quote(platform)
            ));
            commands.push(format!("{bundle} update"));
        }
        commands
    }
}

/// Compare the observed bundle state against the expected one.
///
/// `BUNDLE_PATH` must equal `expected_install_path` byte for byte; a missing
/// config or lockfile always counts as drift.
pub fn detect_drift(
    expected_install_path: &str,
    config: Option<&BundleConfig>,
    lock_platforms: Option<&[String]>,
    platform: &str,
) -> ConfigDriftFlags {
    let needs_path_config = !config
        .and_then(|cfg| cfg.bundle_path.as_deref())
        .is_some_and(|path| path == expected_install_path);
    let needs_platform_lock =
        !lock_platforms.is_some_and(|platforms| platforms.iter().any(|p| p == platform));
    ConfigDriftFlags {
        needs_path_config,
        needs_platform_lock,
    }
}
