//! Environment overrides for child processes.
//!
//! A child started from inside an active bundle would otherwise inherit the
//! parent's bundle activation (`BUNDLE_GEMFILE`, `RUBYOPT=-rbundler/setup`, ...)
//! and resolve gems against the wrong manifest. [`build_clean_environment`]
//! produces the overlay that strips those markers.

use std::collections::BTreeMap;
use std::process::Command;

/// Bundle-activation markers removed from every child environment.
///
/// `GEM_HOME` and `GEM_PATH` are deliberately absent: unsetting them breaks
/// lookup of already-installed native extensions.
pub const BUNDLE_ACTIVATION_VARS: [&str; 8] = [
    "BUNDLER_ORIG_PATH",
    "BUNDLER_ORIG_MANPATH",
    "BUNDLER_VERSION",
    "BUNDLE_BIN_PATH",
    "RUBYLIB",
    "RUBYOPT",
    "BUNDLE_GEMFILE",
    "BUNDLE_PATH",
];

/// Override for a single environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    /// Set the variable to this exact value (may be empty).
    Set(String),
    /// Remove the variable from the child environment entirely.
    Unset,
}

/// Per-key overrides merged over the inherited environment of a child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentOverrides {
    vars: BTreeMap<String, EnvValue>,
}

impl EnvironmentOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), EnvValue::Set(value.into()));
        self
    }

    pub fn unset(&mut self, name: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), EnvValue::Unset);
        self
    }

    pub fn get(&self, name: &str) -> Option<&EnvValue> {
        self.vars.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvValue)> {
        self.vars.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Layer `other` on top of `self`; keys in `other` win.
    pub fn merge(mut self, other: &EnvironmentOverrides) -> Self {
        for (name, value) in &other.vars {
            self.vars.insert(name.clone(), value.clone());
        }
        self
    }

    /// Apply the overlay to a command without touching this process's environment.
    pub fn apply_to(&self, cmd: &mut Command) {
        for (name, value) in &self.vars {
            match value {
                EnvValue::Set(v) => {
                    cmd.env(name, v);
                }
                EnvValue::Unset => {
                    cmd.env_remove(name);
                }
            }
        }
    }
}

/// Build the overlay that neutralizes an inherited bundle context.
///
/// Pure and deterministic: every call returns the same keys, all [`EnvValue::Unset`].
pub fn build_clean_environment() -> EnvironmentOverrides {
    let mut env = EnvironmentOverrides::new();
    for name in BUNDLE_ACTIVATION_VARS {
        env.unset(name);
    }
    env
}
