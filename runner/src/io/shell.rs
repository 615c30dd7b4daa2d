//! Shell executor abstraction.
//!
//! [`ShellExecutor`] decouples project orchestration from the real `sh -c`
//! backend. Tests substitute recording or failing executors that never spawn
//! a process.

use anyhow::Result;

use crate::core::env::EnvironmentOverrides;
use crate::io::process::{CommandOutput, DEFAULT_OUTPUT_LIMIT_BYTES, run_shell};

/// Runs a whole command string through a shell in the current directory.
pub trait ShellExecutor {
    /// Execute `command` with `env` layered over the inherited environment.
    ///
    /// A non-zero exit is reported through [`CommandOutput::status`]; `Err` is
    /// reserved for failures to start or observe the shell at all.
    fn execute(&self, command: &str, env: &EnvironmentOverrides) -> Result<CommandOutput>;
}

/// Executor backed by the platform shell.
#[derive(Debug, Clone)]
pub struct SystemShell {
    pub output_limit_bytes: usize,
}

impl SystemShell {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LIMIT_BYTES)
    }
}

impl ShellExecutor for SystemShell {
    fn execute(&self, command: &str, env: &EnvironmentOverrides) -> Result<CommandOutput> {
        run_shell(command, env, self.output_limit_bytes)
    }
}

impl<S: ShellExecutor + ?Sized> ShellExecutor for &S {
    fn execute(&self, command: &str, env: &EnvironmentOverrides) -> Result<CommandOutput> {
        (**self).execute(command, env)
    }
}
