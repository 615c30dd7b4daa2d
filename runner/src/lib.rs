//! Per-project bundle setup and measure execution through an external CLI.
//!
//! A [`project::ProjectRunner`] owns one project directory. Opening it makes
//! sure the project's bundle is configured (install path, generic lockfile
//! platform) when a `Gemfile` is present; afterwards it runs shell commands
//! and the measure CLI inside that directory with a sanitized environment.
//!
//! - **[`core`]**: Pure logic (environment overlays, drift detection, command
//!   lines). No I/O.
//! - **[`io`]**: Side-effecting adapters (shell, filesystem, working
//!   directory, executable lookup), each behind a trait where tests need a
//!   double.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod project;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
