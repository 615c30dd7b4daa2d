//! Stable exit codes for `measure-runner` commands.

/// The command (or measure run) succeeded.
pub const OK: i32 = 0;
/// The command exited non-zero, or a runtime error occurred.
pub const FAILED: i32 = 1;
/// The project could not be opened (bad directory, bundler unavailable).
pub const SETUP: i32 = 2;
