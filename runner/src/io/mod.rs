//! Side-effecting adapters: processes, filesystem state, working directory.

pub mod bundle_state;
pub mod cli_locator;
pub mod config;
pub mod process;
pub mod shell;
pub mod workdir;
