//! Pure logic: environment overlays, drift detection, CLI command lines.
//!
//! Nothing in here touches the filesystem or spawns processes.

pub mod drift;
pub mod env;
pub mod invocation;
