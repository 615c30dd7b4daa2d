//! Fatal errors raised while opening a project.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Construction of a [`crate::project::ProjectRunner`] failed.
///
/// Failing commands are not errors; they surface as `Ok(false)`.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("project directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("project path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("resolve project directory {}", .path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{tool}` is not available in {}", .dir.display())]
    ToolUnavailable { tool: String, dir: PathBuf },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
