//! Scoped changes of the process-wide working directory.
//!
//! The current directory is shared by every thread in the process. Each
//! [`WorkdirGuard`] holds a global lock for as long as it is alive, so two
//! projects never observe each other's directory, and puts the previous
//! directory back when dropped (normal return, `?`, or unwinding).

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

static WORKDIR_LOCK: Mutex<()> = Mutex::new(());

/// Holds the process inside a directory until dropped.
#[derive(Debug)]
pub struct WorkdirGuard {
    previous: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl WorkdirGuard {
    /// Lock the working directory and change into `dir`.
    ///
    /// Blocks while another guard is alive. Not re-entrant: entering a second
    /// guard on the same thread deadlocks.
    pub fn enter(dir: &Path) -> io::Result<Self> {
        let lock = WORKDIR_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = env::current_dir()?;
        env::set_current_dir(dir)?;
        debug!(from = %previous.display(), to = %dir.display(), "entered directory");
        Ok(Self {
            previous,
            _lock: lock,
        })
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        if let Err(err) = env::set_current_dir(&self.previous) {
            error!(err = %err, dir = %self.previous.display(), "failed to restore working directory");
        }
    }
}

/// Run `f` with the working directory set to `dir`, restoring it afterwards.
pub fn with_workdir<T>(dir: &Path, f: impl FnOnce() -> T) -> io::Result<T> {
    let _guard = WorkdirGuard::enter(dir)?;
    Ok(f())
}
