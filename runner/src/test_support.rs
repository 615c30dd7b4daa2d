//! Test-only doubles: recording shells, fake bundle state, scratch projects.

use std::cell::RefCell;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};

use crate::core::drift::BundleConfig;
use crate::core::env::EnvironmentOverrides;
use crate::io::bundle_state::BundleStateReader;
use crate::io::process::CommandOutput;
use crate::io::shell::ShellExecutor;
use crate::project::MANIFEST_FILE;

static CWD_SERIAL: Mutex<()> = Mutex::new(());

/// Serialize tests that read or change the process working directory.
///
/// Hold the returned guard for the whole test body.
pub fn cwd_serial() -> MutexGuard<'static, ()> {
    CWD_SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build an `ExitStatus` carrying `code`.
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

/// Build an `ExitStatus` carrying `code`.
#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(code as u32)
}

/// Output with the given exit code and stream contents.
pub fn command_output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        status: exit_status(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
        stdout_truncated: 0,
        stderr_truncated: 0,
    }
}

/// One call observed by a [`SpyShell`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub command: String,
    pub env: EnvironmentOverrides,
    /// Working directory at the moment the command would have run.
    pub cwd: PathBuf,
}

#[derive(Debug, Clone)]
struct FailureRule {
    needle: String,
    code: i32,
    stderr: String,
}

/// Records every command and answers with success unless a rule matches.
#[derive(Debug, Default)]
pub struct SpyShell {
    rules: Vec<FailureRule>,
    errors: Vec<String>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl SpyShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with `code` and `stderr` for commands containing `needle`.
    pub fn fail_when(mut self, needle: &str, code: i32, stderr: &str) -> Self {
        self.rules.push(FailureRule {
            needle: needle.to_string(),
            code,
            stderr: stderr.to_string(),
        });
        self
    }

    /// Fail to start the shell at all for commands containing `needle`.
    pub fn error_when(mut self, needle: &str) -> Self {
        self.errors.push(needle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|call| call.command.clone())
            .collect()
    }
}

impl ShellExecutor for SpyShell {
    fn execute(&self, command: &str, env: &EnvironmentOverrides) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(RecordedCall {
            command: command.to_string(),
            env: env.clone(),
            cwd: env::current_dir()?,
        });
        if self.errors.iter().any(|needle| command.contains(needle)) {
            return Err(anyhow!("simulated spawn failure for `{command}`"));
        }
        let output = match self.rules.iter().find(|rule| command.contains(&rule.needle)) {
            Some(rule) => command_output(rule.code, "", &rule.stderr),
            None => command_output(0, "", ""),
        };
        Ok(output)
    }
}

/// Fails every call as if the shell could not be started.
#[derive(Debug, Default)]
pub struct FailingShell {
    /// Working directory seen during the last call.
    pub seen_cwd: RefCell<Option<PathBuf>>,
}

impl ShellExecutor for FailingShell {
    fn execute(&self, _command: &str, _env: &EnvironmentOverrides) -> Result<CommandOutput> {
        *self.seen_cwd.borrow_mut() = env::current_dir().ok();
        Err(anyhow!("simulated spawn failure"))
    }
}

/// Canned answers for drift detection.
#[derive(Debug, Clone, Default)]
pub struct FakeBundleState {
    pub config: Option<BundleConfig>,
    pub platforms: Option<Vec<String>>,
    pub unreadable: bool,
}

impl FakeBundleState {
    /// Neither `.bundle/config` nor a lockfile exists.
    pub fn missing() -> Self {
        Self::default()
    }

    /// Config with `BUNDLE_PATH = bundle_path` and a lockfile listing `platforms`.
    pub fn configured(bundle_path: &str, platforms: &[&str]) -> Self {
        Self {
            config: Some(BundleConfig {
                bundle_path: Some(bundle_path.to_string()),
            }),
            platforms: Some(platforms.iter().map(|p| p.to_string()).collect()),
            unreadable: false,
        }
    }

    /// Both files exist but cannot be parsed.
    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Self::default()
        }
    }
}

impl BundleStateReader for FakeBundleState {
    fn read_config(&self, path: &Path) -> Result<Option<BundleConfig>> {
        if self.unreadable {
            return Err(anyhow!("parse {}", path.display()));
        }
        Ok(self.config.clone())
    }

    fn read_lock_platforms(&self, path: &Path) -> Result<Option<Vec<String>>> {
        if self.unreadable {
            return Err(anyhow!("parse {}", path.display()));
        }
        Ok(self.platforms.clone())
    }
}

/// Scratch project directory removed on drop.
pub struct TestProject {
    temp: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        fs::create_dir_all(temp.path().join("lib").join("measures"))?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Add a `Gemfile`.
    pub fn with_manifest(self) -> Result<Self> {
        fs::write(
            self.path().join(MANIFEST_FILE),
            "source 'https://rubygems.org'\n",
        )?;
        Ok(self)
    }

    /// Write `contents` to a file relative to the project root.
    pub fn write(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// The bundle install path the runner expects for this project.
    pub fn install_path_string(&self) -> String {
        format!("{}/.bundle/install/", self.path().display())
    }
}

#[derive(Clone)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return everything it logged.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let writer = SharedBuf(buf.clone());
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buf.lock().unwrap_or_else(PoisonError::into_inner))
        .into_owned();
    (result, logs)
}
