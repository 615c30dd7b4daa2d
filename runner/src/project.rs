//! A project directory with an optional bundle, and the commands run inside it.
//!
//! Opening a project is the only step with decisions in it: when a `Gemfile`
//! is present the runner checks the bundling tool, compares the local bundle
//! config and lockfile with what the project needs, and runs the fix-ups.
//! Fix-up failures are logged and otherwise ignored; the project still opens.
//! After construction the state is frozen.

use std::ffi::OsString;
use std::path::{Component, MAIN_SEPARATOR_STR, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::drift::{ConfigDriftFlags, detect_drift};
use crate::core::env::{EnvironmentOverrides, build_clean_environment};
use crate::core::invocation::{
    BundleFlags, MeasureAction, measure_invocation, workflow_invocation,
};
use crate::error::SetupError;
use crate::io::bundle_state::{BundleStateReader, FsBundleStateReader};
use crate::io::cli_locator::{CliLocator, PathCliLocator};
use crate::io::config::RunnerConfig;
use crate::io::shell::{ShellExecutor, SystemShell};
use crate::io::workdir::WorkdirGuard;

pub const MANIFEST_FILE: &str = "Gemfile";
pub const LOCK_FILE: &str = "Gemfile.lock";

/// Paths derived from the project directory when it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    /// Absolute project directory.
    pub directory: PathBuf,
    /// `<dir>/Gemfile`, when it existed at construction.
    pub manifest_path: Option<PathBuf>,
    /// `<dir>/.bundle/install/`, set exactly when `manifest_path` is.
    pub bundle_install_path: Option<PathBuf>,
}

impl ProjectContext {
    /// Inspect `directory` (already absolute) for a manifest.
    pub fn detect(directory: PathBuf) -> Self {
        let manifest = directory.join(MANIFEST_FILE);
        if !manifest.is_file() {
            return Self {
                directory,
                manifest_path: None,
                bundle_install_path: None,
            };
        }
        let install = with_trailing_separator(directory.join(".bundle").join("install"));
        Self {
            directory,
            manifest_path: Some(manifest),
            bundle_install_path: Some(install),
        }
    }

    pub fn bundle_config_path(&self) -> PathBuf {
        self.directory.join(".bundle").join("config")
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.directory.join(LOCK_FILE)
    }

    pub fn measures_dir(&self) -> PathBuf {
        with_trailing_separator(self.directory.join("lib").join("measures"))
    }

    fn bundle_flags(&self) -> Option<BundleFlags<'_>> {
        match (&self.manifest_path, &self.bundle_install_path) {
            (Some(manifest_path), Some(bundle_install_path)) => Some(BundleFlags {
                manifest_path,
                bundle_install_path,
            }),
            _ => None,
        }
    }
}

/// Where construction ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    /// No manifest: the bundling tool was never invoked.
    NoBundle,
    /// Manifest present; `drift` is what was found before fix-ups ran.
    Bundled { drift: ConfigDriftFlags },
}

/// Runs shell commands and the measure CLI against one project directory.
///
/// Every command briefly changes the process working directory, so calls are
/// serialized process-wide through [`WorkdirGuard`].
#[derive(Debug)]
pub struct ProjectRunner<S = SystemShell, L = PathCliLocator> {
    context: ProjectContext,
    state: BundleState,
    shell: S,
    locator: L,
}

impl ProjectRunner {
    /// Open `directory` with the real shell, filesystem and `PATH` lookup.
    pub fn new(directory: impl AsRef<Path>, config: &RunnerConfig) -> Result<Self, SetupError> {
        let shell = SystemShell::new(config.output_limit_bytes);
        let locator = PathCliLocator::new(config.cli_path.clone(), config.cli_program.clone());
        Self::with_parts(directory, config, shell, locator, &FsBundleStateReader)
    }
}

impl<S: ShellExecutor, L: CliLocator> ProjectRunner<S, L> {
    /// Open `directory` with explicit collaborators.
    ///
    /// The directory is validated before anything is executed. Without a
    /// manifest nothing else happens. With one, the bundling tool must answer
    /// `-v`, then drift is detected and the fix-up commands run.
    #[instrument(skip_all, fields(dir = %directory.as_ref().display()))]
    pub fn with_parts<R: BundleStateReader + ?Sized>(
        directory: impl AsRef<Path>,
        config: &RunnerConfig,
        shell: S,
        locator: L,
        reader: &R,
    ) -> Result<Self, SetupError> {
        let directory = resolve_directory(directory.as_ref())?;
        let context = ProjectContext::detect(directory);
        let mut runner = Self {
            context,
            state: BundleState::NoBundle,
            shell,
            locator,
        };

        if runner.context.manifest_path.is_none() {
            info!("no {MANIFEST_FILE} found, skipping bundle configuration");
            return Ok(runner);
        }

        let drift = runner.configure_bundle(config, reader)?;
        runner.state = BundleState::Bundled { drift };
        Ok(runner)
    }

    fn configure_bundle<R: BundleStateReader + ?Sized>(
        &self,
        config: &RunnerConfig,
        reader: &R,
    ) -> Result<ConfigDriftFlags, SetupError> {
        let env = build_clean_environment();
        let bundle = config.bundle_command.as_str();

        if !self.run_command(&format!("{bundle} -v"), &env)? {
            return Err(SetupError::ToolUnavailable {
                tool: bundle.to_string(),
                dir: self.context.directory.clone(),
            });
        }

        let install_path = self
            .context
            .bundle_install_path
            .as_deref()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_default();

        let config_path = self.context.bundle_config_path();
        let bundle_config = reader.read_config(&config_path).unwrap_or_else(|err| {
            warn!(
                err = %format!("{err:#}"),
                path = %config_path.display(),
                "unreadable bundle config, reconfiguring"
            );
            None
        });
        let lock_path = self.context.lockfile_path();
        let platforms = reader.read_lock_platforms(&lock_path).unwrap_or_else(|err| {
            warn!(
                err = %format!("{err:#}"),
                path = %lock_path.display(),
                "unreadable lockfile, relocking"
            );
            None
        });

        let drift = detect_drift(
            &install_path,
            bundle_config.as_ref(),
            platforms.as_deref(),
            &config.lock_platform,
        );
        debug!(
            needs_path_config = drift.needs_path_config,
            needs_platform_lock = drift.needs_platform_lock,
            "bundle drift"
        );

        // Fix-ups are best effort: a failure is logged and the next step still runs.
        for command in drift.fixup_commands(bundle, &install_path, &config.lock_platform) {
            match self.run_command(&command, &env) {
                Ok(true) => info!(command = %command, "bundle fix-up succeeded"),
                Ok(false) => warn!(command = %command, "bundle fix-up failed, continuing"),
                Err(err) => warn!(
                    command = %command,
                    err = %format!("{err:#}"),
                    "bundle fix-up could not run, continuing"
                ),
            }
        }

        Ok(drift)
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn state(&self) -> BundleState {
        self.state
    }

    pub fn directory(&self) -> &Path {
        &self.context.directory
    }

    pub fn manifest_path(&self) -> Option<&Path> {
        self.context.manifest_path.as_deref()
    }

    pub fn bundle_install_path(&self) -> Option<&Path> {
        self.context.bundle_install_path.as_deref()
    }

    pub fn measures_dir(&self) -> PathBuf {
        self.context.measures_dir()
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    /// Run `command` through the shell from inside the project directory.
    ///
    /// Returns `Ok(false)` on a non-zero exit after logging the command and
    /// both streams. `Err` means the directory could not be entered or the
    /// shell could not be run; the previous working directory is restored
    /// either way.
    #[instrument(skip_all, fields(dir = %self.context.directory.display()))]
    pub fn run_command(&self, command: &str, env: &EnvironmentOverrides) -> Result<bool> {
        let output = {
            let _workdir = WorkdirGuard::enter(&self.context.directory).with_context(|| {
                format!(
                    "enter project directory {}",
                    self.context.directory.display()
                )
            })?;
            self.shell
                .execute(command, env)
                .with_context(|| format!("run `{command}`"))?
        };

        if output.success() {
            debug!(command, "command succeeded");
            return Ok(true);
        }

        let stdout = output.stdout_text() + &output.stdout_truncated_notice("command");
        let stderr = output.stderr_text() + &output.stderr_truncated_notice("command");
        warn!(
            command,
            exit_code = ?output.status.code(),
            stdout = %stdout,
            stderr = %stderr,
            "command failed"
        );
        Ok(false)
    }

    /// Run the measure tests under `lib/measures/` with the CLI.
    pub fn test_measures(&self) -> Result<bool> {
        self.run_measures(MeasureAction::Test)
    }

    /// Refresh measure metadata under `lib/measures/` with the CLI.
    pub fn update_measures(&self) -> Result<bool> {
        self.run_measures(MeasureAction::Update)
    }

    /// Run a workflow file with the CLI, using the project bundle if any.
    #[instrument(skip_all, fields(osw = %osw.as_ref().display()))]
    pub fn run_workflow(&self, osw: impl AsRef<Path>) -> Result<bool> {
        let osw = self.context.directory.join(osw.as_ref());
        let cli = self.locator.cli_path()?;
        let call = workflow_invocation(&cli, self.context.bundle_flags().as_ref(), &osw);
        info!(call = %call, "running workflow");
        self.run_command(&call, &build_clean_environment())
    }

    #[instrument(skip(self))]
    fn run_measures(&self, action: MeasureAction) -> Result<bool> {
        let measures_dir = self.context.measures_dir();
        let cli = self.locator.cli_path()?;
        let call = measure_invocation(
            &cli,
            self.context.bundle_flags().as_ref(),
            action,
            &measures_dir,
        );
        info!(measures_dir = %measures_dir.display(), call = %call, "invoking measure cli");
        self.run_command(&call, &build_clean_environment())
    }
}

fn resolve_directory(directory: &Path) -> Result<PathBuf, SetupError> {
    if !directory.exists() {
        return Err(SetupError::MissingDirectory(directory.to_path_buf()));
    }
    if !directory.is_dir() {
        return Err(SetupError::NotADirectory(directory.to_path_buf()));
    }
    let absolute = std::path::absolute(directory).map_err(|source| SetupError::Resolve {
        path: directory.to_path_buf(),
        source,
    })?;
    Ok(normalize_lexically(&absolute))
}

/// Drop `.` and fold `..` without touching the filesystem, so every spelling
/// of a directory yields the same derived paths (and the same `BUNDLE_PATH`).
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn with_trailing_separator(path: PathBuf) -> PathBuf {
    let mut raw: OsString = path.into_os_string();
    raw.push(MAIN_SEPARATOR_STR);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cli_locator::FixedCliLocator;
    use crate::test_support::{FakeBundleState, SpyShell, TestProject, cwd_serial};

    fn open(
        project: &TestProject,
        shell: SpyShell,
        state: &FakeBundleState,
    ) -> Result<ProjectRunner<SpyShell, FixedCliLocator>, SetupError> {
        ProjectRunner::with_parts(
            project.path(),
            &RunnerConfig::default(),
            shell,
            FixedCliLocator(PathBuf::from("/opt/os/bin/openstudio")),
            state,
        )
    }

    #[test]
    fn context_without_manifest_has_no_bundle_paths() {
        let project = TestProject::new().expect("project");
        let context = ProjectContext::detect(project.path().to_path_buf());
        assert!(context.manifest_path.is_none());
        assert!(context.bundle_install_path.is_none());
    }

    #[test]
    fn bundle_install_path_keeps_trailing_separator() {
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let context = ProjectContext::detect(project.path().to_path_buf());
        let install = context.bundle_install_path.expect("install path");
        let expected = format!("{}/.bundle/install/", project.path().display());
        assert_eq!(install.to_string_lossy(), expected);
        assert!(install.is_absolute());
    }

    #[test]
    fn dot_dot_spelling_derives_the_same_paths() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let state = FakeBundleState::configured(&project.install_path_string(), &["ruby"]);
        let detour = project.path().join("lib").join("..").join(".");
        let runner = ProjectRunner::with_parts(
            &detour,
            &RunnerConfig::default(),
            SpyShell::new(),
            FixedCliLocator(PathBuf::from("openstudio")),
            &state,
        )
        .expect("open");

        assert_eq!(runner.directory(), project.path());
        assert_eq!(
            runner.bundle_install_path().map(|p| p.to_string_lossy().into_owned()),
            Some(project.install_path_string())
        );
        assert_eq!(runner.shell().commands(), vec!["bundle -v"]);
    }

    #[test]
    fn normalize_lexically_folds_dot_components() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn no_manifest_never_touches_bundler() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project");
        let runner = open(&project, SpyShell::new(), &FakeBundleState::missing()).expect("open");

        assert_eq!(runner.state(), BundleState::NoBundle);
        assert!(runner.bundle_install_path().is_none());
        assert!(runner.shell().commands().is_empty());
    }

    #[test]
    fn up_to_date_bundle_runs_only_the_version_check() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let state = FakeBundleState::configured(&project.install_path_string(), &["ruby"]);
        let runner = open(&project, SpyShell::new(), &state).expect("open");

        assert_eq!(runner.shell().commands(), vec!["bundle -v"]);
        assert_eq!(
            runner.state(),
            BundleState::Bundled {
                drift: ConfigDriftFlags::default()
            }
        );
    }

    #[test]
    fn stale_bundle_path_triggers_only_path_config() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let state = FakeBundleState::configured("/somewhere/else/", &["ruby"]);
        let runner = open(&project, SpyShell::new(), &state).expect("open");

        let install = project.install_path_string();
        assert_eq!(
            runner.shell().commands(),
            vec![
                "bundle -v".to_string(),
                format!("bundle config set --local path {install}"),
            ]
        );
    }

    #[test]
    fn missing_platform_triggers_lock_then_update() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let state = FakeBundleState::configured(&project.install_path_string(), &["x86_64-linux"]);
        let runner = open(&project, SpyShell::new(), &state).expect("open");

        assert_eq!(
            runner.shell().commands(),
            vec!["bundle -v", "bundle lock --add_platform ruby", "bundle update"]
        );
    }

    #[test]
    fn fixup_commands_run_with_clean_environment_inside_project() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let runner = open(&project, SpyShell::new(), &FakeBundleState::missing()).expect("open");

        let calls = runner.shell().calls();
        assert_eq!(calls.len(), 4);
        let expected_dir = project.path().canonicalize().expect("canonicalize");
        for call in &calls {
            assert_eq!(call.env, build_clean_environment());
            assert_eq!(call.cwd.canonicalize().expect("canonicalize"), expected_dir);
        }
    }

    /// Fix-up failures are swallowed: construction succeeds, every step still
    /// runs, and the recorded drift is unchanged by the failures.
    #[test]
    fn failing_fixups_do_not_abort_construction() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let shell = SpyShell::new()
            .fail_when("config set", 1, "cannot write config")
            .fail_when("lock --add_platform", 1, "lock failed");
        let runner = open(&project, shell, &FakeBundleState::missing()).expect("open");

        assert_eq!(runner.shell().commands().len(), 4);
        assert_eq!(runner.shell().commands()[3], "bundle update");
        assert_eq!(
            runner.state(),
            BundleState::Bundled {
                drift: ConfigDriftFlags {
                    needs_path_config: true,
                    needs_platform_lock: true,
                }
            }
        );
    }

    #[test]
    fn fixup_shell_errors_do_not_abort_construction() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let shell = SpyShell::new()
            .error_when("config set")
            .error_when("lock --add_platform")
            .error_when("update");
        let runner = open(&project, shell, &FakeBundleState::missing()).expect("open");

        assert_eq!(
            runner.shell().commands(),
            vec![
                "bundle -v".to_string(),
                format!("bundle config set --local path {}", project.install_path_string()),
                "bundle lock --add_platform ruby".to_string(),
                "bundle update".to_string(),
            ]
        );
        assert!(matches!(runner.state(), BundleState::Bundled { .. }));
    }

    #[test]
    fn unavailable_bundler_is_fatal() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let shell = SpyShell::new().fail_when("bundle -v", 127, "bundle: not found");
        let err = open(&project, shell, &FakeBundleState::missing()).unwrap_err();
        assert!(matches!(err, SetupError::ToolUnavailable { ref tool, .. } if tool == "bundle"));
    }

    #[test]
    fn unreadable_bundle_state_counts_as_drift() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let runner = open(&project, SpyShell::new(), &FakeBundleState::unreadable()).expect("open");
        assert_eq!(runner.shell().commands().len(), 4);
    }

    #[test]
    fn missing_directory_fails_before_any_command() {
        let _serial = cwd_serial();
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("nope");
        let err = ProjectRunner::with_parts(
            &missing,
            &RunnerConfig::default(),
            SpyShell::new(),
            FixedCliLocator(PathBuf::from("openstudio")),
            &FakeBundleState::missing(),
        )
        .unwrap_err();
        assert!(matches!(err, SetupError::MissingDirectory(ref p) if p == &missing));
    }

    #[test]
    fn file_path_is_not_a_directory() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let gemfile = project.path().join(MANIFEST_FILE);
        let err = ProjectRunner::with_parts(
            &gemfile,
            &RunnerConfig::default(),
            SpyShell::new(),
            FixedCliLocator(PathBuf::from("openstudio")),
            &FakeBundleState::missing(),
        )
        .unwrap_err();
        assert!(matches!(err, SetupError::NotADirectory(_)));
    }

    #[test]
    fn test_measures_without_bundle_omits_bundle_flags() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project");
        let runner = open(&project, SpyShell::new(), &FakeBundleState::missing()).expect("open");

        assert!(runner.test_measures().expect("test measures"));
        let dir = project.path().display().to_string();
        assert_eq!(
            runner.shell().commands(),
            vec![format!(
                "/opt/os/bin/openstudio --verbose measure -r {dir}/lib/measures/"
            )]
        );
    }

    #[test]
    fn update_measures_passes_bundle_flags() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project").with_manifest().expect("gemfile");
        let state = FakeBundleState::configured(&project.install_path_string(), &["ruby"]);
        let runner = open(&project, SpyShell::new(), &state).expect("open");

        assert!(runner.update_measures().expect("update measures"));
        let dir = project.path().display().to_string();
        let last = runner.shell().commands().pop().expect("command");
        assert_eq!(
            last,
            format!(
                "/opt/os/bin/openstudio --verbose --bundle {dir}/Gemfile --bundle_path {dir}/.bundle/install/ measure -t {dir}/lib/measures/"
            )
        );
    }

    #[test]
    fn run_workflow_resolves_osw_against_project() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project");
        let runner = open(&project, SpyShell::new(), &FakeBundleState::missing()).expect("open");

        assert!(runner.run_workflow("workflows/in.osw").expect("run"));
        let dir = project.path().display().to_string();
        assert_eq!(
            runner.shell().commands(),
            vec![format!(
                "/opt/os/bin/openstudio --verbose run -w {dir}/workflows/in.osw"
            )]
        );
    }

    #[test]
    fn run_command_reports_failure_as_false() {
        let _serial = cwd_serial();
        let project = TestProject::new().expect("project");
        let shell = SpyShell::new().fail_when("false", 1, "nope");
        let runner = open(&project, shell, &FakeBundleState::missing()).expect("open");

        assert!(!runner.run_command("false", &EnvironmentOverrides::new()).expect("run"));
        assert!(runner.run_command("true", &EnvironmentOverrides::new()).expect("run"));
    }
}
