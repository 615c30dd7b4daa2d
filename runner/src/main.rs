//! Command-line entry point for `measure-runner`.
//!
//! Opens a project directory (configuring its bundle when a `Gemfile` is
//! present) and runs the measure CLI or an arbitrary shell command inside it.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use measure_runner::core::env::{EnvValue, build_clean_environment};
use measure_runner::core::invocation::shell_quote;
use measure_runner::error::SetupError;
use measure_runner::exit_codes;
use measure_runner::io::config::{CONFIG_FILE_NAME, RunnerConfig, load_config, write_config};
use measure_runner::logging;
use measure_runner::project::ProjectRunner;

#[derive(Parser)]
#[command(
    name = "measure-runner",
    version,
    about = "Configure a project's bundle and run measures through the CLI"
)]
struct Cli {
    /// Config file (default: `<DIR>/.measure-runner.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the tests of every measure under `<DIR>/lib/measures/`.
    TestMeasures {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Refresh measure metadata under `<DIR>/lib/measures/`.
    UpdateMeasures {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Run a workflow (`.osw`) file, relative to the project directory.
    RunWorkflow {
        osw: PathBuf,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Run a command inside the project with the bundle context removed.
    ///
    /// Each argument is quoted separately; use `sh -c "..."` for shell syntax.
    Exec {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Print the environment overrides applied to every child process.
    CleanEnv,
    /// Write a config file with default values.
    InitConfig {
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            let code = if err.downcast_ref::<SetupError>().is_some() {
                exit_codes::SETUP
            } else {
                exit_codes::FAILED
            };
            std::process::exit(code);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_override = cli.config.as_deref();
    let succeeded = match cli.command {
        Command::TestMeasures { dir } => open(&dir, config_override)?.test_measures()?,
        Command::UpdateMeasures { dir } => open(&dir, config_override)?.update_measures()?,
        Command::RunWorkflow { osw, dir } => open(&dir, config_override)?.run_workflow(&osw)?,
        Command::Exec { dir, command } => open(&dir, config_override)?
            .run_command(&join_args(&command), &build_clean_environment())?,
        Command::CleanEnv => {
            for (name, value) in build_clean_environment().iter() {
                match value {
                    EnvValue::Set(v) => println!("{name}={v}"),
                    EnvValue::Unset => println!("{name} (unset)"),
                }
            }
            true
        }
        Command::InitConfig { dir, force } => {
            let path = config_path(&dir, config_override);
            if path.exists() && !force {
                bail!("{} already exists (use --force)", path.display());
            }
            write_config(&path, &RunnerConfig::default())?;
            println!("{}", path.display());
            true
        }
    };
    Ok(if succeeded {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

/// Rebuild one shell command from argv, keeping each argument intact.
fn join_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn config_path(dir: &Path, config_override: Option<&Path>) -> PathBuf {
    config_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.join(CONFIG_FILE_NAME))
}

fn open(dir: &Path, config_override: Option<&Path>) -> Result<ProjectRunner> {
    let cfg = load_config(&config_path(dir, config_override))?;
    Ok(ProjectRunner::new(dir, &cfg)?)
}
