//! Command-line assembly for the external CLI.

use std::path::Path;

/// Bundle arguments passed to the CLI when the project carries a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFlags<'a> {
    pub manifest_path: &'a Path,
    pub bundle_install_path: &'a Path,
}

/// What the CLI should do with a measures directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureAction {
    /// Run each measure's tests (`measure -r`).
    Test,
    /// Refresh measure metadata in place (`measure -t`).
    Update,
}

impl MeasureAction {
    fn flag(self) -> &'static str {
        match self {
            MeasureAction::Test => "-r",
            MeasureAction::Update => "-t",
        }
    }
}

/// Build `<cli> --verbose [--bundle <m> --bundle_path <p>] measure <flag> <dir>`.
pub fn measure_invocation(
    cli: &Path,
    bundle: Option<&BundleFlags<'_>>,
    action: MeasureAction,
    measures_dir: &Path,
) -> String {
    let mut call = prefix(cli, bundle);
    call.push_str(" measure ");
    call.push_str(action.flag());
    call.push(' ');
    call.push_str(&quote_path(measures_dir));
    call
}

/// Build `<cli> --verbose [--bundle <m> --bundle_path <p>] run -w <osw>`.
pub fn workflow_invocation(cli: &Path, bundle: Option<&BundleFlags<'_>>, osw: &Path) -> String {
    let mut call = prefix(cli, bundle);
    call.push_str(" run -w ");
    call.push_str(&quote_path(osw));
    call
}

fn prefix(cli: &Path, bundle: Option<&BundleFlags<'_>>) -> String {
    let mut call = quote_path(cli);
    call.push_str(" --verbose");
    if let Some(flags) = bundle {
        call.push_str(" --bundle ");
        call.push_str(&quote_path(flags.manifest_path));
        call.push_str(" --bundle_path ");
        call.push_str(&quote_path(flags.bundle_install_path));
    }
    call
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// Quote `arg` for the platform shell unless it only contains characters the
/// shell passes through untouched.
///
/// `sh` gets single quotes. `cmd` has no single quotes, so Windows gets double
/// quotes with embedded `"` doubled; backslashes are literal there and stay plain.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric() || "/._-+:=@,%_".contains(c) || (cfg!(windows) && c == '\\')
        });
    if plain {
        return arg.to_string();
    }
    if cfg!(windows) {
        return format!("\"{}\"", arg.replace('"', "\"\""));
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}
