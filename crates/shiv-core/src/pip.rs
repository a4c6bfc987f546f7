use std::env;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::info;

use crate::error::BuildError;

const PIP_REQUIRE_VIRTUALENV: &str = "PIP_REQUIRE_VIRTUALENV";
// `--target` conflicts with a distutils prefix from a global config.
const SETUP_CFG_NO_PREFIX: &str = "[install]\nprefix=\n";

/// Arguments shiv supplies itself, with the reason they cannot be overridden.
pub const DISALLOWED_ARGS: [(&[&str], &str); 3] = [
    (
        &["-t", "--target"],
        "Shiv already supplies a target internally, so overriding is not allowed.",
    ),
    (
        &["-d", "--dest"],
        "Shiv already supplies a destination internally, so overriding is not allowed.",
    ),
    (
        &["-e", "--editable"],
        "Editable installs don't actually install anything, so they are not allowed.",
    ),
];

/// # Errors
/// Returns [`BuildError::DisallowedPipArg`] for the first disallowed argument.
pub fn check_pip_args(args: &[String]) -> Result<(), BuildError> {
    for (flags, reason) in DISALLOWED_ARGS {
        if let Some(arg) = args.iter().find(|arg| flags.contains(&arg.as_str())) {
            return Err(BuildError::DisallowedPipArg {
                arg: arg.clone(),
                reason,
            });
        }
    }
    Ok(())
}

/// Replaces a bare `.` with the absolute current directory, since pip runs
/// from a scratch directory.
fn absolutize_dot(args: &[String]) -> Result<Vec<String>> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    Ok(args
        .iter()
        .map(|arg| {
            if arg == "." {
                cwd.to_string_lossy().into_owned()
            } else {
                arg.clone()
            }
        })
        .collect())
}

/// Runs `python -m pip install --target <target> <args>` with pip's output
/// passed through.
///
/// # Errors
/// Returns an error when pip cannot be started, or
/// [`BuildError::PipInstallFailed`] when it exits unsuccessfully.
pub fn install(python: &str, target: &Path, args: &[String]) -> Result<()> {
    let scratch = tempfile::tempdir().context("failed to create pip working directory")?;
    fs::write(scratch.path().join("setup.cfg"), SETUP_CFG_NO_PREFIX)
        .context("failed to write setup.cfg")?;
    let args = absolutize_dot(args)?;

    info!(python, target = %target.display(), "installing with pip");
    let status = Command::new(python)
        .args(["-m", "pip", "install", "--target"])
        .arg(target)
        .args(&args)
        .current_dir(scratch.path())
        .env_remove(PIP_REQUIRE_VIRTUALENV)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("failed to start pip via {python}"))?;
    if !status.success() {
        return Err(BuildError::PipInstallFailed {
            code: status.code().unwrap_or(-1),
        }
        .into());
    }
    Ok(())
}
