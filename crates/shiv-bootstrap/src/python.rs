use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use which::which;

use crate::environment::{EnvOverrides, PYTHON};
use crate::error::BootstrapError;

const SYS_PATH_SCRIPT: &str = "import json, sys; print(json.dumps(sys.path))";

/// Picks the interpreter archives are launched with.
///
/// # Errors
/// Returns [`BootstrapError::NoInterpreter`] when neither `SHIV_PYTHON` nor a
/// `python3`/`python` on `PATH` is available.
pub fn detect_interpreter(overrides: &EnvOverrides) -> Result<String> {
    if let Some(explicit) = overrides.var(PYTHON).filter(|v| !v.is_empty()) {
        return Ok(explicit.to_string());
    }

    for candidate in ["python3", "python"] {
        if let Ok(path) = which(candidate) {
            return path
                .into_os_string()
                .into_string()
                .map_err(|_| anyhow!("non-utf8 path"));
        }
    }

    Err(BootstrapError::NoInterpreter.into())
}

/// The interpreter's default `sys.path`, as it would be before any site
/// directory is added.
///
/// # Errors
/// Returns an error when the interpreter cannot be run or prints something
/// other than a JSON list of strings.
pub fn probe_sys_path(python: &str) -> Result<Vec<String>> {
    let output = Command::new(python)
        .arg("-c")
        .arg(SYS_PATH_SCRIPT)
        .output()
        .with_context(|| format!("failed to probe sys.path via {python}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("python sys.path probe failed: {stderr}");
    }
    serde_json::from_slice(&output.stdout).context("invalid sys.path payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_interpreter_wins() {
        let overrides = EnvOverrides::from_pairs([(PYTHON, "/opt/python/bin/python3.12")]);
        assert_eq!(
            detect_interpreter(&overrides).expect("explicit"),
            "/opt/python/bin/python3.12"
        );
    }

    #[test]
    fn probe_reports_missing_interpreter() {
        let err = probe_sys_path("/definitely/not/a/python").expect_err("missing");
        assert!(err.to_string().contains("failed to probe sys.path"));
    }
}
