use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::console_scripts::find_entry_point;
use crate::entry_point::EntryPoint;
use crate::environment::{EnvOverrides, Environment};
use crate::error::BootstrapError;
use crate::interpreter::InterpreterMode;

/// What an invocation ends up running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    EntryPoint(EntryPoint),
    /// A script under `site-packages/bin`, run as `__main__`.
    Script(PathBuf),
    Interactive(InterpreterMode),
}

impl DispatchTarget {
    /// Decides the target once, from the record and the current overrides.
    ///
    /// An entry point only applies when no console script is configured. A
    /// console script resolves to `site-packages/bin/<name>` if present, else
    /// to its `console_scripts` registration. Everything else, including an
    /// explicit `SHIV_INTERPRETER`, falls through to interpreter mode.
    ///
    /// # Errors
    /// Returns an error when the configured entry point is malformed, a
    /// console script cannot be found, or interpreter-mode arguments are
    /// invalid.
    pub fn resolve(
        env: &Environment,
        overrides: &EnvOverrides,
        site_packages: &Path,
        args: &[OsString],
        archive: &str,
    ) -> Result<Self> {
        if !env.interpreter(overrides) {
            let script = env.script(overrides).filter(|s| !s.is_empty());
            match (env.entry_point(overrides), script) {
                (Some(entry_point), None) => {
                    return Ok(Self::EntryPoint(EntryPoint::parse_lenient(&entry_point)?));
                }
                (_, Some(script)) => return Self::resolve_script(site_packages, &script),
                (None, None) => {}
            }
        }
        let mode = InterpreterMode::from_args(args, archive)?;
        debug!(mode = %mode.display_name(), "no entry point configured; entering interpreter mode");
        Ok(Self::Interactive(mode))
    }

    fn resolve_script(site_packages: &Path, name: &str) -> Result<Self> {
        let bin = site_packages.join("bin").join(name);
        if bin.exists() {
            return Ok(Self::Script(bin));
        }
        match find_entry_point(&[site_packages], name)? {
            Some(target) => Ok(Self::EntryPoint(EntryPoint::parse_lenient(&target)?)),
            None => Err(BootstrapError::ScriptNotFound {
                name: name.to_string(),
                site_packages: site_packages.to_path_buf(),
            }
            .into()),
        }
    }

    /// Entry points and console scripts run with the bootstrap selector
    /// variables removed so nested invocations are unaffected.
    #[must_use]
    pub fn scrubs_selectors(&self) -> bool {
        !matches!(self, Self::Interactive(_))
    }
}
