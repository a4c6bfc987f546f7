//! The state machine run on every launch of an archive.
//!
//! Locate, load the record, resolve the cache entry, extract if needed, splice
//! the search path, verify sources, extend `PYTHONPATH`, decide the dispatch
//! target, run the preamble, then launch the driver. Every step before the
//! launch either succeeds or aborts it with an error, and nothing the archive
//! ships runs until the target is known to be valid.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::iter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::dispatch::DispatchTarget;
use crate::driver::{write_payload, ArgTable, DriverPayload, DriverTarget, PAYLOAD_VAR};
use crate::environment::{resolve_int, EnvOverrides, BOOTSTRAP_ONLY_VARS, LOCK_TIMEOUT};
use crate::error::BootstrapError;
use crate::extract::{extract_site_packages, ExtractOptions, PythonCompiler};
use crate::process::{run_passthrough, ChildEnv};
use crate::python::{detect_interpreter, probe_sys_path};
use crate::site::{extend_python_path, splice};
use crate::verify::ensure_no_modify;

#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    /// Archive path exactly as invoked; becomes `sys.argv[0]`.
    pub archive: PathBuf,
    pub args: Vec<OsString>,
    pub overrides: EnvOverrides,
}

impl BootstrapRequest {
    pub fn new(archive: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            archive: archive.into(),
            args,
            overrides: EnvOverrides::capture(),
        }
    }
}

fn lock_timeout(overrides: &EnvOverrides) -> Option<Duration> {
    u64::try_from(resolve_int(overrides, LOCK_TIMEOUT, 0))
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

enum Preamble {
    Python(PathBuf),
    External(PathBuf),
}

fn locate_preamble(site_packages: &Path, name: &str) -> Result<Preamble> {
    let path = site_packages.join("bin").join(name);
    if !path.exists() {
        return Err(BootstrapError::PreambleNotFound { path }.into());
    }
    if path.extension().is_some_and(|ext| ext == "py") {
        Ok(Preamble::Python(path))
    } else {
        Ok(Preamble::External(path))
    }
}

/// Runs the archive and returns the exit code of whatever it dispatched to.
///
/// # Errors
/// Returns an error for any failure before dispatch: unreadable archive,
/// extraction or lock failures, modified sources, a missing preamble or
/// console script, or an interpreter that cannot be started.
pub fn bootstrap(request: &BootstrapRequest) -> Result<i32> {
    let overrides = &request.overrides;
    let mut archive = Archive::locate(&request.archive)?;
    let env = archive.environment().clone();

    let cache = archive.cache_path(overrides)?;
    let site_packages = cache.join("site-packages");
    let python = detect_interpreter(overrides)?;
    debug!(python = %python, cache = %cache.display(), "resolved launch context");

    let force = env.force_extract(overrides);
    if !site_packages.exists() || force {
        let options = ExtractOptions {
            compile_pyc: env.compile_pyc(overrides),
            compile_workers: env.compile_workers(overrides),
            force,
            lock_timeout: lock_timeout(overrides),
        };
        let outcome = extract_site_packages(
            archive.zip_mut(),
            &cache,
            &options,
            &PythonCompiler::new(&python),
        )?;
        debug!(?outcome, "extraction finished");
    }

    let base = probe_sys_path(&python)?;
    let spliced = splice(&base, &site_packages)?;

    if env.no_modify() {
        ensure_no_modify(&site_packages, env.hashes())?;
    }

    let mut child_env = ChildEnv::default();
    if env.extend_pythonpath(overrides) {
        let value = extend_python_path(overrides.var("PYTHONPATH"), &spliced.added);
        debug!(pythonpath = %value, "extending PYTHONPATH");
        child_env.set("PYTHONPATH", value);
    }

    let archive_arg = request.archive.to_string_lossy().into_owned();
    let target = DispatchTarget::resolve(
        &env,
        overrides,
        &site_packages,
        &request.args,
        &archive_arg,
    )?;
    if target.scrubs_selectors() {
        for var in BOOTSTRAP_ONLY_VARS {
            child_env.remove(var);
        }
    }

    let mut python_preamble = None;
    if let Some(name) = env.preamble(overrides) {
        match locate_preamble(&site_packages, &name)? {
            Preamble::Python(path) => python_preamble = Some(path),
            Preamble::External(path) => {
                info!(preamble = %path.display(), "running preamble");
                let code = run_passthrough(&path, &[] as &[&str], &child_env)?;
                if code != 0 {
                    warn!(preamble = %path.display(), code, "preamble exited unsuccessfully");
                }
            }
        }
    }

    let mut args = ArgTable::default();
    let argv = args.extend(
        iter::once(request.archive.as_os_str()).chain(request.args.iter().map(OsString::as_os_str)),
    );
    let record = env.clone().with_hashes(BTreeMap::new());
    let payload = DriverPayload {
        site_packages: site_packages.to_string_lossy().into_owned(),
        sys_path: &spliced.entries,
        pth_exec: &spliced.pth_exec,
        env: &record,
        preamble: python_preamble.map(|p| p.to_string_lossy().into_owned()),
        argv,
        target: DriverTarget::new(&target, &mut args),
    };
    let payload_dir = cache.parent().unwrap_or(&cache);
    let payload_file = write_payload(&payload, payload_dir)?;
    child_env.set(PAYLOAD_VAR, payload_file.path().to_string_lossy());

    debug!(?target, payload = %payload_file.path().display(), "dispatching");
    let driver = archive.driver_source();
    let mut command = vec![OsString::from("-c"), OsString::from(driver)];
    command.extend(args.as_slice().iter().cloned());
    run_passthrough(&python, &command, &child_env)
}
