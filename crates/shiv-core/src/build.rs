//! Build orchestration behind the `shiv` command.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use shiv_bootstrap::console_scripts::{console_script_exists, find_entry_point};
use shiv_bootstrap::driver::{MAIN_FUNCTION, MAIN_MODULE};
use shiv_bootstrap::environment::EnvOverrides;
use shiv_bootstrap::python::detect_interpreter;
use shiv_bootstrap::verify::hash_python_sources;
use shiv_bootstrap::{Environment, SHIV_VERSION};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::builder::{create_archive, format_built_at, validate_shebang, DEFAULT_SHEBANG};
use crate::error::BuildError;
use crate::fs::{copytree, expand_user};
use crate::pip;

/// `SOURCE_DATE_EPOCH` used for `--reproducible` builds without one:
/// 1980-01-01, the earliest zip timestamp.
pub const SOURCE_DATE_EPOCH_DEFAULT: i64 = 315_532_800;

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub output_file: PathBuf,
    pub entry_point: Option<String>,
    pub console_script: Option<String>,
    /// Interpreter written into the shebang.
    pub python: Option<String>,
    pub site_packages: Vec<PathBuf>,
    pub build_id: Option<String>,
    pub compressed: bool,
    pub compile_pyc: bool,
    pub extend_pythonpath: bool,
    pub reproducible: bool,
    pub no_modify: bool,
    pub preamble: Option<PathBuf>,
    pub root: Option<String>,
    pub source_date_epoch: Option<i64>,
    pub pip_args: Vec<String>,
}

impl BuildRequest {
    pub fn new(output_file: impl Into<PathBuf>) -> Self {
        Self {
            output_file: output_file.into(),
            entry_point: None,
            console_script: None,
            python: None,
            site_packages: Vec::new(),
            build_id: None,
            compressed: true,
            compile_pyc: false,
            extend_pythonpath: false,
            reproducible: false,
            no_modify: false,
            preamble: None,
            root: None,
            source_date_epoch: None,
            pip_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub output: PathBuf,
    pub environment: Environment,
}

fn built_at(request: &BuildRequest) -> Result<String> {
    let at = match (request.source_date_epoch, request.reproducible) {
        (Some(epoch), _) => OffsetDateTime::from_unix_timestamp(epoch)
            .with_context(|| format!("invalid SOURCE_DATE_EPOCH {epoch}"))?,
        (None, true) => OffsetDateTime::from_unix_timestamp(SOURCE_DATE_EPOCH_DEFAULT)
            .context("invalid default SOURCE_DATE_EPOCH")?,
        (None, false) => OffsetDateTime::now_utc(),
    };
    format_built_at(at)
}

/// Splits a console script into an entry point when its metadata names one.
/// Otherwise the script must ship as `bin/<name>` in one of the sources.
fn resolve_console_script(
    sources: &[PathBuf],
    entry_point: Option<String>,
    console_script: Option<String>,
) -> Result<(Option<String>, Option<String>)> {
    if entry_point.is_some() {
        return Ok((entry_point, console_script));
    }
    let Some(script) = console_script else {
        return Ok((None, None));
    };
    if let Some(found) = find_entry_point(sources, &script)? {
        return Ok((Some(found), None));
    }
    if console_script_exists(sources, &script) {
        return Ok((None, Some(script)));
    }
    Err(BuildError::NoEntryPoint { name: script }.into())
}

fn stage_preamble(preamble: &Path, staging: &Path) -> Result<String> {
    if !preamble.is_file() {
        return Err(BuildError::MissingPreamble {
            path: preamble.to_path_buf(),
        }
        .into());
    }
    let name = preamble
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bin = staging.join("bin");
    fs::create_dir_all(&bin).with_context(|| format!("failed to create {}", bin.display()))?;
    fs::copy(preamble, bin.join(&name))
        .with_context(|| format!("failed to copy preamble {}", preamble.display()))?;
    Ok(name)
}

/// Installs, stages and packs everything a [`BuildRequest`] names.
///
/// # Errors
/// Returns a [`BuildError`] for invalid requests, failed pip installs or
/// unknown console scripts, and an error for any I/O failure.
pub fn build_archive(request: &BuildRequest) -> Result<BuildOutcome> {
    if request.pip_args.is_empty() && request.site_packages.is_empty() {
        return Err(BuildError::NoSources.into());
    }
    pip::check_pip_args(&request.pip_args)?;
    let interpreter = request.python.as_deref().unwrap_or(DEFAULT_SHEBANG);
    validate_shebang(interpreter)?;
    if request.build_id.is_some() {
        warn!(
            "Warning! You have overridden the default build-id behavior, executables created by \
             shiv must have unique build IDs or unexpected behavior could occur."
        );
    }

    let staging = tempfile::Builder::new()
        .prefix("shiv-staging-")
        .tempdir()
        .context("failed to create staging directory")?;
    let mut sources = Vec::new();
    if request.pip_args.is_empty() {
        sources.extend(request.site_packages.iter().map(|p| expand_user(p)));
    } else {
        for site_packages in &request.site_packages {
            copytree(&expand_user(site_packages), staging.path())?;
        }
        let python = detect_interpreter(&EnvOverrides::capture())?;
        pip::install(&python, staging.path(), &request.pip_args)?;
    }

    let preamble = request
        .preamble
        .as_deref()
        .map(|p| stage_preamble(p, staging.path()))
        .transpose()?;
    sources.push(staging.path().to_path_buf());

    let mut hashes = BTreeMap::new();
    if request.no_modify {
        for source in &sources {
            hashes.extend(hash_python_sources(source)?);
        }
    }

    let (entry_point, script) = resolve_console_script(
        &sources,
        request.entry_point.clone(),
        request.console_script.clone(),
    )?;

    let env = Environment::new(built_at(request)?, SHIV_VERSION)
        .with_build_id(request.build_id.clone())
        .with_entry_point(entry_point)
        .with_script(script)
        .with_compile_pyc(request.compile_pyc)
        .with_extend_pythonpath(request.extend_pythonpath)
        .with_no_modify(request.no_modify)
        .with_reproducible(request.reproducible || request.source_date_epoch.is_some())
        .with_preamble(preamble)
        .with_root(request.root.clone())
        .with_hashes(hashes);

    let output = expand_user(&request.output_file);
    let main = format!("{MAIN_MODULE}:{MAIN_FUNCTION}");
    let environment = create_archive(
        &sources,
        &output,
        interpreter,
        &main,
        env,
        request.compressed,
    )?;
    info!(
        output = %output.display(),
        build_id = environment.build_id().unwrap_or_default(),
        "archive written"
    );
    Ok(BuildOutcome {
        output,
        environment,
    })
}
