use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use zip::ZipArchive;

use crate::driver::{DRIVER_ARCNAME, DRIVER_SOURCE};
use crate::environment::{EnvOverrides, Environment};
use crate::error::BootstrapError;

pub const ENVIRONMENT_ARCNAME: &str = "environment.json";
const DEFAULT_ROOT: &str = ".shiv";

/// An opened archive together with its decoded Environment Record.
pub struct Archive {
    path: PathBuf,
    zip: ZipArchive<File>,
    environment: Environment,
}

impl Archive {
    /// Opens `path` and reads its `environment.json`.
    ///
    /// # Errors
    /// Returns [`BootstrapError::NotAnArchive`] when the file is not a zip or
    /// carries no readable record.
    pub fn locate(path: &Path) -> Result<Self> {
        let not_an_archive = |reason: String| BootstrapError::NotAnArchive {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|err| not_an_archive(err.to_string()))?;
        let mut zip = ZipArchive::new(file).map_err(|err| not_an_archive(err.to_string()))?;
        let raw = {
            let mut entry = zip
                .by_name(ENVIRONMENT_ARCNAME)
                .map_err(|_| not_an_archive(format!("missing {ENVIRONMENT_ARCNAME}")))?;
            let mut raw = String::new();
            entry
                .read_to_string(&mut raw)
                .map_err(|err| not_an_archive(err.to_string()))?;
            raw
        };
        let environment =
            Environment::from_json(&raw).map_err(|err| not_an_archive(format!("{err:#}")))?;
        debug!(archive = %path.display(), build_id = ?environment.build_id(), "located archive");
        Ok(Self {
            path: path.to_path_buf(),
            zip,
            environment,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn zip_mut(&mut self) -> &mut ZipArchive<File> {
        &mut self.zip
    }

    /// The driver bundled in the archive, or the launcher's own copy for
    /// archives built without one.
    pub fn driver_source(&mut self) -> String {
        let mut source = String::new();
        let bundled = match self.zip.by_name(DRIVER_ARCNAME) {
            Ok(mut entry) => entry.read_to_string(&mut source).is_ok(),
            Err(_) => false,
        };
        if bundled {
            source
        } else {
            DRIVER_SOURCE.to_string()
        }
    }

    /// `<root>/<archive file name>_<build id>`.
    ///
    /// # Errors
    /// Returns [`BootstrapError::MissingBuildId`] for records without a build
    /// id, or an error if the archive path cannot be resolved.
    pub fn cache_path(&self, overrides: &EnvOverrides) -> Result<PathBuf> {
        let build_id =
            self.environment
                .build_id()
                .ok_or_else(|| BootstrapError::MissingBuildId {
                    path: self.path.clone(),
                })?;
        let resolved = fs::canonicalize(&self.path)
            .with_context(|| format!("failed to resolve {}", self.path.display()))?;
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let root = cache_root(self.environment.root(overrides).as_deref(), overrides);
        Ok(root.join(format!("{name}_{build_id}")))
    }
}

fn expand_tilde(raw: &str) -> PathBuf {
    let home = dirs_next::home_dir();
    match (raw.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') || rest.starts_with('\\') => {
            home.join(&rest[1..])
        }
        _ => PathBuf::from(raw),
    }
}

/// Cache root for a configured value.
///
/// `$NAME` reads the root from another variable, falling back to `NAME`
/// itself; `~` expands to the home directory; no value means `~/.shiv`.
#[must_use]
pub fn cache_root(root: Option<&str>, overrides: &EnvOverrides) -> PathBuf {
    match root.filter(|r| !r.is_empty()) {
        Some(root) => {
            let root = match root.strip_prefix('$') {
                Some(var) => overrides.var(var).unwrap_or(var),
                None => root,
            };
            expand_tilde(root)
        }
        None => dirs_next::home_dir()
            .map_or_else(|| PathBuf::from(DEFAULT_ROOT), |home| home.join(DEFAULT_ROOT)),
    }
}
