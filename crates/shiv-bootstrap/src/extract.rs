//! Materializes an archive's `site-packages` payload into the cache.
//!
//! Extraction happens under an exclusive [`FileLock`] into a sibling `.tmp`
//! directory which is renamed into place only once fully written, so the
//! final cache entry is either absent or complete.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::fs::remove_tree;
use crate::lock::FileLock;

const PAYLOAD_PREFIX: &str = "site-packages";
const COMPILE_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub compile_pyc: bool,
    /// Zero compiles on the calling thread.
    pub compile_workers: usize,
    pub force: bool,
    pub lock_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    Extracted,
    AlreadyPresent,
}

/// Byte-compiles Python sources in place.
pub trait PycCompiler: Sync {
    /// # Errors
    /// Returns an error when the compiler cannot be started.
    fn compile(&self, files: &[PathBuf]) -> Result<()>;
}

/// Compiles with `python -m compileall`, one process per batch.
#[derive(Debug, Clone)]
pub struct PythonCompiler {
    python: String,
}

impl PythonCompiler {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl PycCompiler for PythonCompiler {
    fn compile(&self, files: &[PathBuf]) -> Result<()> {
        let status = Command::new(&self.python)
            .args(["-m", "compileall", "-q"])
            .args(files)
            .status()
            .with_context(|| format!("failed to run compileall via {}", self.python))?;
        if !status.success() {
            // sources that fail to compile still import from source
            warn!(status = %status, files = files.len(), "compileall reported failures");
        }
        Ok(())
    }
}

/// Sibling paths used while building a cache entry.
fn staging_paths(target: &Path) -> (PathBuf, PathBuf) {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    let mut tmp = name.clone();
    tmp.push(".tmp");
    let mut lock = OsString::from(".");
    lock.push(&name);
    lock.push("_lock");
    (parent.join(tmp), parent.join(lock))
}

/// Extracts every `site-packages*` member of `zip` into `target` exactly once.
///
/// # Errors
/// Returns an error if locking, extraction, precompilation or the final rename
/// fails. No partial entry is left at `target` in that case.
pub fn extract_site_packages<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    target: &Path,
    options: &ExtractOptions,
    compiler: &dyn PycCompiler,
) -> Result<ExtractOutcome> {
    let (tmp, lock_path) = staging_paths(target);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let _lock = FileLock::acquire(&lock_path, options.lock_timeout)?;
    if target.exists() && !options.force {
        debug!(target = %target.display(), "cache entry already present");
        return Ok(ExtractOutcome::AlreadyPresent);
    }

    remove_tree(&tmp)?;
    unpack_payload(zip, &tmp)?;

    if options.compile_pyc {
        compile_tree(&tmp, options.compile_workers, compiler)?;
    }

    if target.exists() {
        remove_tree(target)?;
    }
    fs::rename(&tmp, target).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp.display(),
            target.display()
        )
    })?;
    info!(target = %target.display(), "extracted archive payload");
    Ok(ExtractOutcome::Extracted)
}

fn unpack_payload<R: Read + Seek>(zip: &mut ZipArchive<R>, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .with_context(|| format!("failed to read archive member #{index}"))?;
        if !entry.name().starts_with(PAYLOAD_PREFIX) {
            continue;
        }
        let Some(path) = entry.enclosed_name().map(|p| dest.join(p)) else {
            warn!(name = entry.name(), "skipping archive member outside the payload");
            continue;
        };
        if entry.is_dir() {
            fs::create_dir_all(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&path, fs::Permissions::from_mode(mode & 0o7777))
                    .with_context(|| format!("failed to set permissions on {}", path.display()))?;
            }
        }
    }
    Ok(())
}

fn compile_tree(root: &Path, workers: usize, compiler: &dyn PycCompiler) -> Result<()> {
    let sources: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "py"))
        .collect();
    if sources.is_empty() {
        return Ok(());
    }
    debug!(files = sources.len(), workers, "precompiling sources");

    if workers == 0 {
        for batch in sources.chunks(COMPILE_BATCH) {
            compiler.compile(batch)?;
        }
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("failed to start precompile workers")?;
    pool.install(|| {
        sources
            .par_chunks(COMPILE_BATCH)
            .try_for_each(|batch| compiler.compile(batch))
    })
}
