//! Module search path splicing.
//!
//! Mirrors what `site.addsitedir` does to `sys.path`, computed ahead of time so
//! the launched interpreter can adopt the final path verbatim.

use std::fs;
use std::path::{self, Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Result of splicing an extracted site directory into a base path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplicedPath {
    /// The complete search path, in lookup order.
    pub entries: Vec<String>,
    /// Entries that were not part of the base path.
    pub added: Vec<String>,
    /// `import` lines collected from `.pth` files, to be run by the interpreter.
    pub pth_exec: Vec<String>,
}

/// Index of the first pre-existing `site-packages` or `dist-packages` entry.
///
/// With no such entry the result is `path.len()`, so spliced entries stay at
/// the end.
#[must_use]
pub fn first_sitedir_index(path: &[String]) -> usize {
    path.iter()
        .position(|entry| {
            Path::new(entry)
                .file_stem()
                .is_some_and(|stem| stem == "site-packages" || stem == "dist-packages")
        })
        .unwrap_or(path.len())
}

/// `site.makepath`: `dir/entry` made absolute with `.` and `..` folded
/// lexically, so equivalent spellings dedupe.
fn make_path(dir: &Path, entry: &str) -> PathBuf {
    let joined = dir.join(entry);
    let absolute = path::absolute(&joined).unwrap_or(joined);
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
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

fn is_import_line(line: &str) -> bool {
    line.starts_with("import ") || line.starts_with("import\t")
}

/// Appends `site_dir` and anything its `.pth` files reference to `path`.
///
/// # Errors
/// Returns an error if the site directory cannot be listed.
pub fn add_site_dir(path: &mut Vec<String>, site_dir: &Path) -> Result<Vec<String>> {
    let site = site_dir.to_string_lossy().into_owned();
    if !path.contains(&site) {
        path.push(site);
    }

    let mut pth_files: Vec<PathBuf> = fs::read_dir(site_dir)
        .with_context(|| format!("failed to list {}", site_dir.display()))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "pth")
                && !p
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with('.'))
        })
        .collect();
    pth_files.sort();

    let mut exec_lines = Vec::new();
    for pth in pth_files {
        let Ok(contents) = fs::read_to_string(&pth) else {
            debug!(pth = %pth.display(), "skipping unreadable .pth file");
            continue;
        };
        for line in contents.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            if is_import_line(line) {
                exec_lines.push(line.to_string());
                continue;
            }
            let candidate = make_path(site_dir, line.trim_end());
            if candidate.exists() {
                let candidate = candidate.to_string_lossy().into_owned();
                if !path.contains(&candidate) {
                    path.push(candidate);
                }
            }
        }
    }
    Ok(exec_lines)
}

/// Adds `site_dir` to `base` and moves the new entries ahead of the first
/// pre-existing site directory, so archive packages shadow installed ones.
///
/// # Errors
/// Returns an error if the site directory cannot be listed.
pub fn splice(base: &[String], site_dir: &Path) -> Result<SplicedPath> {
    let mut path = base.to_vec();
    let length = path.len();
    let index = first_sitedir_index(&path);
    let pth_exec = add_site_dir(&mut path, site_dir)?;

    let added = path[length..].to_vec();
    let mut entries = Vec::with_capacity(path.len());
    entries.extend_from_slice(&path[..index]);
    entries.extend_from_slice(&added);
    entries.extend_from_slice(&path[index..length]);

    debug!(added = added.len(), index, "spliced module search path");
    Ok(SplicedPath {
        entries,
        added,
        pth_exec,
    })
}

/// Appends `added` to an existing `PYTHONPATH` value without duplicates.
#[must_use]
pub fn extend_python_path(existing: Option<&str>, added: &[String]) -> String {
    let separator = if cfg!(windows) { ';' } else { ':' };
    let mut parts: Vec<String> = Vec::new();
    let current = existing
        .unwrap_or_default()
        .split(separator)
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned);
    for part in current.chain(added.iter().cloned()) {
        if !parts.contains(&part) {
            parts.push(part);
        }
    }
    parts.join(&separator.to_string())
}
