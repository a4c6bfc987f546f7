use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::BootstrapError;

/// SHA-256 of every `*.py` file under `root`, keyed by `/`-separated relative
/// path.
///
/// # Errors
/// Returns an error if the tree cannot be walked or a file cannot be read.
pub fn hash_python_sources(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "py") {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        hashes.insert(key, hex::encode(Sha256::digest(&bytes)));
    }
    Ok(hashes)
}

/// Fails when any source under `site_packages` differs from the build record.
///
/// Files absent from `expected` count as modified.
///
/// # Errors
/// Returns [`BootstrapError::SourceModified`] naming the first offending file.
pub fn ensure_no_modify(site_packages: &Path, expected: &BTreeMap<String, String>) -> Result<()> {
    for (relative, digest) in hash_python_sources(site_packages)? {
        if expected.get(&relative) != Some(&digest) {
            return Err(BootstrapError::SourceModified {
                path: site_packages.join(relative),
            }
            .into());
        }
    }
    Ok(())
}
