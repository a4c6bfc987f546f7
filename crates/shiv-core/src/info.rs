use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use shiv_bootstrap::Archive;

/// The archive's Environment Record as JSON, keys sorted.
///
/// # Errors
/// Returns an error when `path` is not a shiv archive.
pub fn read_archive_info(path: &Path) -> Result<Value> {
    let archive = Archive::locate(path)?;
    serde_json::to_value(archive.environment()).context("failed to encode environment record")
}
