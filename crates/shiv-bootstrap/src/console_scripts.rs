//! Console script lookup across installed distribution metadata.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

const SECTION: &str = "console_scripts";

/// Parses the `[console_scripts]` section of an `entry_points.txt` file.
///
/// Names are case-insensitive and stored lowercased; trailing `[extras]`
/// markers are dropped from the value.
#[must_use]
pub fn parse_console_scripts(contents: &str) -> BTreeMap<String, String> {
    let mut scripts = BTreeMap::new();
    let mut in_section = false;
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = header.trim() == SECTION;
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((name, target)) = line.split_once('=') else {
            continue;
        };
        let target = match target.find('[') {
            Some(idx) => &target[..idx],
            None => target,
        };
        scripts.insert(name.trim().to_lowercase(), target.trim().to_string());
    }
    scripts
}

/// Finds the `module:attr` target registered for `name` in any
/// `entry_points.txt` beneath `site_dirs`. Later files win on conflicts.
///
/// # Errors
/// Returns an error if a metadata file exists but cannot be read.
pub fn find_entry_point<P: AsRef<Path>>(site_dirs: &[P], name: &str) -> Result<Option<String>> {
    let wanted = name.to_lowercase();
    let mut found = None;
    for site_dir in site_dirs {
        for entry in WalkDir::new(site_dir.as_ref())
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            if !entry.file_type().is_file() || entry.file_name() != "entry_points.txt" {
                continue;
            }
            let contents = fs::read_to_string(entry.path())
                .with_context(|| format!("failed to read {}", entry.path().display()))?;
            if let Some(target) = parse_console_scripts(&contents).remove(&wanted) {
                found = Some(target);
            }
        }
    }
    Ok(found)
}

/// Whether a `bin/<name>` script ships in any of `site_dirs`.
#[must_use]
pub fn console_script_exists<P: AsRef<Path>>(site_dirs: &[P], name: &str) -> bool {
    site_dirs
        .iter()
        .any(|dir| dir.as_ref().join("bin").join(name).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = "\
[console_scripts]
Hello = hello.cli:main [color]
other=other:run

[gui_scripts]
viewer = hello.gui:main
";

    #[test]
    fn parses_only_console_scripts_section() {
        let scripts = parse_console_scripts(METADATA);
        assert_eq!(scripts.get("hello").map(String::as_str), Some("hello.cli:main"));
        assert_eq!(scripts.get("other").map(String::as_str), Some("other:run"));
        assert!(!scripts.contains_key("viewer"));
    }

    #[test]
    fn finds_entry_point_in_dist_info() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dist = temp.path().join("hello-1.0.dist-info");
        fs::create_dir_all(&dist).expect("mkdir");
        fs::write(dist.join("entry_points.txt"), METADATA).expect("write");

        let dirs = [temp.path()];
        assert_eq!(
            find_entry_point(&dirs, "HELLO").expect("lookup").as_deref(),
            Some("hello.cli:main")
        );
        assert_eq!(find_entry_point(&dirs, "viewer").expect("lookup"), None);
    }

    #[test]
    fn bin_scripts_are_detected() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("bin")).expect("mkdir");
        fs::write(temp.path().join("bin/tool"), "#!/bin/sh\n").expect("write");

        let dirs = [temp.path()];
        assert!(console_script_exists(&dirs, "tool"));
        assert!(!console_script_exists(&dirs, "missing"));
    }
}
