use std::fs::{self, Permissions};
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

#[cfg(unix)]
fn grant_owner_write(perms: &mut Permissions) -> bool {
    use std::os::unix::fs::PermissionsExt;
    let mode = perms.mode();
    if mode & 0o200 != 0 {
        return false;
    }
    perms.set_mode(mode | 0o200);
    true
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn grant_owner_write(perms: &mut Permissions) -> bool {
    if !perms.readonly() {
        return false;
    }
    perms.set_readonly(false);
    true
}

/// Deletes a cache entry or staging directory.
///
/// Payload members keep the modes recorded in the archive, so read-only
/// directories are made writable on the way down. A missing path is not an
/// error.
pub(crate) fn remove_tree(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("failed to stat {}", path.display())),
    };
    if !meta.is_dir() {
        return fs::remove_file(path)
            .with_context(|| format!("failed to remove {}", path.display()));
    }

    for entry in WalkDir::new(path) {
        let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
        if entry.path_is_symlink() {
            continue;
        }
        let mut perms = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?
            .permissions();
        if grant_owner_write(&mut perms) {
            fs::set_permissions(entry.path(), perms)
                .with_context(|| format!("failed to make {} writable", entry.path().display()))?;
        }
    }
    fs::remove_dir_all(path).with_context(|| format!("failed to remove {}", path.display()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn remove_tree_handles_read_only_members() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("entry");
        let nested = root.join("pkg");
        fs::create_dir_all(&nested).expect("mkdir");
        let file = nested.join("mod.py");
        fs::write(&file, "x = 1\n").expect("write");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o444)).expect("chmod file");
        fs::set_permissions(&nested, fs::Permissions::from_mode(0o555)).expect("chmod dir");

        remove_tree(&root).expect("remove");
        assert!(!root.exists());
    }

    #[test]
    fn remove_tree_removes_plain_files_and_dangling_links() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("entry.tmp");
        fs::write(&file, "partial").expect("write");
        remove_tree(&file).expect("remove file");
        assert!(!file.exists());

        let link = temp.path().join("link");
        std::os::unix::fs::symlink(temp.path().join("gone"), &link).expect("symlink");
        remove_tree(&link).expect("remove link");
        assert!(fs::symlink_metadata(&link).is_err());
    }

    #[test]
    fn remove_tree_ignores_missing_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        remove_tree(&temp.path().join("absent")).expect("missing is fine");
    }
}
