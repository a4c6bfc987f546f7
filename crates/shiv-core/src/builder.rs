//! Archive writer.
//!
//! Produces `#!<interpreter>\n` followed by a zip holding the payload under
//! `site-packages/`, the `_bootstrap` runtime files, `environment.json` and
//! finally `__main__.py`. Entry order and metadata are fully determined by the
//! inputs so identical trees build identical bytes.

use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use shiv_bootstrap::archive::ENVIRONMENT_ARCNAME;
use shiv_bootstrap::driver::{main_shim, BOOTSTRAP_FILES};
use shiv_bootstrap::{EntryPoint, Environment};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::BuildError;

/// Longest interpreter directive the kernel reads from a shebang line.
pub const BINPRM_BUF_SIZE: usize = 128;
pub const DEFAULT_SHEBANG: &str = "/usr/bin/env shiv-boot";
pub const PAYLOAD_DIR: &str = "site-packages";
const GENERATED_MODE: u32 = 0o644;

pub(crate) fn parse_built_at(built_at: &str) -> Option<PrimitiveDateTime> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(built_at, &format).ok()
}

pub(crate) fn format_built_at(at: OffsetDateTime) -> Result<String> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(&format).context("failed to format build timestamp")
}

/// Zip timestamps start in 1980; anything earlier or unparsable clamps there.
fn zip_time(at: PrimitiveDateTime) -> DateTime {
    let Ok(year) = u16::try_from(at.year()) else {
        return DateTime::default();
    };
    DateTime::from_date_and_time(
        year,
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
    )
    .unwrap_or_default()
}

fn file_mtime(path: &Path) -> Option<DateTime> {
    let modified: SystemTime = fs::metadata(path).ok()?.modified().ok()?;
    let at = OffsetDateTime::from(modified);
    Some(zip_time(PrimitiveDateTime::new(at.date(), at.time())))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode())
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

/// Validates the strict `module:function` form used for `__main__.py`.
///
/// # Errors
/// Returns [`BuildError::InvalidEntryPoint`] for anything else.
pub fn validate_main(main: &str) -> Result<EntryPoint, BuildError> {
    main.parse().map_err(|_| BuildError::InvalidEntryPoint {
        value: main.to_string(),
    })
}

/// # Errors
/// Returns [`BuildError::ShebangTooLong`] past [`BINPRM_BUF_SIZE`] bytes.
pub fn validate_shebang(interpreter: &str) -> Result<(), BuildError> {
    if interpreter.len() > BINPRM_BUF_SIZE {
        return Err(BuildError::ShebangTooLong {
            len: interpreter.len(),
        });
    }
    Ok(())
}

struct EntryWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    compression: CompressionMethod,
    fixed_time: DateTime,
    reproducible: bool,
    hasher: Sha256,
}

impl<W: Write + Seek> EntryWriter<W> {
    fn options(&self, time: DateTime, mode: Option<u32>) -> FileOptions {
        let options = FileOptions::default()
            .compression_method(self.compression)
            .last_modified_time(time);
        match mode {
            Some(mode) => options.unix_permissions(mode & 0o7777),
            None => options,
        }
    }

    fn write(&mut self, arcname: &str, data: &[u8], options: FileOptions, hashed: bool) -> Result<()> {
        if hashed {
            self.hasher.update(arcname.as_bytes());
            self.hasher.update(data);
        }
        self.zip
            .start_file(arcname, options)
            .with_context(|| format!("failed to add {arcname} to archive"))?;
        self.zip
            .write_all(data)
            .with_context(|| format!("failed to write {arcname}"))?;
        Ok(())
    }

    fn add_file(&mut self, arcname: &str, source: &Path) -> Result<()> {
        let data = fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;
        let time = if self.reproducible {
            self.fixed_time
        } else {
            file_mtime(source).unwrap_or(self.fixed_time)
        };
        let options = self.options(time, file_mode(source));
        self.write(arcname, &data, options, true)
    }

    fn add_generated(&mut self, arcname: &str, data: &[u8], hashed: bool) -> Result<()> {
        let options = self.options(self.fixed_time, Some(GENERATED_MODE));
        self.write(arcname, data, options, hashed)
    }
}

fn payload_entries(source: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
        let path = entry.path();
        if entry.file_type().is_dir() || path.extension().is_some_and(|ext| ext == "pyc") {
            continue;
        }
        let relative = path.strip_prefix(source).unwrap_or(path);
        let mut arcname = String::from(PAYLOAD_DIR);
        for component in relative.components() {
            arcname.push('/');
            arcname.push_str(&component.as_os_str().to_string_lossy());
        }
        entries.push((arcname, path.to_path_buf()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Writes an archive for `sources` to `target`.
///
/// `main` is validated before the target is touched. When `env` carries no
/// build id, the SHA-256 of the payload and runtime files becomes one. Returns
/// the record as written.
///
/// # Errors
/// Returns a [`BuildError`] for an invalid `main` or an over-long shebang, and
/// an error for any I/O failure while writing.
pub fn create_archive(
    sources: &[PathBuf],
    target: &Path,
    interpreter: &str,
    main: &str,
    mut env: Environment,
    compressed: bool,
) -> Result<Environment> {
    let main = validate_main(main)?;
    validate_shebang(interpreter)?;

    let fixed_time = parse_built_at(env.built_at()).map_or_else(DateTime::default, zip_time);
    let file =
        File::create(target).with_context(|| format!("failed to create {}", target.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(format!("#!{interpreter}\n").as_bytes())
        .context("failed to write shebang")?;

    let mut writer = EntryWriter {
        zip: ZipWriter::new(out),
        compression: if compressed {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        },
        fixed_time,
        reproducible: env.reproducible(),
        hasher: Sha256::new(),
    };

    for source in sources {
        let entries = payload_entries(source)?;
        debug!(source = %source.display(), files = entries.len(), "adding payload");
        for (arcname, path) in entries {
            writer.add_file(&arcname, &path)?;
        }
    }
    for (arcname, contents) in BOOTSTRAP_FILES {
        writer.add_generated(arcname, contents.as_bytes(), true)?;
    }

    let digest = hex::encode(writer.hasher.clone().finalize());
    if env.build_id().is_none() {
        env.set_build_id(digest);
    }
    let json = env.to_json()?;
    writer.add_generated(ENVIRONMENT_ARCNAME, json.as_bytes(), false)?;
    let shim = main_shim(main.module(), main.attribute());
    writer.add_generated("__main__.py", shim.as_bytes(), false)?;

    let out = writer.zip.finish().context("failed to finish archive")?;
    out.into_inner()
        .map_err(|err| err.into_error())
        .context("failed to flush archive")?
        .sync_all()
        .context("failed to sync archive")?;
    make_executable(target)?;
    Ok(env)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn source_tree() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        let pkg = temp.path().join("hello");
        fs::create_dir_all(pkg.join("__pycache__")).expect("mkdir");
        fs::write(pkg.join("__init__.py"), "def main():\n    print('hello world')\n")
            .expect("write");
        fs::write(pkg.join("__pycache__/__init__.cpython-311.pyc"), b"\x00").expect("write");
        fs::write(temp.path().join("zeta.txt"), "z").expect("write");
        temp
    }

    fn env() -> Environment {
        Environment::new("2019-01-01 12:12:12", "1.0.0")
    }

    fn names(path: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(path).expect("open")).expect("zip");
        (0..zip.len())
            .map(|i| zip.by_index(i).expect("entry").name().to_string())
            .collect()
    }

    #[test]
    fn writes_prefix_and_ordered_entries() {
        let src = source_tree();
        let out = tempfile::tempdir().expect("tempdir");
        let target = out.path().join("test.zip");

        let env = create_archive(
            &[src.path().to_path_buf()],
            &target,
            "/usr/bin/env python3",
            "_bootstrap:bootstrap",
            env(),
            true,
        )
        .expect("create");

        let bytes = fs::read(&target).expect("read");
        assert!(bytes.starts_with(b"#!/usr/bin/env python3\n"));
        assert_eq!(
            names(&target),
            vec![
                "site-packages/hello/__init__.py",
                "site-packages/zeta.txt",
                "_bootstrap/__init__.py",
                "_bootstrap/driver.py",
                "environment.json",
                "__main__.py",
            ]
        );
        assert_eq!(env.build_id().map(str::len), Some(64));

        let mut zip = ZipArchive::new(File::open(&target).expect("open")).expect("zip");
        let mut main = String::new();
        zip.by_name("__main__.py")
            .expect("main")
            .read_to_string(&mut main)
            .expect("read");
        assert!(main.contains("import _bootstrap\n_bootstrap.bootstrap()"));
    }

    #[test]
    fn shebang_too_long_is_rejected_before_writing() {
        let src = source_tree();
        let out = tempfile::tempdir().expect("tempdir");
        let target = out.path().join("test.zip");
        let interpreter = "/".repeat(BINPRM_BUF_SIZE + 1);

        let err = create_archive(
            &[src.path().to_path_buf()],
            &target,
            &interpreter,
            "_bootstrap:bootstrap",
            env(),
            true,
        )
        .expect_err("too long");
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::ShebangTooLong { .. })
        ));
        assert!(!target.exists());
    }

    #[test]
    fn invalid_entry_point_is_rejected_before_writing() {
        let src = source_tree();
        let out = tempfile::tempdir().expect("tempdir");
        let target = out.path().join("test.zip");

        let err = create_archive(
            &[src.path().to_path_buf()],
            &target,
            "/usr/bin/env python3",
            "hello",
            env(),
            true,
        )
        .expect_err("invalid");
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidEntryPoint { .. })
        ));
        assert!(!target.exists());
    }

    #[test]
    fn reproducible_builds_are_byte_identical() {
        let src = source_tree();
        let out = tempfile::tempdir().expect("tempdir");
        let first = out.path().join("first.pyz");
        let second = out.path().join("second.pyz");
        let env = env().with_reproducible(true);

        for target in [&first, &second] {
            create_archive(
                &[src.path().to_path_buf()],
                target,
                DEFAULT_SHEBANG,
                "_bootstrap:bootstrap",
                env.clone(),
                true,
            )
            .expect("create");
        }
        assert_eq!(fs::read(&first).expect("first"), fs::read(&second).expect("second"));
    }

    #[test]
    fn explicit_build_id_is_kept_and_content_changes_the_digest() {
        let src = source_tree();
        let out = tempfile::tempdir().expect("tempdir");
        let target = out.path().join("a.pyz");
        let sources = [src.path().to_path_buf()];

        let pinned = create_archive(
            &sources,
            &target,
            DEFAULT_SHEBANG,
            "_bootstrap:bootstrap",
            env().with_build_id(Some("custom".into())),
            true,
        )
        .expect("create");
        assert_eq!(pinned.build_id(), Some("custom"));

        let build = || {
            create_archive(
                &sources,
                &target,
                DEFAULT_SHEBANG,
                "_bootstrap:bootstrap",
                env(),
                true,
            )
            .expect("create")
        };
        let before = build();
        fs::rename(src.path().join("zeta.txt"), src.path().join("omega.txt")).expect("rename");
        let after = build();
        assert_ne!(before.build_id(), after.build_id());
    }

    #[cfg(unix)]
    #[test]
    fn preserves_permissions_and_marks_executable() {
        use std::os::unix::fs::PermissionsExt;
        let src = source_tree();
        let script = src.path().join("tool.sh");
        fs::write(&script, "#!/bin/sh\n").expect("write");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).expect("chmod");
        let out = tempfile::tempdir().expect("tempdir");
        let target = out.path().join("perm.pyz");

        create_archive(
            &[src.path().to_path_buf()],
            &target,
            DEFAULT_SHEBANG,
            "_bootstrap:bootstrap",
            env(),
            false,
        )
        .expect("create");

        let mode = fs::metadata(&target).expect("stat").permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        let mut zip = ZipArchive::new(File::open(&target).expect("open")).expect("zip");
        let entry = zip.by_name("site-packages/tool.sh").expect("entry");
        assert_eq!(entry.unix_mode().map(|m| m & 0o777), Some(0o750));
        assert_eq!(entry.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn built_at_round_trips_through_zip_time() {
        let at = parse_built_at("2019-01-01 12:12:12").expect("parse");
        let zt = zip_time(at);
        assert_eq!((zt.year(), zt.month(), zt.day()), (2019, 1, 1));
        let clamped = zip_time(parse_built_at("1970-01-01 00:00:00").expect("parse"));
        assert_eq!((clamped.year(), clamped.month(), clamped.day()), (1980, 1, 1));
    }
}
