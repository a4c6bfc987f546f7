#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use tempfile::TempDir;

const HELLO_INIT: &str = r#"import os
import sys


def main():
    print("hello world")


def fail():
    return 3


def show_env():
    print(os.environ.get("PYTHONPATH", ""))
    print(sys.argv[1:])
"#;

const HELLO_MAIN: &str = "print('hello from module')\n";

pub fn find_python() -> Option<String> {
    let candidates = [
        std::env::var("PYTHON").ok(),
        Some("python3".to_string()),
        Some("python".to_string()),
    ];
    for candidate in candidates.into_iter().flatten() {
        let status = std::process::Command::new(&candidate)
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        if matches!(status, Ok(code) if code.success()) {
            return Some(candidate);
        }
    }
    None
}

/// A site-packages tree holding a tiny `hello` package.
pub fn hello_site_packages(root: &Path) -> PathBuf {
    let site = root.join("site-packages");
    let pkg = site.join("hello");
    fs::create_dir_all(&pkg).expect("create hello package");
    fs::write(pkg.join("__init__.py"), HELLO_INIT).expect("write __init__.py");
    fs::write(pkg.join("__main__.py"), HELLO_MAIN).expect("write __main__.py");
    site
}

pub struct Fixture {
    pub temp: TempDir,
    pub site: PathBuf,
    pub cache: PathBuf,
}

impl Fixture {
    pub fn new(prefix: &str) -> Self {
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .expect("tempdir");
        let site = hello_site_packages(temp.path());
        let cache = temp.path().join("cache");
        Self { temp, site, cache }
    }

    /// Builds `<name>` from the fixture's site-packages plus `extra` flags.
    pub fn build(&self, name: &str, extra: &[&str]) -> PathBuf {
        let output = self.temp.path().join(name);
        cargo_bin_cmd!("shiv")
            .arg("-o")
            .arg(&output)
            .arg("--site-packages")
            .arg(&self.site)
            .args(extra)
            .assert()
            .success();
        output
    }

    /// `shiv-boot <archive>` with the fixture cache and the given python.
    pub fn boot(&self, archive: &Path, python: &str) -> Command {
        let mut cmd = cargo_bin_cmd!("shiv-boot");
        cmd.arg(archive)
            .env("SHIV_ROOT", &self.cache)
            .env("SHIV_PYTHON", python)
            .env_remove("SHIV_ENTRY_POINT")
            .env_remove("SHIV_MODULE")
            .env_remove("SHIV_CONSOLE_SCRIPT")
            .env_remove("SHIV_INTERPRETER")
            .env_remove("SHIV_FORCE_EXTRACT")
            .env_remove("PYTHONPATH");
        cmd
    }

    /// The single cache entry created for `archive`.
    pub fn cache_entry(&self, archive: &Path) -> PathBuf {
        let name = archive
            .file_name()
            .expect("archive name")
            .to_string_lossy()
            .into_owned();
        let entries: Vec<PathBuf> = fs::read_dir(&self.cache)
            .expect("read cache")
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_dir()
                    && path
                        .file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with(&format!("{name}_")))
            })
            .collect();
        assert_eq!(entries.len(), 1, "cache entries: {entries:?}");
        entries.into_iter().next().expect("cache entry")
    }
}

pub fn stdout(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout")
}

pub fn stderr(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stderr.clone()).expect("utf8 stderr")
}
