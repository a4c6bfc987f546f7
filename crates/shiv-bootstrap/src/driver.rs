//! The Python half of the bootstrap.
//!
//! Everything that must happen inside the target interpreter (installing the
//! spliced `sys.path`, running `.pth` imports and `.py` preambles, calling the
//! entry point) lives in a small driver program. The launcher writes a JSON
//! payload to a file named by [`PAYLOAD_VAR`] and passes every command line
//! argument through the interpreter's own argv, where the payload refers to
//! them by position.

use std::ffi::{OsStr, OsString};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::dispatch::DispatchTarget;
use crate::environment::Environment;
use crate::interpreter::InterpreterMode;

pub const PAYLOAD_VAR: &str = "_SHIV_BOOTSTRAP";
pub const DRIVER_ARCNAME: &str = "_bootstrap/driver.py";
pub const DRIVER_SOURCE: &str = include_str!("../python/_bootstrap/driver.py");
pub const INIT_SOURCE: &str = include_str!("../python/_bootstrap/__init__.py");

/// Module and callable that `__main__.py` hands control to.
pub const MAIN_MODULE: &str = "_bootstrap";
pub const MAIN_FUNCTION: &str = "bootstrap";

/// Runtime files bundled into every archive, as `(arcname, contents)`.
pub const BOOTSTRAP_FILES: [(&str, &str); 2] = [
    ("_bootstrap/__init__.py", INIT_SOURCE),
    (DRIVER_ARCNAME, DRIVER_SOURCE),
];

/// A run of consecutive entries in an [`ArgTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArgSpan {
    pub start: usize,
    pub len: usize,
}

/// Arguments forwarded to the driver after `-c <source>`.
#[derive(Debug, Default)]
pub struct ArgTable {
    items: Vec<OsString>,
}

impl ArgTable {
    pub fn push(&mut self, item: impl AsRef<OsStr>) -> usize {
        self.items.push(item.as_ref().to_os_string());
        self.items.len() - 1
    }

    pub fn extend<I>(&mut self, items: I) -> ArgSpan
    where
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        let start = self.items.len();
        for item in items {
            self.push(item);
        }
        ArgSpan {
            start,
            len: self.items.len() - start,
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[OsString] {
        &self.items
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverTarget {
    EntryPoint {
        module: String,
        attribute: String,
    },
    Script {
        path: String,
    },
    Command {
        code: usize,
        argv: ArgSpan,
    },
    Module {
        name: usize,
        argv: ArgSpan,
    },
    Stdin {
        argv: ArgSpan,
    },
    Source {
        name: usize,
        content: String,
        argv: ArgSpan,
    },
    Repl,
}

impl DriverTarget {
    /// Encodes `target`, moving its arguments into `table`.
    pub fn new(target: &DispatchTarget, table: &mut ArgTable) -> Self {
        match target {
            DispatchTarget::EntryPoint(ep) => Self::EntryPoint {
                module: ep.module().to_string(),
                attribute: ep.attribute().to_string(),
            },
            DispatchTarget::Script(path) => Self::Script {
                path: path.to_string_lossy().into_owned(),
            },
            DispatchTarget::Interactive(mode) => match mode {
                InterpreterMode::Command { code, argv } => Self::Command {
                    code: table.push(code),
                    argv: table.extend(argv),
                },
                InterpreterMode::Module { name, argv } => Self::Module {
                    name: table.push(name),
                    argv: table.extend(argv),
                },
                InterpreterMode::Stdin { argv } => Self::Stdin {
                    argv: table.extend(argv),
                },
                InterpreterMode::Source {
                    name,
                    content,
                    argv,
                } => Self::Source {
                    name: table.push(name),
                    content: content.clone(),
                    argv: table.extend(argv),
                },
                InterpreterMode::Repl => Self::Repl,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DriverPayload<'a> {
    pub site_packages: String,
    pub sys_path: &'a [String],
    pub pth_exec: &'a [String],
    /// The record as seen by `.py` preambles.
    pub env: &'a Environment,
    /// A `.py` preamble, run in the interpreter before dispatch.
    pub preamble: Option<String>,
    /// Initial `sys.argv`; its first entry is the archive.
    pub argv: ArgSpan,
    pub target: DriverTarget,
}

/// Writes `payload` to a private file in `dir`, removed when the handle drops.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_payload(payload: &DriverPayload<'_>, dir: &Path) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(".shiv-payload-")
        .suffix(".json")
        .tempfile_in(dir)
        .with_context(|| format!("failed to create bootstrap payload in {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        serde_json::to_writer(&mut writer, payload).context("failed to encode bootstrap payload")?;
        writer.flush().context("failed to write bootstrap payload")?;
    }
    Ok(file)
}

/// `__main__.py` for an archive whose main callable is `module:function`.
#[must_use]
pub fn main_shim(module: &str, function: &str) -> String {
    format!("# -*- coding: utf-8 -*-\nimport {module}\n{module}.{function}()\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry_point::EntryPoint;

    #[test]
    fn targets_are_tagged_by_kind() {
        let mut table = ArgTable::default();
        let ep: EntryPoint = "hello:main".parse().expect("entry point");
        let value =
            serde_json::to_value(DriverTarget::new(&DispatchTarget::EntryPoint(ep), &mut table))
                .expect("encode");
        assert_eq!(
            value,
            serde_json::json!({"kind": "entry_point", "module": "hello", "attribute": "main"})
        );
        assert!(table.as_slice().is_empty());

        let value = serde_json::to_value(DriverTarget::new(
            &DispatchTarget::Interactive(InterpreterMode::Repl),
            &mut table,
        ))
        .expect("encode");
        assert_eq!(value, serde_json::json!({"kind": "repl"}));
    }

    #[test]
    fn interpreter_arguments_are_referenced_by_position() {
        let mut table = ArgTable::default();
        let base = table.extend(["app.pyz", "-c", "print(1)", "a"]);
        assert_eq!(base, ArgSpan { start: 0, len: 4 });

        let mode = InterpreterMode::Command {
            code: "print(1)".into(),
            argv: vec!["-c".into(), "a".into()],
        };
        let value =
            serde_json::to_value(DriverTarget::new(&DispatchTarget::Interactive(mode), &mut table))
                .expect("encode");
        assert_eq!(
            value,
            serde_json::json!({
                "kind": "command",
                "code": 4,
                "argv": {"start": 5, "len": 2},
            })
        );
        let table: Vec<&str> = table
            .as_slice()
            .iter()
            .map(|item| item.to_str().expect("utf8"))
            .collect();
        assert_eq!(table, ["app.pyz", "-c", "print(1)", "a", "print(1)", "-c", "a"]);
    }

    #[test]
    fn payload_file_holds_large_records() {
        let temp = tempfile::tempdir().expect("tempdir");
        let hashes = (0..5000)
            .map(|i| (format!("pkg/mod_{i}.py"), "0".repeat(64)))
            .collect();
        let env = Environment::new("2019-01-01 12:12:12", "1.0.0").with_hashes(hashes);
        let mut table = ArgTable::default();
        let payload = DriverPayload {
            site_packages: "/cache/site-packages".into(),
            sys_path: &[],
            pth_exec: &[],
            env: &env,
            preamble: None,
            argv: table.extend(["app.pyz"]),
            target: DriverTarget::Repl,
        };

        let file = write_payload(&payload, temp.path()).expect("write payload");
        assert!(file.path().starts_with(temp.path()));
        let decoded: serde_json::Value =
            serde_json::from_slice(&std::fs::read(file.path()).expect("read payload"))
                .expect("decode payload");
        assert_eq!(decoded["target"]["kind"], "repl");
        assert_eq!(decoded["env"]["hashes"].as_object().map(|m| m.len()), Some(5000));

        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn main_shim_imports_and_calls() {
        assert_eq!(
            main_shim(MAIN_MODULE, MAIN_FUNCTION),
            "# -*- coding: utf-8 -*-\nimport _bootstrap\n_bootstrap.bootstrap()\n"
        );
    }

    #[test]
    fn driver_reads_the_payload_variable() {
        assert!(DRIVER_SOURCE.contains(PAYLOAD_VAR));
    }
}
