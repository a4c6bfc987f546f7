//! Interpreter drop-in mode.
//!
//! When an archive has nothing to dispatch to, it behaves like `python`
//! itself with the archive's packages importable. The arguments follow the
//! interpreter's own command line contract for `-c`, `-m`, `-`, a script
//! path, or nothing at all.

use std::borrow::Cow;
use std::ffi::OsString;
use std::fs;
use std::path::Path;

use crate::error::BootstrapError;

/// Arguments are kept as the OS handed them over; they are forwarded to the
/// interpreter's own `sys.argv` without re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterMode {
    /// `-c <code>`: run inline source.
    Command { code: OsString, argv: Vec<OsString> },
    /// `-m <module>`: run a module as `__main__`.
    Module { name: OsString, argv: Vec<OsString> },
    /// `-`: read the program from standard input.
    Stdin { argv: Vec<OsString> },
    /// A script file, read before the interpreter starts.
    Source {
        name: OsString,
        content: String,
        argv: Vec<OsString>,
    },
    Repl,
}

impl InterpreterMode {
    /// Classifies the arguments that followed the archive on the command line.
    ///
    /// # Errors
    /// Returns [`BootstrapError::MissingOperand`] when `-c` or `-m` has no
    /// value, and [`BootstrapError::ScriptUnreadable`] when a script path
    /// cannot be read.
    pub fn from_args(args: &[OsString], archive: &str) -> Result<Self, BootstrapError> {
        let Some((first, rest)) = args.split_first() else {
            return Ok(Self::Repl);
        };
        match first.to_str() {
            Some("-c") => {
                let (code, rest) = rest
                    .split_first()
                    .ok_or(BootstrapError::MissingOperand { flag: "-c" })?;
                let mut argv = vec![OsString::from("-c")];
                argv.extend_from_slice(rest);
                Ok(Self::Command {
                    code: code.clone(),
                    argv,
                })
            }
            Some("-m") => {
                let name = rest
                    .first()
                    .ok_or(BootstrapError::MissingOperand { flag: "-m" })?;
                Ok(Self::Module {
                    name: name.clone(),
                    argv: rest.to_vec(),
                })
            }
            Some("-") => Ok(Self::Stdin {
                argv: args.to_vec(),
            }),
            _ => {
                let content = fs::read_to_string(Path::new(first)).map_err(|source| {
                    BootstrapError::ScriptUnreadable {
                        path: first.to_string_lossy().into_owned(),
                        archive: archive.to_string(),
                        source,
                    }
                })?;
                Ok(Self::Source {
                    name: first.clone(),
                    content,
                    argv: args.to_vec(),
                })
            }
        }
    }

    /// Name the executed code is compiled under, used in tracebacks.
    #[must_use]
    pub fn display_name(&self) -> Cow<'_, str> {
        match self {
            Self::Command { .. } => Cow::Borrowed("-c <cmd>"),
            Self::Module { name, .. } | Self::Source { name, .. } => name.to_string_lossy(),
            Self::Stdin { .. } => Cow::Borrowed("-"),
            Self::Repl => Cow::Borrowed("<console>"),
        }
    }
}
