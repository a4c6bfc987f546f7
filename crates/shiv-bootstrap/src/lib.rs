//! Runtime side of shiv archives.
//!
//! An archive is a zip file with a shebang prefix. Launching one extracts its
//! `site-packages` payload into a per-build cache directory (once, under a
//! cross-process lock), splices that directory into the interpreter's module
//! search path, and hands control to the configured entry point, console
//! script, or an interpreter-compatible fallback.

pub mod archive;
pub mod bootstrap;
pub mod console_scripts;
pub mod dispatch;
pub mod driver;
pub mod entry_point;
pub mod environment;
pub mod error;
pub mod extract;
mod fs;
pub mod interpreter;
pub mod lock;
pub mod process;
pub mod python;
pub mod site;
pub mod verify;

pub use archive::{cache_root, Archive};
pub use bootstrap::{bootstrap, BootstrapRequest};
pub use dispatch::DispatchTarget;
pub use entry_point::EntryPoint;
pub use environment::{EnvOverrides, Environment};
pub use error::BootstrapError;
pub use extract::{extract_site_packages, ExtractOptions, ExtractOutcome, PycCompiler, PythonCompiler};
pub use interpreter::InterpreterMode;
pub use lock::FileLock;

/// Version recorded in every archive this toolchain builds.
pub const SHIV_VERSION: &str = env!("CARGO_PKG_VERSION");
