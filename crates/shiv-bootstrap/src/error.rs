use std::path::PathBuf;

/// Fatal conditions raised while bootstrapping an archive.
///
/// Every variant aborts the launch before anything is dispatched; the launcher
/// prints the message and exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("'{path}' is not a shiv archive: {reason}")]
    NotAnArchive { path: PathBuf, reason: String },
    #[error("archive '{path}' has no build id in environment.json")]
    MissingBuildId { path: PathBuf },
    #[error("invalid entry point '{value}': expected 'module:function' or 'module.function'")]
    InvalidEntryPoint { value: String },
    #[error("console script '{name}' not found in {site_packages}")]
    ScriptNotFound { name: String, site_packages: PathBuf },
    #[error("preamble '{path}' does not exist")]
    PreambleNotFound { path: PathBuf },
    #[error(
        "A Python source file has been modified! File: {path}. \
         Try again with SHIV_FORCE_EXTRACT=1 to overwrite the modified source file(s)."
    )]
    SourceModified { path: PathBuf },
    #[error("Could not open '{path}' in the environment [{archive}]: {source}")]
    ScriptUnreadable {
        path: String,
        archive: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Argument expected for the {flag} option")]
    MissingOperand { flag: &'static str },
    #[error("timed out after {waited_secs}s waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited_secs: u64 },
    #[error("no python interpreter found; set SHIV_PYTHON")]
    NoInterpreter,
}
