/// User-facing reasons an archive build is refused or fails.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid entry point: {value}")]
    InvalidEntryPoint { value: String },
    #[error(
        "Shebang is too long ({len} bytes), it would exceed BINPRM_BUF_SIZE! Consider /usr/bin/env"
    )]
    ShebangTooLong { len: usize },
    #[error("You supplied a disallowed pip argument! '{arg}'\n\n{reason}")]
    DisallowedPipArg { arg: String, reason: &'static str },
    #[error("You must supply PIP ARGS or --site-packages!")]
    NoSources,
    #[error("No entry point '{name}' found in the console_scripts!")]
    NoEntryPoint { name: String },
    #[error("Pip install failed! (exit code {code})")]
    PipInstallFailed { code: i32 },
    #[error("preamble '{path}' is not a file")]
    MissingPreamble { path: std::path::PathBuf },
}
