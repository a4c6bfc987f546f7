use std::path::PathBuf;

use clap::{ArgAction, Parser};
use shiv_core::BuildRequest;

pub const SHIV_AFTER_HELP: &str = concat!(
    "Examples:\n",
    "  shiv -c flake8 -o flake8.pyz flake8\n",
    "  shiv -e hello:main -o hello.pyz --site-packages ./build/site-packages\n",
    "  shiv -o tools.pyz --reproducible --compile-pyc -- -r requirements.txt\n",
);

/// Build a self-contained executable Python application archive.
///
/// Unrecognized arguments are passed to `pip install` and installed into the
/// archive. The archive runs through `shiv-boot`, which unpacks it into a
/// cache (~/.shiv by default) on first launch.
#[derive(Parser, Debug)]
#[command(name = "shiv", author, version, after_help = SHIV_AFTER_HELP)]
#[allow(clippy::struct_excessive_bools)]
pub struct ShivCli {
    #[arg(short, long, help = "The entry point to invoke (takes precedence over --console-script)")]
    pub entry_point: Option<String>,
    #[arg(short, long, help = "The console_script to invoke")]
    pub console_script: Option<String>,
    #[arg(short, long, required = true, help = "The path to the output file for shiv to create")]
    pub output_file: PathBuf,
    #[arg(
        short,
        long,
        help = "The python interpreter to set as the shebang, such as '/usr/bin/env python3'"
    )]
    pub python: Option<String>,
    #[arg(
        long,
        value_name = "DIR",
        action = ArgAction::Append,
        help = "The path to an existing site-packages directory to copy into the archive (repeatable)"
    )]
    pub site_packages: Vec<PathBuf>,
    #[arg(long, help = "Use a custom build id instead of the content hash")]
    pub build_id: Option<String>,
    #[arg(long, overrides_with = "uncompressed", help = "Compress the archive (default)")]
    pub compressed: bool,
    #[arg(long, overrides_with = "compressed", help = "Store archive members without compression")]
    pub uncompressed: bool,
    #[arg(long, help = "Compile pyc files at first launch")]
    pub compile_pyc: bool,
    #[arg(
        short = 'E',
        long,
        help = "Add the archive's site-packages to PYTHONPATH for subprocesses"
    )]
    pub extend_pythonpath: bool,
    #[arg(
        long,
        help = "Fix every archive timestamp (uses SOURCE_DATE_EPOCH or 1980-01-01)"
    )]
    pub reproducible: bool,
    #[arg(
        long,
        help = "Refuse to launch if any extracted source file was modified"
    )]
    pub no_modify: bool,
    #[arg(long, help = "A script to run before the entry point")]
    pub preamble: Option<PathBuf>,
    #[arg(
        long,
        help = "Cache root for extracted archives (default ~/.shiv); '$NAME' reads it from NAME"
    )]
    pub root: Option<String>,
    #[arg(long, env = "SOURCE_DATE_EPOCH", hide_env_values = true, hide = true)]
    pub source_date_epoch: Option<i64>,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v")]
    pub trace: bool,
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "PIP_ARGS",
        help = "Arguments passed to pip install"
    )]
    pub pip_args: Vec<String>,
}

impl ShivCli {
    #[must_use]
    pub fn to_request(&self) -> BuildRequest {
        let mut request = BuildRequest::new(&self.output_file);
        request.entry_point.clone_from(&self.entry_point);
        request.console_script.clone_from(&self.console_script);
        request.python.clone_from(&self.python);
        request.site_packages.clone_from(&self.site_packages);
        request.build_id.clone_from(&self.build_id);
        request.compressed = !self.uncompressed;
        request.compile_pyc = self.compile_pyc;
        request.extend_pythonpath = self.extend_pythonpath;
        request.reproducible = self.reproducible;
        request.no_modify = self.no_modify;
        request.preamble.clone_from(&self.preamble);
        request.root.clone_from(&self.root);
        request.source_date_epoch = self.source_date_epoch;
        request.pip_args.clone_from(&self.pip_args);
        request
    }
}

/// Print the Environment Record of a shiv archive.
#[derive(Parser, Debug)]
#[command(name = "shiv-info", author, version)]
pub struct ShivInfoCli {
    #[arg(short, long, help = "Output as pretty-printed JSON")]
    pub json: bool,
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,
    #[arg(value_name = "PYZ")]
    pub pyz: PathBuf,
}
