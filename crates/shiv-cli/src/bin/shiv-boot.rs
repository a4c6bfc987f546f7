//! Interpreter for shiv archives: `shiv-boot <archive> [args...]`.
//!
//! Archives name this binary in their shebang, so the kernel runs
//! `./app.pyz a b` as `shiv-boot ./app.pyz a b`.

use std::env;
use std::path::PathBuf;

use atty::Stream;
use color_eyre::Result;
use shiv_bootstrap::{bootstrap, BootstrapRequest};
use shiv_cli::init_tracing;
use shiv_cli::style::Style;

const LOG_VAR: &str = "SHIV_LOG";
const USAGE: &str = "usage: shiv-boot <archive> [args...]";

fn main() -> Result<()> {
    color_eyre::install()?;
    let filter = env::var(LOG_VAR).unwrap_or_else(|_| "warn".to_string());
    init_tracing(&filter);

    let mut args = env::args_os().skip(1);
    let Some(archive) = args.next().map(PathBuf::from) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let passthrough = args.collect();

    let request = BootstrapRequest::new(archive, passthrough);
    match bootstrap(&request) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let style = Style::new(false, atty::is(Stream::Stderr));
            eprintln!("{}", style.error(&format!("shiv: {err:#}")));
            std::process::exit(1);
        }
    }
}
