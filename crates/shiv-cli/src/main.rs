use atty::Stream;
use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use shiv_cli::cli::ShivCli;
use shiv_cli::style::Style;
use shiv_cli::{build_filter, init_tracing};
use shiv_core::BuildError;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = ShivCli::parse();
    init_tracing(&build_filter(cli.trace, cli.verbose));

    let style = Style::new(false, atty::is(Stream::Stderr));
    match shiv_core::build_archive(&cli.to_request()) {
        Ok(outcome) => {
            tracing::debug!(output = %outcome.output.display(), "done");
            Ok(())
        }
        Err(err) => {
            if let Some(build) = err.downcast_ref::<BuildError>() {
                eprintln!("{}", style.error(&build.to_string()));
                std::process::exit(1);
            }
            Err(eyre!("{err:?}"))
        }
    }
}
