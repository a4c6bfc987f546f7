use atty::Stream;
use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::Value;
use shiv_cli::cli::ShivInfoCli;
use shiv_cli::style::Style;

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "None".to_string(),
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        other => other.to_string(),
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = ShivInfoCli::parse();
    let info = match shiv_core::read_archive_info(&cli.pyz) {
        Ok(info) => info,
        Err(err) => {
            let style = Style::new(cli.no_color, atty::is(Stream::Stderr));
            eprintln!("{}", style.error(&format!("{err:#}")));
            std::process::exit(1);
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));
    let fields = info
        .as_object()
        .ok_or_else(|| eyre!("environment record is not an object"))?;
    for (key, value) in fields {
        println!("{}: {}", style.key(key), style.value(&render_value(value)));
    }
    Ok(())
}
