pub mod cli;
pub mod style;

/// Installs a stderr subscriber; `filter` is an `EnvFilter` directive string.
pub fn init_tracing(filter: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Filter for the `shiv` build command from `-v`/`--trace`.
#[must_use]
pub fn build_filter(trace: bool, verbose: u8) -> String {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    format!("shiv={level},shiv_core={level},shiv_bootstrap={level}")
}
