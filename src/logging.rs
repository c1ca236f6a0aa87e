use anyhow::{Context, Result};
use std::{path::Path, sync::Mutex};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log level for the `chocomaint` target, from the `-v`/`-q` flags.
pub fn level(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

/// Logs to stderr and appends to `log_path`.
///
/// When the log file cannot be opened the console layer is still installed
/// and the error is returned so the caller can report it.
pub fn init(log_path: &Path, level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chocomaint={level},warn")));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let (file_layer, opened) = match open_append(log_path) {
        Ok(file) => {
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_target(false)
                .with_ansi(false);
            (Some(layer), Ok(()))
        }
        Err(e) => (None, Err(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    opened
}

fn open_append(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create log directory {}", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Could not open log file {}", path.display()))
}
