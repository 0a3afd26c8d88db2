//! Log setup for stashd.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Map a configured level name onto a tracing level, defaulting to INFO
/// for anything unrecognized.
fn level_of(name: &str) -> Level {
    name.parse().unwrap_or(Level::INFO)
}

/// Initialize logging to stdout and the configured log file.
///
/// The log file's parent directory is created if missing. `RUST_LOG`
/// directives still apply on top of the configured level.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(level_of(&config.level).into());

    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = Arc::new(File::create(&config.file)?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout.and(file))
                .with_ansi(false)
                .with_target(true),
        )
        .with(filter)
        .init();

    Ok(())
}

/// Initialize stdout-only logging, for when the log file cannot be set
/// up.
pub fn init_console_only(level: &str) {
    let filter = EnvFilter::from_default_env().add_directive(level_of(level).into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(filter)
        .init();
}
