//! Logging configuration and initialization for Gator.
//!
//! Logs are written to stderr so that command output on stdout stays clean.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{GatorError, Result};

/// Level named in the config. Unknown names mean `info`.
fn configured_level(level: &str) -> Level {
    let level = level.trim();
    if level.eq_ignore_ascii_case("warning") {
        return Level::WARN;
    }
    level.parse().unwrap_or(Level::INFO)
}

/// `RUST_LOG` directives plus the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(configured_level(level).into())
}

/// Initialize logging from the `[logging]` config section.
///
/// Without a `file` this is [`init_console_only`]. With one, every event
/// goes to stderr and is appended to the file, whose directory is created
/// if needed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let Some(file) = config.file.as_deref().filter(|f| !f.is_empty()) else {
        init_console_only(&config.level);
        return Ok(());
    };

    if let Some(parent) = Path::new(file).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let log_file = Arc::new(OpenOptions::new().create(true).append(true).open(file)?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr.and(log_file))
                .with_ansi(false)
                .with_target(true),
        )
        .with(env_filter(&config.level))
        .try_init()
        .map_err(|e| GatorError::Config(format!("failed to install logger: {e}")))
}

/// Initialize stderr-only logging.
///
/// Also the fallback when the log file cannot be opened. A no-op once a
/// subscriber is installed.
pub fn init_console_only(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(env_filter(level))
        .try_init();
}
