//! Stderr diagnostics for the CLI.
//!
//! `--log-level` applies to pdmlink's own crates (targets starting with
//! `pdmlink`). Everything else stays at `warn` or quieter, so `debug` shows
//! frame traffic and retries without noise from dependencies.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Prefix shared by every pdmlink crate's tracing target.
const TARGET_PREFIX: &str = "pdmlink";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// One compact line per event.
    Text,
    /// One JSON object per event.
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    /// Connections, negotiated versions, laser deactivation.
    Info,
    /// Every frame sent and received.
    Debug,
    /// Dropped frames and read timeouts.
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Per-target filter: `level` for pdmlink, at most `warn` for the rest.
fn targets(level: LogLevel) -> Targets {
    let level = LevelFilter::from(level);
    Targets::new()
        .with_target(TARGET_PREFIX, level)
        .with_default(level.min(LevelFilter::WARN))
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = targets(level);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false);

    let installed = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json().with_current_span(false))
            .try_init(),
    };
    if let Err(err) = installed {
        eprintln!("warning: logging unavailable: {err}");
    }
}
