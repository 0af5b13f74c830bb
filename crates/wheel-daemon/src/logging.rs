//! Tracing subscriber setup

use crate::settings::LoggingConfig;
use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_level(&config.level)?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
    .context("failed to set tracing subscriber")
}

fn parse_level(level: &str) -> Result<Level> {
    level
        .trim()
        .parse::<Level>()
        .with_context(|| format!("unknown log level: {}", level))
}
