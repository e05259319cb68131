//! Tracing subscriber setup

use crate::config::{LogConfig, LogFormat};
use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
///
/// # Errors
///
/// Returns an error if the filter is malformed or a subscriber is already set.
pub fn init(cfg: &LogConfig) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(format!(
            "{},sqlx=warn,hyper=warn,reqwest=warn",
            cfg.level
        ))?,
    };
    let registry = tracing_subscriber::registry().with(filter);
    match cfg.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()?,
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init()?,
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %cfg.level,
        "logging initialized"
    );
    Ok(())
}
