//! Tracing/logging initialization.
//!
//! Filter directives come from `RUST_LOG` when it is set, otherwise from the
//! configured level. Output is JSON lines or human-readable text.

use cashguard_core::{LogFormat, LoggingConfig};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid log filter '{directive}': {message}")]
    Filter { directive: String, message: String },
}

fn filter(config: &LoggingConfig) -> Result<EnvFilter, InitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| InitError::Filter {
        directive: config.level.clone(),
        message: e.to_string(),
    })
}

/// Install the global subscriber.
///
/// Safe to call multiple times (subsequent calls are no-ops). Only a bad
/// filter directive is an error.
pub fn init(config: &LoggingConfig) -> Result<(), InitError> {
    let filter = filter(config)?;
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };
    if installed.is_err() {
        ::tracing::debug!("global subscriber already installed");
    }
    Ok(())
}
