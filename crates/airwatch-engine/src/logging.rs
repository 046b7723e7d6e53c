//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise `logging.level` from the config
//! file is used as the filter directive.

use airwatch_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Filter from `RUST_LOG`, falling back to `default_level`.
pub fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber, plain or JSON per `config.json`.
pub fn init(config: &LoggingConfig) -> Result<(), EngineError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(&config.level))
        .with_target(true);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_level_is_the_fallback() {
        // RUST_LOG is not set under `cargo test` unless the caller sets it.
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(filter("debug").to_string(), "debug");
        }
    }
}
