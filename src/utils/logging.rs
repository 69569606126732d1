//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured level when it is set and parses.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{constants, Result, ServerError};

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ServerError::Config(format!("{}: {e}", constants::ERR_SUBSCRIBER_INSTALLED)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        // Another test in this binary may have installed one first
        let _ = init(&config);
        assert!(init(&config).is_err());
    }
}
