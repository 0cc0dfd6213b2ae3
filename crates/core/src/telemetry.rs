//! Logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::{config::LoggingConfig, Error, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Fails if a global
/// subscriber is already installed.
pub fn configure_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))
        .map_err(|e| Error::internal(format!("Invalid log filter '{}': {}", config.level, e)))?;

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {}", e)))?;

    tracing::debug!(level = %config.level, json = config.json, "Tracing configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_an_error() {
        let config = LoggingConfig::default();
        // Another test binary may have installed one already; only the
        // second call in this process is guaranteed to fail.
        let _ = configure_tracing(&config);
        assert!(configure_tracing(&config).is_err());
    }
}
