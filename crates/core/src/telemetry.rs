//! Log subscriber setup for native hosts
//!
//! Browser builds install their own subscriber (see the `tessera-web` crate).

use crate::config::LogConfig;
use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the filter: `RUST_LOG` wins over the configured level
fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber
///
/// Fails when a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = env_filter(config);

    if config.json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .with(filter)
            .try_init()?;
    }

    Ok(())
}

/// Install the subscriber using `TESSERA_LOG__*` settings
pub fn init_default() -> Result<()> {
    let config = LogConfig::load()?;
    init_tracing(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back() {
        let config = LogConfig {
            level: "not a [valid directive".to_string(),
            json: false,
        };
        // Only checks that building the filter does not panic
        let _ = env_filter(&config);
    }
}
