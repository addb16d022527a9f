//! Configuration for the session core
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `TESSERA_`-prefixed environment variables with `__` between path segments
//! (`TESSERA_SESSION__RENEW_MARGIN_SECS=120`). Each component reads its own
//! top-level section of the same sources.

use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for every setting
pub const ENV_PREFIX: &str = "TESSERA";

/// Session lifecycle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Renew this many seconds before the token expires
    #[serde(default = "default_renew_margin_secs")]
    pub renew_margin_secs: u64,

    /// Name of the broadcast channel shared by sibling contexts
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Key written by the shared-storage fallback transport
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

fn default_renew_margin_secs() -> u64 {
    60
}

fn default_channel_name() -> String {
    crate::bus::DEFAULT_CHANNEL.to_string()
}

fn default_storage_key() -> String {
    crate::bus::DEFAULT_CHANNEL.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            renew_margin_secs: default_renew_margin_secs(),
            channel_name: default_channel_name(),
            storage_key: default_storage_key(),
        }
    }
}

impl SessionConfig {
    /// Section name in configuration sources
    pub const SECTION: &'static str = "session";

    /// Renewal margin as a duration
    #[must_use]
    pub const fn renew_margin(&self) -> Duration {
        Duration::from_secs(self.renew_margin_secs)
    }

    /// Load from the environment only
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = load_section(Self::SECTION, None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, with environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_section(Self::SECTION, Some(path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_name.trim().is_empty() {
            return Err(ConfigError::Message(
                "session.channel_name must not be empty".to_string(),
            ));
        }
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Message(
                "session.storage_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive, e.g. `info` or `tessera_core=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Section name in configuration sources
    pub const SECTION: &'static str = "log";

    /// Load from the environment only
    pub fn load() -> Result<Self, ConfigError> {
        load_section(Self::SECTION, None)
    }
}

/// Deserialize the `section` table from defaults, an optional file and the
/// environment
///
/// A `path` that is given must exist.
pub fn load_section<T>(section: &str, path: Option<&Path>) -> Result<T, ConfigError>
where
    T: Serialize + DeserializeOwned + Default,
{
    let defaults = HashMap::from([(section.to_string(), T::default())]);
    let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);

    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.get::<T>(section)
}
