//! Backend endpoint configuration
//!
//! Read from the `[backend]` section of the shared configuration sources,
//! e.g. `TESSERA_BACKEND__BASE_URL=https://api.example.com`.

use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tessera_core::config::load_section;

/// Where the authentication endpoints live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Origin and base path of the API, without a trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    #[serde(default = "default_logout_path")]
    pub logout_path: String,

    #[serde(default = "default_register_path")]
    pub register_path: String,

    /// Per-request timeout in seconds (ignored in the browser)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_login_path() -> String {
    "/user/login".to_string()
}

fn default_refresh_path() -> String {
    "/user/refresh".to_string()
}

fn default_logout_path() -> String {
    "/user/logout".to_string()
}

fn default_register_path() -> String {
    "/user/register".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            login_path: default_login_path(),
            refresh_path: default_refresh_path(),
            logout_path: default_logout_path(),
            register_path: default_register_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// Section name in configuration sources
    pub const SECTION: &'static str = "backend";

    /// Defaults pointed at `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
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

    /// Check the base URL parses and every path is absolute
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.base_url).map_err(|err| {
            ConfigError::Message(format!("backend.base_url {:?} is invalid: {err}", self.base_url))
        })?;

        for (name, path) in [
            ("login_path", &self.login_path),
            ("refresh_path", &self.refresh_path),
            ("logout_path", &self.logout_path),
            ("register_path", &self.register_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Message(format!(
                    "backend.{name} must start with '/', got {path:?}"
                )));
            }
        }
        Ok(())
    }
}
