//! Tessera HTTP client

pub mod auth;
pub mod error;
pub mod session;

pub use error::ClientError;
pub use session::SessionClient;

use crate::config::BackendConfig;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Client for the authentication endpoints
///
/// The renewal credential is an HTTP-only cookie: native builds keep it in
/// the client's cookie jar, browser builds send requests with credentials
/// included and let the browser manage it.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    config: BackendConfig,
}

impl AuthClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a client from loaded configuration
    pub fn from_config(config: BackendConfig) -> Result<Self, ClientError> {
        Self::builder().config(config).build()
    }

    /// Create a new client builder
    pub fn builder() -> AuthClientBuilder {
        AuthClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Endpoint configuration in use
    pub const fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Underlying HTTP client, sharing this client's cookie jar
    pub const fn http(&self) -> &Client {
        &self.client
    }

    /// Create a request builder for `path`
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let request = self.client.request(method, url);

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request
    }

    /// Execute a request and decode a JSON body
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = error_for_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Execute a request whose response body is irrelevant
    pub async fn execute_empty(&self, request: reqwest::RequestBuilder) -> Result<(), ClientError> {
        error_for_status(request.send().await?).await?;
        Ok(())
    }
}

/// Turn a non-success response into a [`ClientError`] carrying its body
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let message = response.text().await.unwrap_or_else(|_| status.to_string());
        Err(ClientError::from_status(status, message))
    }
}

/// Builder for AuthClient
#[derive(Default)]
pub struct AuthClientBuilder {
    config: Option<BackendConfig>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl AuthClientBuilder {
    /// Start from a full endpoint configuration
    pub fn config(mut self, config: BackendConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<AuthClient, ClientError> {
        let mut config = match (self.config, self.base_url) {
            (Some(config), None) => config,
            (config, Some(base_url)) => BackendConfig {
                base_url,
                ..config.unwrap_or_default()
            },
            (None, None) => {
                return Err(ClientError::Configuration("base_url is required".into()));
            }
        };
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout.as_secs();
        }
        config
            .validate()
            .map_err(|err| ClientError::Configuration(err.to_string()))?;

        // Ensure base_url ends without a trailing slash
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new();

        #[cfg(not(target_arch = "wasm32"))]
        {
            client_builder = client_builder
                .timeout(config.timeout())
                .cookie_store(true);
        }

        if let Some(user_agent) = self.user_agent {
            client_builder = client_builder.user_agent(user_agent);
        } else {
            client_builder = client_builder.user_agent(concat!("tessera/", env!("CARGO_PKG_VERSION")));
        }

        let client = client_builder.build()?;

        Ok(AuthClient { client, config })
    }
}
