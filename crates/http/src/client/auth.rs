//! Authentication API client methods

use super::{AuthClient, ClientError};
use crate::types::TokenResponse;
use async_trait::async_trait;
use reqwest::Method;
use tessera_core::{AuthBackend, BackendError, Credentials, Token};

impl AuthClient {
    /// Exchange credentials for a token
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, ClientError> {
        let req = self
            .request(Method::POST, &self.config.login_path)
            .json(credentials);
        self.execute(req).await
    }

    /// Trade the renewal cookie for a fresh token
    pub async fn refresh(&self) -> Result<TokenResponse, ClientError> {
        let req = self.request(Method::POST, &self.config.refresh_path);
        self.execute(req).await
    }

    /// Revoke the renewal cookie
    pub async fn logout(&self) -> Result<(), ClientError> {
        let req = self.request(Method::POST, &self.config.logout_path);
        self.execute_empty(req).await
    }

    /// Create an account
    pub async fn create_account(&self, credentials: &Credentials) -> Result<(), ClientError> {
        let req = self
            .request(Method::POST, &self.config.register_path)
            .json(credentials);
        self.execute_empty(req).await
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl AuthBackend for AuthClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Token, BackendError> {
        let response = self.login(credentials).await?;
        Ok(response.token)
    }

    async fn renew(&self) -> Result<Token, BackendError> {
        let response = self.refresh().await?;
        Ok(response.token)
    }

    async fn revoke(&self) -> Result<(), BackendError> {
        Ok(self.logout().await?)
    }

    async fn register(&self, credentials: &Credentials) -> Result<(), BackendError> {
        Ok(self.create_account(credentials).await?)
    }
}
