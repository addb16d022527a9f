//! Network collaborator interface
//!
//! The backend issues bearer tokens. The long-lived renewal credential never
//! passes through this crate: implementations carry it out-of-band (an
//! HTTP-only cookie in practice), so `renew` and `revoke` take no arguments.

use crate::error::BackendError;
use crate::rt::{MaybeSend, MaybeSync};
use crate::token::Token;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Login or registration credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account identifier (an email address for the reference backend)
    #[serde(rename = "email")]
    pub identifier: String,
    /// Account secret
    pub password: String,
}

impl Credentials {
    /// Build credentials from an identifier and a secret
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Backend calls the session core depends on
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait AuthBackend: MaybeSend + MaybeSync {
    /// Exchange credentials for a bearer token
    async fn authenticate(&self, credentials: &Credentials) -> Result<Token, BackendError>;

    /// Obtain a fresh bearer token using the out-of-band renewal credential
    async fn renew(&self) -> Result<Token, BackendError>;

    /// Revoke the renewal credential server-side
    async fn revoke(&self) -> Result<(), BackendError>;

    /// Create an account
    async fn register(&self, credentials: &Credentials) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_wire_format() {
        let credentials = Credentials::new("a@example.com", "hunter2");
        let json = serde_json::to_value(&credentials).unwrap();
        assert_eq!(json["email"], "a@example.com");
        assert_eq!(json["password"], "hunter2");
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials = Credentials::new("a@example.com", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("a@example.com"));
        assert!(!debug.contains("hunter2"));
    }
}
