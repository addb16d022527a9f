//! HTTP transport for the Tessera session core
//!
//! [`client::AuthClient`] talks to the authentication endpoints and is the
//! [`tessera_core::AuthBackend`] a session renews through.
//! [`client::SessionClient`] sends application requests on behalf of a
//! session, attaching its token and recovering from expired ones.

pub mod client;
pub mod config;
pub mod types;

pub use client::{AuthClient, ClientError, SessionClient};
pub use config::BackendConfig;
pub use types::TokenResponse;
