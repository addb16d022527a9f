//! Error types for the session core
//!
//! Each boundary has its own type. Decode failures never appear here: a token
//! that cannot be read simply has no claims (see [`crate::token`]).

use thiserror::Error;

/// Errors raised by the network collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend answered with a non-success status
    #[error("Backend rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Status code of a rejected request
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Transport(_) | Self::InvalidResponse(_) => None,
        }
    }
}

/// Errors surfaced by consumer-facing session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Credentials were rejected or the login call failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(#[source] BackendError),

    /// Registration was rejected or failed
    #[error("Registration failed: {0}")]
    RegistrationFailed(#[source] BackendError),

    /// The session context has been shut down
    #[error("Session has been shut down")]
    ShutDown,
}

/// Outcome of a failed renewal, shared by every queued waiter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalError {
    /// The renewal endpoint rejected or failed the call
    #[error("Token renewal failed: {0}")]
    Backend(#[source] BackendError),

    /// The renewal that this waiter joined was dropped before it settled
    #[error("Token renewal was abandoned before completing")]
    Abandoned,

    /// The session was ended while the renewal was in flight; its token was discarded
    #[error("Session ended while the token was being renewed")]
    Superseded,

    /// The session context has been shut down
    #[error("Session has been shut down")]
    ShutDown,
}

/// Cross-tab transport failures
///
/// These never escape the bus; they are logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The transport is not available in this environment
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// Publishing a message failed
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Registering a subscriber failed
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// A message could not be encoded or decoded
    #[error("Malformed message: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_status() {
        let rejected = BackendError::Rejected {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert_eq!(rejected.status(), Some(401));
        assert_eq!(BackendError::Transport("reset".into()).status(), None);
    }

    #[test]
    fn test_error_messages() {
        let err = SessionError::AuthenticationFailed(BackendError::Rejected {
            status: 401,
            message: "bad credentials".into(),
        });
        assert_eq!(
            err.to_string(),
            "Authentication failed: Backend rejected the request with status 401: bad credentials"
        );
        assert_eq!(
            RenewalError::Abandoned.to_string(),
            "Token renewal was abandoned before completing"
        );
    }
}
