//! Per-context session store
//!
//! The store is the single source of truth for the current bearer token. It
//! is backed by a watch channel so every read observes the latest write and
//! UI consumers can await changes without polling.

use crate::token::Token;
use tokio::sync::watch;

/// Holds the current token of one execution context
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<Option<Token>>,
}

impl SessionStore {
    /// Create an empty (unauthenticated) store
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Current token, if authenticated
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.tx.borrow().clone()
    }

    /// Whether a token is present
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Subscribe to token changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Token>> {
        self.tx.subscribe()
    }

    /// Replace the token, returning whether the value changed
    ///
    /// Subscribers are only notified on an actual change.
    pub(crate) fn set_token(&self, token: Option<Token>) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == token {
                false
            } else {
                *current = token;
                true
            }
        })
    }

    /// Drop the token, returning whether one was present
    pub(crate) fn clear(&self) -> bool {
        self.set_token(None)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
