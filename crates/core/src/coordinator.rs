//! Renewal coordination: request decoration, 401 handling and single-flight
//!
//! The coordinator owns the in-flight flag and waiter queue of one execution
//! context. Any number of concurrent renewal requests collapse into a single
//! backend call; everyone who asked while it was in flight receives the same
//! outcome once it settles.

use crate::error::{BackendError, RenewalError};
use crate::rt::{MaybeSend, MaybeSync, lock};
use crate::token::Token;
use async_trait::async_trait;
use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use http::StatusCode;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Whether an outbound request has already been replayed after a renewal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Attempt {
    /// First transmission
    #[default]
    Initial,
    /// Replay after a successful renewal; never renewed again
    Retried,
}

/// What the transport should do with an inbound response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseVerdict {
    /// Not an authorization failure; hand it to the caller unchanged
    Accept,
    /// Authorization failure on a first attempt: renew, then replay once
    RenewAndRetry,
    /// Authorization failure on a replay: final failure, no further renewal
    Reject,
}

/// Build the `Authorization` header value for a token
///
/// Returns `None` for tokens that are not valid header values.
#[must_use]
pub fn bearer_header(token: &Token) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str())).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Attach the bearer token to an outbound request, if there is one
///
/// Without a token the headers are left untouched.
pub fn decorate(headers: &mut HeaderMap, token: Option<&Token>) {
    let Some(token) = token else {
        return;
    };
    match bearer_header(token) {
        Some(value) => {
            headers.insert(AUTHORIZATION, value);
        }
        None => tracing::warn!("Token contains characters not allowed in a header, not attached"),
    }
}

/// Decide how to handle a response to a request sent on `attempt`
#[must_use]
pub fn inspect_response(status: StatusCode, attempt: Attempt) -> ResponseVerdict {
    match (status, attempt) {
        (StatusCode::UNAUTHORIZED, Attempt::Initial) => ResponseVerdict::RenewAndRetry,
        (StatusCode::UNAUTHORIZED, Attempt::Retried) => ResponseVerdict::Reject,
        _ => ResponseVerdict::Accept,
    }
}

/// Side effects the coordinator performs around a renewal
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
///
/// A renewal starts from the session epoch returned by [`RenewalHooks::epoch`]
/// and hands it back to `commit` and `discard`, which must do nothing once
/// the session has been cleared since.
pub trait RenewalHooks: MaybeSend + MaybeSync {
    /// Current session epoch
    fn epoch(&self) -> u64;

    /// Perform the renewal network call
    async fn fetch(&self) -> Result<Token, BackendError>;

    /// Store a freshly renewed token; false when `epoch` is stale
    fn commit(&self, token: &Token, epoch: u64) -> bool;

    /// Drop local session state after a failed renewal
    ///
    /// Returns whether a live session was dropped.
    fn discard(&self, epoch: u64) -> bool;

    /// Server-side revocation following a successful `discard`
    async fn revoke(&self);
}

type Waiter = oneshot::Sender<Result<Token, RenewalError>>;

#[derive(Default)]
struct Flight {
    in_flight: bool,
    waiters: Vec<Waiter>,
}

/// Single-flight renewal gate for one execution context
#[derive(Default)]
pub struct RenewalCoordinator {
    flight: Mutex<Flight>,
    calls: AtomicU64,
}

impl RenewalCoordinator {
    /// Create an idle coordinator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a renewal call is currently in flight
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        lock(&self.flight).in_flight
    }

    /// Number of callers waiting on the in-flight renewal
    #[must_use]
    pub fn waiting(&self) -> usize {
        lock(&self.flight).waiters.len()
    }

    /// Number of renewal network calls issued so far
    #[must_use]
    pub fn renewal_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Renew the token, joining the in-flight renewal if there is one
    ///
    /// On success the new token has been committed before any waiter resumes.
    /// On failure the session is discarded, every waiter is rejected, and only
    /// then is the session revoked server-side. A token that arrives after the
    /// session was cleared is dropped and reported as
    /// [`RenewalError::Superseded`].
    pub async fn renew<H>(&self, hooks: &H) -> Result<Token, RenewalError>
    where
        H: RenewalHooks + ?Sized,
    {
        let waiter = {
            let mut flight = lock(&self.flight);
            if flight.in_flight {
                let (tx, rx) = oneshot::channel();
                flight.waiters.push(tx);
                Some(rx)
            } else {
                flight.in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            tracing::debug!("Renewal already in flight, queued behind it");
            return rx.await.unwrap_or(Err(RenewalError::Abandoned));
        }

        let guard = FlightGuard { coordinator: self };
        self.calls.fetch_add(1, Ordering::Relaxed);
        let epoch = hooks.epoch();

        let outcome = match hooks.fetch().await {
            Ok(token) if hooks.commit(&token, epoch) => Ok(token),
            Ok(_) => {
                tracing::debug!("Session ended during renewal, discarding the new token");
                Err(RenewalError::Superseded)
            }
            Err(err) => Err(RenewalError::Backend(err)),
        };

        // Local state is gone before any waiter resumes
        let revoke = match &outcome {
            Err(err @ RenewalError::Backend(_)) => {
                tracing::warn!(error = %err, "Token renewal failed, ending session");
                hooks.discard(epoch)
            }
            _ => false,
        };

        let waiters = guard.finish();
        tracing::debug!(
            waiters = waiters.len(),
            success = outcome.is_ok(),
            "Renewal settled"
        );
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }

        if revoke {
            hooks.revoke().await;
        }

        outcome
    }

    fn drain(&self) -> Vec<Waiter> {
        let mut flight = lock(&self.flight);
        flight.in_flight = false;
        std::mem::take(&mut flight.waiters)
    }
}

impl std::fmt::Debug for RenewalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalCoordinator")
            .field("in_flight", &self.is_in_flight())
            .field("waiting", &self.waiting())
            .field("renewal_calls", &self.renewal_calls())
            .finish()
    }
}

/// Clears the in-flight flag even when the leading renewal is dropped
///
/// Waiters of an abandoned renewal see their sender dropped and resolve to
/// [`RenewalError::Abandoned`].
struct FlightGuard<'a> {
    coordinator: &'a RenewalCoordinator,
}

impl FlightGuard<'_> {
    fn finish(self) -> Vec<Waiter> {
        let waiters = self.coordinator.drain();
        std::mem::forget(self);
        waiters
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let abandoned = self.coordinator.drain();
        if !abandoned.is_empty() {
            tracing::warn!(waiters = abandoned.len(), "Renewal dropped before settling");
        }
    }
}
