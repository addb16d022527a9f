//! Test doubles and helpers shared by this crate's tests and downstream crates
//!
//! Enabled for unit tests and through the `tests` feature.

use crate::backend::{AuthBackend, Credentials};
use crate::clock::Clock;
use crate::error::BackendError;
use crate::rt::lock;
use crate::token::Token;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// Build an unsigned token carrying `payload` as its claims segment
#[must_use]
pub fn with_payload(payload: &Value) -> Token {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    Token::new(format!("{header}.{body}.signature"))
}

/// Token for `user-1` with the default role, expiring at `exp` epoch seconds
#[must_use]
pub fn token_expiring_at(exp: i64) -> Token {
    token_for("user-1", &["ROLE_USER"], exp)
}

/// Token for `subject` holding `roles`, expiring at `exp` epoch seconds
#[must_use]
pub fn token_for(subject: &str, roles: &[&str], exp: i64) -> Token {
    with_payload(&json!({ "sub": subject, "roles": roles, "exp": exp }))
}

/// Let spawned tasks on the current runtime run until they block
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Start at `now` epoch seconds
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Jump to `now`
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `secs`
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// In-memory [`AuthBackend`] with scripted answers and call counters
///
/// Renewals yield to the runtime before answering so concurrent callers get
/// a chance to queue behind an in-flight call.
#[derive(Debug)]
pub struct ScriptedBackend {
    login: Mutex<Result<Token, BackendError>>,
    renewal: Mutex<Result<Token, BackendError>>,
    revocation: Mutex<Result<(), BackendError>>,
    registration: Mutex<Result<(), BackendError>>,
    authenticate_calls: AtomicUsize,
    renew_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    register_calls: AtomicUsize,
    last_credentials: Mutex<Option<Credentials>>,
}

impl ScriptedBackend {
    /// Backend that accepts everything and issues `token`
    #[must_use]
    pub fn issuing(token: Token) -> Self {
        Self {
            login: Mutex::new(Ok(token.clone())),
            renewal: Mutex::new(Ok(token)),
            revocation: Mutex::new(Ok(())),
            registration: Mutex::new(Ok(())),
            authenticate_calls: AtomicUsize::new(0),
            renew_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            last_credentials: Mutex::new(None),
        }
    }

    /// Answer future logins with `outcome`
    #[must_use]
    pub fn with_login(self, outcome: Result<Token, BackendError>) -> Self {
        self.set_login(outcome);
        self
    }

    /// Answer future renewals with `outcome`
    #[must_use]
    pub fn with_renewal(self, outcome: Result<Token, BackendError>) -> Self {
        self.set_renewal(outcome);
        self
    }

    /// Answer future revocations with `outcome`
    #[must_use]
    pub fn with_revocation(self, outcome: Result<(), BackendError>) -> Self {
        *lock(&self.revocation) = outcome;
        self
    }

    /// Answer future registrations with `outcome`
    #[must_use]
    pub fn with_registration(self, outcome: Result<(), BackendError>) -> Self {
        *lock(&self.registration) = outcome;
        self
    }

    /// Replace the login answer
    pub fn set_login(&self, outcome: Result<Token, BackendError>) {
        *lock(&self.login) = outcome;
    }

    /// Replace the renewal answer
    pub fn set_renewal(&self, outcome: Result<Token, BackendError>) {
        *lock(&self.renewal) = outcome;
    }

    #[must_use]
    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn renew_calls(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    /// Credentials passed to the most recent login or registration
    #[must_use]
    pub fn last_credentials(&self) -> Option<Credentials> {
        lock(&self.last_credentials).clone()
    }
}

#[async_trait]
impl AuthBackend for ScriptedBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Token, BackendError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_credentials) = Some(credentials.clone());
        lock(&self.login).clone()
    }

    async fn renew(&self) -> Result<Token, BackendError> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        lock(&self.renewal).clone()
    }

    async fn revoke(&self) -> Result<(), BackendError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.revocation).clone()
    }

    async fn register(&self, credentials: &Credentials) -> Result<(), BackendError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_credentials) = Some(credentials.clone());
        lock(&self.registration).clone()
    }
}
