//! The per-context session facade
//!
//! A [`Session`] wires the store, the refresh scheduler, the renewal
//! coordinator and the cross-tab bus of one execution context together. It
//! is cheap to clone; clones share the same context.
//!
//! Lifecycle:
//!
//! - `login` stores the token, arms proactive renewal and tells siblings.
//! - Every committed renewal re-arms the scheduler from the new expiry.
//! - A failed renewal ends the session locally.
//! - `logout` revokes server-side, clears locally and tells siblings.
//! - A sibling's logout clears this context; a sibling's login makes an
//!   anonymous context pick up the shared renewal credential.

use crate::backend::{AuthBackend, Credentials};
use crate::bus::{BusAction, BusHandler, BusMessage, CrossTabBus, OriginId, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::coordinator::{self, RenewalCoordinator, RenewalHooks};
use crate::error::{BackendError, RenewalError, SessionError};
use crate::rt::{self, lock};
use crate::scheduler::{RefreshScheduler, SchedulerState};
use crate::store::SessionStore;
use crate::token::{Claims, Token};
use async_trait::async_trait;
use http::HeaderMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;

/// Builder for a [`Session`]
pub struct SessionBuilder {
    backend: Arc<dyn AuthBackend>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    bus: Option<CrossTabBus>,
}

impl SessionBuilder {
    /// Use `config` instead of the defaults
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `clock` for expiry arithmetic
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Synchronize with sibling contexts over `bus`
    #[must_use]
    pub fn bus(mut self, bus: CrossTabBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Create the session and start listening to siblings
    ///
    /// On native targets this must run inside a tokio runtime when a bus is
    /// attached.
    #[must_use]
    pub fn build(self) -> Session {
        let inner = Arc::new_cyclic(|me| SessionInner {
            me: me.clone(),
            store: SessionStore::new(),
            scheduler: RefreshScheduler::new(self.config.renew_margin(), self.clock),
            coordinator: RenewalCoordinator::new(),
            backend: self.backend,
            bus: self.bus,
            bus_subscription: Mutex::new(None),
            epoch: Mutex::new(0),
            shut_down: AtomicBool::new(false),
        });

        if let Some(bus) = &inner.bus {
            let me = Arc::downgrade(&inner);
            let handler: BusHandler = Arc::new(move |message: BusMessage| {
                if let Some(inner) = me.upgrade() {
                    inner.on_sibling_event(&message);
                }
            });
            *lock(&inner.bus_subscription) = bus.subscribe(handler);
            tracing::debug!(
                origin = %bus.origin(),
                transport = bus.transport_name(),
                "Session listening for sibling events"
            );
        }

        Session { inner }
    }
}

/// Session lifecycle of one execution context
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    me: Weak<SessionInner>,
    store: SessionStore,
    scheduler: RefreshScheduler,
    coordinator: RenewalCoordinator,
    backend: Arc<dyn AuthBackend>,
    bus: Option<CrossTabBus>,
    bus_subscription: Mutex<Option<Subscription>>,
    // Bumped on every local clear; renewals started before it cannot commit
    epoch: Mutex<u64>,
    shut_down: AtomicBool,
}

impl Session {
    /// Start building a session backed by `backend`
    pub fn builder(backend: Arc<dyn AuthBackend>) -> SessionBuilder {
        SessionBuilder {
            backend,
            config: SessionConfig::default(),
            clock: Arc::new(SystemClock),
            bus: None,
        }
    }

    /// Session with default settings and no sibling synchronization
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self::builder(backend).build()
    }

    /// Whether a token is held
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.store.is_authenticated()
    }

    /// The current token
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.inner.store.token()
    }

    /// Claims of the current token, when it has readable ones
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        self.token().as_ref().and_then(Token::claims)
    }

    /// Whether the current token grants at least one of `required`
    ///
    /// False when unauthenticated or when the token carries no roles.
    #[must_use]
    pub fn has_any_role<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.claims()
            .is_some_and(|claims| claims.has_any_role(required))
    }

    /// Watch the current token
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Token>> {
        self.inner.store.subscribe()
    }

    /// State of the proactive renewal timer
    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        self.inner.scheduler.state()
    }

    /// Renewal calls issued to the backend so far
    #[must_use]
    pub fn renewal_calls(&self) -> u64 {
        self.inner.coordinator.renewal_calls()
    }

    /// This context's origin on the cross-tab bus
    #[must_use]
    pub fn origin(&self) -> Option<&OriginId> {
        self.inner.bus.as_ref().map(CrossTabBus::origin)
    }

    /// Whether [`Session::shutdown`] has run
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }

    /// Exchange credentials for a token and start the session
    ///
    /// On failure the session is left exactly as it was.
    pub async fn login(
        &self,
        identifier: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), SessionError> {
        if self.is_shut_down() {
            return Err(SessionError::ShutDown);
        }

        let credentials = Credentials::new(identifier, password);
        let token = self
            .inner
            .backend
            .authenticate(&credentials)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "Login failed");
                SessionError::AuthenticationFailed(err)
            })?;

        if !self.inner.install(token) {
            return Err(SessionError::ShutDown);
        }
        tracing::info!("Logged in");
        self.inner.announce(BusAction::Login);
        Ok(())
    }

    /// End the session here and in every sibling context
    ///
    /// Never fails. Revocation is best effort; local state is cleared even
    /// when the backend cannot be reached.
    pub async fn logout(&self) {
        if self.is_shut_down() {
            return;
        }

        if let Err(err) = self.inner.backend.revoke().await {
            tracing::warn!(error = %err, "Failed to revoke session, clearing locally anyway");
        }
        self.inner.clear_local();
        tracing::info!("Logged out");
        self.inner.announce(BusAction::Logout);
    }

    /// Create an account; does not log in
    pub async fn register(
        &self,
        identifier: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), SessionError> {
        if self.is_shut_down() {
            return Err(SessionError::ShutDown);
        }

        let credentials = Credentials::new(identifier, password);
        self.inner
            .backend
            .register(&credentials)
            .await
            .map_err(SessionError::RegistrationFailed)?;
        tracing::info!("Registered account");
        Ok(())
    }

    /// Try to resume a session from the out-of-band renewal credential
    ///
    /// Meant for startup. Returns whether the context is now authenticated.
    pub async fn restore(&self) -> bool {
        match self.renew().await {
            Ok(_) => {
                tracing::info!("Restored session");
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "No session to restore");
                false
            }
        }
    }

    /// Obtain a fresh token, joining the in-flight renewal if any
    ///
    /// A failed renewal ends the session locally.
    pub async fn renew(&self) -> Result<Token, RenewalError> {
        if self.is_shut_down() {
            return Err(RenewalError::ShutDown);
        }
        self.inner.coordinator.renew(self.inner.as_ref()).await
    }

    /// Attach the bearer credential to outbound request headers
    ///
    /// Leaves the headers alone when unauthenticated.
    pub fn decorate(&self, headers: &mut HeaderMap) {
        coordinator::decorate(headers, self.token().as_ref());
    }

    /// Tear the context down
    ///
    /// Cancels the timer and stops listening to siblings. Later mutations are
    /// no-ops and later operations fail with a shut-down error.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.scheduler.cancel();
        if let Some(subscription) = lock(&self.inner.bus_subscription).take() {
            subscription.cancel();
        }
        tracing::debug!("Session shut down");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("scheduler", &self.inner.scheduler)
            .field("coordinator", &self.inner.coordinator)
            .field("bus", &self.inner.bus)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl SessionInner {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Store `token` and arm proactive renewal from its expiry
    ///
    /// Re-arms even when the token is unchanged. Returns false once shut down.
    fn install(&self, token: Token) -> bool {
        if self.is_shut_down() {
            return false;
        }

        self.store.set_token(Some(token.clone()));

        let me = self.me.clone();
        self.scheduler.arm(&token, move || async move {
            let Some(inner) = me.upgrade() else {
                return;
            };
            if let Err(err) = (Session { inner }).renew().await {
                tracing::debug!(error = %err, "Proactive renewal failed");
            }
        });
        true
    }

    fn clear_local(&self) {
        let mut epoch = lock(&self.epoch);
        self.clear_locked(&mut epoch);
    }

    fn clear_locked(&self, epoch: &mut u64) {
        if self.is_shut_down() {
            return;
        }
        *epoch += 1;
        self.scheduler.cancel();
        self.store.clear();
    }

    fn announce(&self, action: BusAction) {
        if let Some(bus) = &self.bus {
            bus.publish(action);
        }
    }

    fn on_sibling_event(&self, message: &BusMessage) {
        if self.is_shut_down() {
            return;
        }

        match message.action {
            BusAction::Logout => {
                tracing::info!(origin = %message.origin_id, "Sibling logged out, clearing session");
                self.clear_local();
            }
            BusAction::Login if self.store.is_authenticated() => {
                tracing::debug!(origin = %message.origin_id, "Sibling logged in, already authenticated");
            }
            BusAction::Login => {
                tracing::info!(origin = %message.origin_id, "Sibling logged in, picking up session");
                let me = self.me.clone();
                rt::spawn(async move {
                    let Some(inner) = me.upgrade() else {
                        return;
                    };
                    if let Err(err) = (Session { inner }).renew().await {
                        tracing::debug!(error = %err, "Could not pick up sibling session");
                    }
                });
            }
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl RenewalHooks for SessionInner {
    fn epoch(&self) -> u64 {
        *lock(&self.epoch)
    }

    async fn fetch(&self) -> Result<Token, BackendError> {
        self.backend.renew().await
    }

    fn commit(&self, token: &Token, epoch: u64) -> bool {
        let current = lock(&self.epoch);
        if *current != epoch {
            return false;
        }
        let committed = self.install(token.clone());
        if committed {
            tracing::debug!("Committed renewed token");
        }
        committed
    }

    fn discard(&self, epoch: u64) -> bool {
        let mut current = lock(&self.epoch);
        if *current != epoch || self.is_shut_down() {
            return false;
        }
        // Only a context that held a session has anything to revoke
        let was_authenticated = self.store.is_authenticated();
        self.clear_locked(&mut current);
        was_authenticated
    }

    async fn revoke(&self) {
        if let Err(err) = self.backend.revoke().await {
            tracing::debug!(error = %err, "Revocation after failed renewal also failed");
        }
    }
}
