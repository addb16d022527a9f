//! Proactive token renewal scheduling
//!
//! The scheduler reads a token's expiry and arms a single one-shot timer that
//! fires `margin` seconds before it. It is an explicit state machine:
//!
//! ```text
//! Idle --arm--> Armed --timer--> Fired --renewal settles--> Idle
//!   ^             |                |
//!   +---cancel----+-------cancel---+
//! ```
//!
//! Re-arming always cancels the previous timer first, so at most one timer is
//! pending per context. The scheduler never retries a failed renewal itself.

use crate::clock::Clock;
use crate::rt::{self, MaybeSend, lock};
use crate::token::Token;
use futures::future::{AbortHandle, Abortable};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer pending
    Idle,
    /// A timer is pending
    Armed {
        /// Renewal deadline in epoch seconds (`expiry - margin`)
        fire_at: i64,
        /// Delay from arming until the timer fires
        delay: Duration,
    },
    /// The timer fired and its renewal attempt has not settled yet
    Fired,
}

#[derive(Debug)]
struct Slot {
    state: SchedulerState,
    generation: u64,
    abort: Option<AbortHandle>,
}

/// One-shot renewal timer for a single execution context
pub struct RefreshScheduler {
    margin_secs: i64,
    clock: Arc<dyn Clock>,
    slot: Arc<Mutex<Slot>>,
}

impl RefreshScheduler {
    /// Create an idle scheduler that fires `margin` before expiry
    #[must_use]
    pub fn new(margin: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            margin_secs: i64::try_from(margin.as_secs()).unwrap_or(i64::MAX),
            clock,
            slot: Arc::new(Mutex::new(Slot {
                state: SchedulerState::Idle,
                generation: 0,
                abort: None,
            })),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        lock(&self.slot).state
    }

    /// Whether a timer is pending
    #[must_use]
    pub fn is_armed(&self) -> bool {
        matches!(self.state(), SchedulerState::Armed { .. })
    }

    /// Compute when a renewal for `token` is due
    ///
    /// Returns the deadline and the delay from now, or `None` when the token
    /// carries no readable expiry. A deadline in the past yields a zero delay.
    #[must_use]
    pub fn deadline(&self, token: &Token) -> Option<(i64, Duration)> {
        let expires_at = token.expires_at()?;
        let fire_at = expires_at.saturating_sub(self.margin_secs);
        let remaining = fire_at.saturating_sub(self.clock.now());
        let delay = Duration::from_secs(u64::try_from(remaining).unwrap_or(0));
        Some((fire_at, delay))
    }

    /// Cancel any pending timer and arm a new one for `token`
    ///
    /// Tokens without an expiry leave the scheduler idle; they are only
    /// renewed reactively. Returns the resulting state.
    pub fn arm<F, Fut>(&self, token: &Token, on_fire: F) -> SchedulerState
    where
        F: FnOnce() -> Fut + MaybeSend + 'static,
        Fut: Future<Output = ()> + MaybeSend + 'static,
    {
        let mut slot = lock(&self.slot);
        Self::reset(&mut slot);

        let Some((fire_at, delay)) = self.deadline(token) else {
            tracing::debug!("Token has no expiry claim, proactive renewal disabled");
            return slot.state;
        };

        let generation = slot.generation;
        let (abort, registration) = AbortHandle::new_pair();
        let timer_slot = Arc::clone(&self.slot);

        let timer = async move {
            rt::sleep(delay).await;

            {
                let mut slot = lock(&timer_slot);
                if slot.generation != generation {
                    return;
                }
                slot.state = SchedulerState::Fired;
                slot.abort = None;
            }

            tracing::debug!(fire_at, "Proactive renewal timer fired");
            on_fire().await;

            let mut slot = lock(&timer_slot);
            if slot.generation == generation {
                slot.state = SchedulerState::Idle;
            }
        };

        rt::spawn(async move {
            let _ = Abortable::new(timer, registration).await;
        });

        slot.abort = Some(abort);
        slot.state = SchedulerState::Armed { fire_at, delay };
        tracing::debug!(
            fire_at,
            delay_secs = delay.as_secs(),
            "Armed proactive renewal"
        );
        slot.state
    }

    /// Cancel the pending timer, if any
    ///
    /// A no-op when idle. When the timer already fired, the in-flight renewal
    /// is left to complete but its completion no longer touches this state.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        if slot.state != SchedulerState::Idle {
            tracing::debug!("Cancelled proactive renewal");
        }
        Self::reset(&mut slot);
    }

    fn reset(slot: &mut Slot) {
        if let Some(abort) = slot.abort.take() {
            abort.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.state = SchedulerState::Idle;
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("margin_secs", &self.margin_secs)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
