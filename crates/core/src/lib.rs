//! Tessera session core
//!
//! Bearer-token lifecycle for one client execution context: the token store,
//! proactive renewal ahead of expiry, single-flight reactive renewal on
//! authorization failures, and login/logout propagation across sibling
//! contexts sharing the same renewal credential.
//!
//! Transports to the network and to sibling contexts are traits; the
//! `tessera-http` and `tessera-web` crates provide the real ones.

pub mod backend;
pub mod bus;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod rt;
pub mod scheduler;
pub mod session;
pub mod store;
#[cfg(not(target_arch = "wasm32"))]
pub mod telemetry;
pub mod token;

#[cfg(all(any(test, feature = "tests"), not(target_arch = "wasm32")))]
pub mod tests;

pub use backend::{AuthBackend, Credentials};
pub use bus::{BusAction, BusMessage, BusTransport, CrossTabBus, OriginId, Subscription};
pub use clock::{Clock, SystemClock};
pub use config::{LogConfig, SessionConfig};
pub use coordinator::{Attempt, RenewalCoordinator, RenewalHooks, ResponseVerdict};
pub use error::{BackendError, BusError, RenewalError, SessionError};
pub use scheduler::{RefreshScheduler, SchedulerState};
pub use session::{Session, SessionBuilder};
pub use store::SessionStore;
pub use token::{Claims, Token};
