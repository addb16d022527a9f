//! Cross-tab session bus
//!
//! Login and logout are announced to sibling execution contexts over a
//! [`BusTransport`]. Two strategies exist: a dedicated broadcast channel
//! (low latency, never echoes to the sender) and a shared key-value store with
//! change notifications (available almost everywhere, may echo to the writer).
//! The strategy is chosen once when the bus is built.
//!
//! Delivery is best-effort. Transport errors are logged and dropped; a lost
//! notification only delays convergence until the sibling's next renewal.

pub mod local;
pub mod storage;

pub use local::{ChannelHub, LocalChannel};
pub use storage::{MemoryStorage, SharedStorage, StorageEvent, StorageListener, StorageTransport};

use crate::error::BusError;
use crate::rt::{MaybeSend, MaybeSync};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default channel name (and fallback storage key)
pub const DEFAULT_CHANNEL: &str = "auth_broadcast_v1";

/// Session event announced to sibling contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusAction {
    Login,
    Logout,
}

impl fmt::Display for BusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => f.write_str("login"),
            Self::Logout => f.write_str("logout"),
        }
    }
}

/// Identifies the execution context that published a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginId(String);

impl OriginId {
    /// Generate a fresh random origin
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The origin as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OriginId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for OriginId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire message exchanged between contexts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMessage {
    pub action: BusAction,
    /// Publish time in epoch milliseconds
    pub timestamp: i64,
    pub origin_id: OriginId,
}

impl BusMessage {
    /// Stamp a message for `action` from `origin`
    #[must_use]
    pub fn new(action: BusAction, origin_id: OriginId) -> Self {
        Self {
            action,
            timestamp: Utc::now().timestamp_millis(),
            origin_id,
        }
    }

    /// Encode as JSON
    pub fn encode(&self) -> Result<String, BusError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON
    pub fn decode(raw: &str) -> Result<Self, BusError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Callback receiving inbound bus messages
#[cfg(not(target_arch = "wasm32"))]
pub type BusHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;
/// Callback receiving inbound bus messages
#[cfg(target_arch = "wasm32")]
pub type BusHandler = Arc<dyn Fn(BusMessage)>;

#[cfg(not(target_arch = "wasm32"))]
type CancelFn = Box<dyn FnOnce() + Send>;
#[cfg(target_arch = "wasm32")]
type CancelFn = Box<dyn FnOnce()>;

/// Live subscription; dropping it unsubscribes
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<CancelFn>,
}

impl Subscription {
    /// Subscription that runs `cancel` when dropped
    pub fn new(cancel: impl FnOnce() + MaybeSend + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription with nothing to release
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Unsubscribe now
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A way of reaching sibling execution contexts
pub trait BusTransport: MaybeSend + MaybeSync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Send a message to sibling contexts
    fn publish(&self, message: &BusMessage) -> Result<(), BusError>;

    /// Receive messages from sibling contexts (and possibly our own echoes)
    fn subscribe(&self, handler: BusHandler) -> Result<Subscription, BusError>;
}

/// Origin-aware, failure-swallowing front of a transport
pub struct CrossTabBus {
    transport: Box<dyn BusTransport>,
    origin: OriginId,
}

impl CrossTabBus {
    /// Build a bus over a single transport with a fresh origin
    pub fn new(transport: impl BusTransport + 'static) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    /// Build a bus over an already boxed transport
    #[must_use]
    pub fn from_boxed(transport: Box<dyn BusTransport>) -> Self {
        Self {
            transport,
            origin: OriginId::new(),
        }
    }

    /// Prefer `primary`; use `fallback` when it is unavailable
    ///
    /// The decision is made here, once, and never revisited.
    pub fn with_fallback<F>(primary: Result<Box<dyn BusTransport>, BusError>, fallback: F) -> Self
    where
        F: FnOnce() -> Box<dyn BusTransport>,
    {
        let transport = match primary {
            Ok(transport) => transport,
            Err(err) => {
                tracing::info!(error = %err, "Broadcast transport unavailable, using fallback");
                fallback()
            }
        };
        tracing::debug!(transport = transport.name(), "Cross-tab bus ready");
        Self::from_boxed(transport)
    }

    /// Override the origin identifier
    #[must_use]
    pub fn with_origin(mut self, origin: OriginId) -> Self {
        self.origin = origin;
        self
    }

    /// This context's origin
    #[must_use]
    pub fn origin(&self) -> &OriginId {
        &self.origin
    }

    /// Name of the selected transport
    #[must_use]
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Announce `action` to sibling contexts
    ///
    /// Never fails; transport errors are logged. Returns whether the
    /// transport accepted the message.
    pub fn publish(&self, action: BusAction) -> bool {
        let message = BusMessage::new(action, self.origin.clone());
        match self.transport.publish(&message) {
            Ok(()) => {
                tracing::debug!(%action, transport = self.transport.name(), "Published session event");
                true
            }
            Err(err) => {
                tracing::warn!(%action, error = %err, "Failed to publish session event");
                false
            }
        }
    }

    /// Receive messages published by other contexts
    ///
    /// Messages carrying this bus's own origin are dropped. Returns `None`
    /// (after logging) when the transport cannot subscribe.
    pub fn subscribe(&self, handler: BusHandler) -> Option<Subscription> {
        let origin = self.origin.clone();
        let filtered: BusHandler = Arc::new(move |message: BusMessage| {
            if message.origin_id == origin {
                tracing::trace!(action = %message.action, "Ignoring own session event");
                return;
            }
            handler(message);
        });

        match self.transport.subscribe(filtered) {
            Ok(subscription) => Some(subscription),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to subscribe to session events");
                None
            }
        }
    }
}

impl fmt::Debug for CrossTabBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossTabBus")
            .field("transport", &self.transport.name())
            .field("origin", &self.origin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Transport that loops every message back to its subscribers
    #[derive(Default)]
    struct Loopback {
        handlers: Mutex<Vec<BusHandler>>,
        fail: bool,
    }

    impl BusTransport for Loopback {
        fn name(&self) -> &'static str {
            "loopback"
        }

        fn publish(&self, message: &BusMessage) -> Result<(), BusError> {
            if self.fail {
                return Err(BusError::Publish("quota exceeded".into()));
            }
            for handler in self.handlers.lock().unwrap().iter() {
                handler(message.clone());
            }
            Ok(())
        }

        fn subscribe(&self, handler: BusHandler) -> Result<Subscription, BusError> {
            if self.fail {
                return Err(BusError::Subscribe("no storage".into()));
            }
            self.handlers.lock().unwrap().push(handler);
            Ok(Subscription::noop())
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<BusMessage>>>, BusHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Arc::new(move |message: BusMessage| sink.lock().unwrap().push(message)))
    }

    #[test]
    fn test_message_wire_format() {
        let message = BusMessage {
            action: BusAction::Logout,
            timestamp: 1_700_000_000_000,
            origin_id: OriginId::from("tab-1"),
        };
        let json: serde_json::Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "logout",
                "timestamp": 1_700_000_000_000_i64,
                "originId": "tab-1"
            })
        );
        assert_eq!(BusMessage::decode(&message.encode().unwrap()).unwrap(), message);
        assert!(matches!(BusMessage::decode("{\"action\":\"reboot\"}"), Err(BusError::Codec(_))));
    }

    #[test]
    fn test_own_echoes_are_ignored() {
        let bus = CrossTabBus::new(Loopback::default());
        let (seen, handler) = recorder();
        let _subscription = bus.subscribe(handler).unwrap();

        assert!(bus.publish(BusAction::Login));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_foreign_messages_are_delivered() {
        let transport = Arc::new(Loopback::default());
        let bus = CrossTabBus::new(SharedLoopback(transport.clone()));
        let (seen, handler) = recorder();
        let _subscription = bus.subscribe(handler).unwrap();

        let foreign = BusMessage::new(BusAction::Logout, OriginId::from("other-tab"));
        transport.publish(&foreign).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![foreign]);
    }

    #[test]
    fn test_transport_failures_are_swallowed() {
        let bus = CrossTabBus::new(Loopback {
            fail: true,
            ..Loopback::default()
        });
        assert!(!bus.publish(BusAction::Logout));
        let (_seen, handler) = recorder();
        assert!(bus.subscribe(handler).is_none());
    }

    #[test]
    fn test_fallback_selected_when_primary_unavailable() {
        let bus = CrossTabBus::with_fallback(
            Err(BusError::Unavailable("BroadcastChannel".into())),
            || Box::new(Loopback::default()),
        );
        assert_eq!(bus.transport_name(), "loopback");

        let primary: Box<dyn BusTransport> = Box::new(ChannelHub::new().channel("auth"));
        let bus = CrossTabBus::with_fallback(Ok(primary), || {
            panic!("fallback must not be built when the primary is available")
        });
        assert_eq!(bus.transport_name(), "broadcast-channel");
    }

    #[test]
    fn test_subscription_runs_cancel_once() {
        let cancelled = Arc::new(Mutex::new(0));
        let counter = cancelled.clone();
        let subscription = Subscription::new(move || *counter.lock().unwrap() += 1);
        subscription.cancel();
        assert_eq!(*cancelled.lock().unwrap(), 1);
    }

    struct SharedLoopback(Arc<Loopback>);

    impl BusTransport for SharedLoopback {
        fn name(&self) -> &'static str {
            "loopback"
        }
        fn publish(&self, message: &BusMessage) -> Result<(), BusError> {
            self.0.publish(message)
        }
        fn subscribe(&self, handler: BusHandler) -> Result<Subscription, BusError> {
            self.0.subscribe(handler)
        }
    }
}
