//! Shared key-value store fallback transport
//!
//! When no broadcast channel exists, a message is written under a fixed key
//! of a store shared by all contexts and removed right after. The write's
//! change notification wakes the siblings. Stores may notify the writer too,
//! which is why every message carries its origin.

use super::{BusHandler, BusMessage, BusTransport, Subscription};
use crate::error::BusError;
use crate::rt::{self, MaybeSend, MaybeSync, lock};
use futures::future::{AbortHandle, Abortable};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Change notification from a shared store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// Value after the change; `None` when the key was removed
    pub new_value: Option<String>,
}

/// Callback receiving store change notifications
#[cfg(not(target_arch = "wasm32"))]
pub type StorageListener = Arc<dyn Fn(StorageEvent) + Send + Sync>;
/// Callback receiving store change notifications
#[cfg(target_arch = "wasm32")]
pub type StorageListener = Arc<dyn Fn(StorageEvent)>;

/// Key-value store shared by every execution context
#[cfg_attr(test, mockall::automock)]
pub trait SharedStorage: MaybeSend + MaybeSync {
    /// Write `value` under `key`
    fn set_item(&self, key: &str, value: &str) -> Result<(), BusError>;

    /// Delete `key`
    fn remove_item(&self, key: &str) -> Result<(), BusError>;

    /// Receive change notifications for every key
    fn watch(&self, listener: StorageListener) -> Result<Subscription, BusError>;
}

/// Bus transport writing messages into a [`SharedStorage`]
pub struct StorageTransport {
    storage: Arc<dyn SharedStorage>,
    key: String,
}

impl StorageTransport {
    /// Publish and listen under `key`
    pub fn new(storage: Arc<dyn SharedStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }
}

impl BusTransport for StorageTransport {
    fn name(&self) -> &'static str {
        "shared-storage"
    }

    fn publish(&self, message: &BusMessage) -> Result<(), BusError> {
        self.storage.set_item(&self.key, &message.encode()?)?;
        // Listeners already hold the written value; leave nothing behind for
        // later scans of the store.
        if let Err(err) = self.storage.remove_item(&self.key) {
            tracing::warn!(key = %self.key, error = %err, "Failed to clear bus message from storage");
        }
        Ok(())
    }

    fn subscribe(&self, handler: BusHandler) -> Result<Subscription, BusError> {
        let key = self.key.clone();
        let listener: StorageListener = Arc::new(move |event: StorageEvent| {
            if event.key != key {
                return;
            }
            let Some(raw) = event.new_value else {
                return;
            };
            match BusMessage::decode(&raw) {
                Ok(message) => handler(message),
                Err(err) => tracing::warn!(error = %err, "Dropping malformed bus message"),
            }
        });
        self.storage.watch(listener)
    }
}

/// In-memory [`SharedStorage`] shared by clones
///
/// Change notifications are delivered asynchronously to every watcher,
/// including the one that made the change.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryStorage {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(HashMap::new())),
            events: broadcast::channel(64).0,
        }
    }

    /// Read `key`
    #[must_use]
    pub fn get_item(&self, key: &str) -> Option<String> {
        lock(&self.items).get(key).cloned()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    /// Whether the store holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
        });
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStorage for MemoryStorage {
    fn set_item(&self, key: &str, value: &str) -> Result<(), BusError> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), BusError> {
        if lock(&self.items).remove(key).is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    fn watch(&self, listener: StorageListener) -> Result<Subscription, BusError> {
        let mut rx = self.events.subscribe();
        let (abort, registration) = AbortHandle::new_pair();

        let pump = async move {
            loop {
                match rx.recv().await {
                    Ok(event) => listener(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Storage watcher lagged, events lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        rt::spawn(async move {
            let _ = Abortable::new(pump, registration).await;
        });

        Ok(Subscription::new(move || abort.abort()))
    }
}
