//! In-process broadcast channel transport
//!
//! A [`ChannelHub`] plays the role of the browser's `BroadcastChannel`
//! registry: every [`LocalChannel`] opened on the same name receives what the
//! others post, delivered asynchronously, and never its own posts.

use super::{BusHandler, BusMessage, BusTransport, Subscription};
use crate::error::BusError;
use crate::rt::{self, lock};
use futures::future::{AbortHandle, Abortable};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

static NEXT_ENDPOINT: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct Envelope {
    sender: u64,
    payload: String,
}

/// Registry of named broadcast channels shared by several contexts
#[derive(Debug, Clone, Default)]
pub struct ChannelHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Envelope>>>>,
}

impl ChannelHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an endpoint on the channel called `name`
    #[must_use]
    pub fn channel(&self, name: &str) -> LocalChannel {
        let sender = lock(&self.channels)
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        LocalChannel::with_sender(sender, "broadcast-channel")
    }
}

/// One context's endpoint on a hub channel
#[derive(Debug)]
pub struct LocalChannel {
    endpoint: u64,
    name: &'static str,
    sender: broadcast::Sender<Envelope>,
}

impl LocalChannel {
    fn with_sender(sender: broadcast::Sender<Envelope>, name: &'static str) -> Self {
        Self {
            endpoint: NEXT_ENDPOINT.fetch_add(1, Ordering::Relaxed),
            name,
            sender,
        }
    }

    /// Endpoint on a private channel nobody else can reach
    #[must_use]
    pub fn detached() -> Self {
        Self::with_sender(broadcast::channel(CHANNEL_CAPACITY).0, "detached")
    }
}

impl BusTransport for LocalChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    fn publish(&self, message: &BusMessage) -> Result<(), BusError> {
        let envelope = Envelope {
            sender: self.endpoint,
            payload: message.encode()?,
        };
        // No listeners is not an error for a broadcast channel
        let _ = self.sender.send(envelope);
        Ok(())
    }

    fn subscribe(&self, handler: BusHandler) -> Result<Subscription, BusError> {
        let mut rx = self.sender.subscribe();
        let endpoint = self.endpoint;
        let (abort, registration) = AbortHandle::new_pair();

        let pump = async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.sender == endpoint => {}
                    Ok(envelope) => match BusMessage::decode(&envelope.payload) {
                        Ok(message) => handler(message),
                        Err(err) => tracing::warn!(error = %err, "Dropping malformed bus message"),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Bus subscriber lagged, messages lost");
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
