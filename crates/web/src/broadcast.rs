//! `BroadcastChannel` transport
//!
//! Messages are posted as JSON strings. Plain objects posted by other
//! scripts on the same channel are accepted too.

use crate::js_error;
use tessera_core::bus::{BusHandler, BusMessage, BusTransport, Subscription};
use tessera_core::BusError;
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen::closure::Closure;
use web_sys::{BroadcastChannel, MessageEvent};

/// Bus transport over a named `BroadcastChannel`
#[derive(Debug)]
pub struct BroadcastChannelTransport {
    channel: BroadcastChannel,
}

impl BroadcastChannelTransport {
    /// Open the channel called `name`
    ///
    /// Fails with [`BusError::Unavailable`] where the API is missing.
    pub fn open(name: &str) -> Result<Self, BusError> {
        let channel = BroadcastChannel::new(name).map_err(|err| BusError::Unavailable(js_error(&err)))?;
        Ok(Self { channel })
    }
}

impl BusTransport for BroadcastChannelTransport {
    fn name(&self) -> &'static str {
        "broadcast-channel"
    }

    fn publish(&self, message: &BusMessage) -> Result<(), BusError> {
        let payload = JsValue::from_str(&message.encode()?);
        self.channel
            .post_message(&payload)
            .map_err(|err| BusError::Publish(js_error(&err)))
    }

    fn subscribe(&self, handler: BusHandler) -> Result<Subscription, BusError> {
        let listener = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            match decode_event(&event.data()) {
                Ok(message) => handler(message),
                Err(err) => tracing::warn!(error = %err, "Dropping malformed bus message"),
            }
        });

        self.channel
            .add_event_listener_with_callback("message", listener.as_ref().unchecked_ref())
            .map_err(|err| BusError::Subscribe(js_error(&err)))?;

        let channel = self.channel.clone();
        Ok(Subscription::new(move || {
            let _ = channel
                .remove_event_listener_with_callback("message", listener.as_ref().unchecked_ref());
        }))
    }
}

impl Drop for BroadcastChannelTransport {
    fn drop(&mut self) {
        self.channel.close();
    }
}

fn decode_event(data: &JsValue) -> Result<BusMessage, BusError> {
    if let Some(raw) = data.as_string() {
        return BusMessage::decode(&raw);
    }
    let raw = js_sys::JSON::stringify(data)
        .map_err(|err| BusError::Codec(js_error(&err)))?;
    BusMessage::decode(&String::from(raw))
}
