//! Browser bindings for the Tessera session core
//!
//! Provides the two cross-tab transports (`BroadcastChannel`, with
//! `localStorage` as the fallback), console logging, and [`connect`], which
//! assembles a ready-to-use session for the current page.

#![cfg(target_arch = "wasm32")]

pub mod broadcast;
pub mod logging;
pub mod storage;

pub use broadcast::BroadcastChannelTransport;
pub use logging::init_logging;
pub use storage::LocalStorage;

use std::sync::Arc;
use tessera_core::bus::{BusTransport, LocalChannel, StorageTransport};
use tessera_core::{CrossTabBus, Session, SessionConfig};
use tessera_http::{AuthClient, BackendConfig, ClientError, SessionClient};
use wasm_bindgen::JsValue;

/// Best-effort text of a thrown JS value
pub(crate) fn js_error(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(value, &JsValue::from_str("message"))
                .ok()
                .and_then(|message| message.as_string())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

/// Pick the best transport this browser offers
///
/// `BroadcastChannel` when available, otherwise `localStorage`. Without
/// either, sibling synchronization is disabled.
pub fn select_bus(config: &SessionConfig) -> CrossTabBus {
    let primary = BroadcastChannelTransport::open(&config.channel_name)
        .map(|transport| Box::new(transport) as Box<dyn BusTransport>);
    let storage_key = config.storage_key.clone();

    CrossTabBus::with_fallback(primary, move || match LocalStorage::open() {
        Ok(storage) => Box::new(StorageTransport::new(Arc::new(storage), storage_key)),
        Err(err) => {
            tracing::warn!(error = %err, "No cross-tab transport available, tabs will not sync");
            Box::new(LocalChannel::detached())
        }
    })
}

/// Build the session of this page and a request client bound to it
///
/// Call [`Session::restore`] afterwards to resume an existing login.
pub fn connect(
    session: SessionConfig,
    backend: BackendConfig,
) -> Result<(Session, SessionClient), ClientError> {
    let auth = Arc::new(AuthClient::from_config(backend)?);
    let bus = select_bus(&session);
    let handle = Session::builder(auth.clone())
        .config(session)
        .bus(bus)
        .build();
    let client = SessionClient::new(&auth, handle.clone());
    Ok((handle, client))
}
