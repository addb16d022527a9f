//! `localStorage` as a [`SharedStorage`]
//!
//! Browsers raise `storage` events in every other document of the origin
//! when a key changes, never in the writer.

use crate::js_error;
use tessera_core::BusError;
use tessera_core::bus::{SharedStorage, StorageEvent, StorageListener, Subscription};
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use web_sys::{Storage, Window};

/// The page's `localStorage`
#[derive(Debug, Clone)]
pub struct LocalStorage {
    window: Window,
    storage: Storage,
}

impl LocalStorage {
    /// Open `localStorage`
    ///
    /// Fails with [`BusError::Unavailable`] outside a window context or where
    /// storage is disabled.
    pub fn open() -> Result<Self, BusError> {
        let window = web_sys::window()
            .ok_or_else(|| BusError::Unavailable("no window object".to_string()))?;
        let storage = window
            .local_storage()
            .map_err(|err| BusError::Unavailable(js_error(&err)))?
            .ok_or_else(|| BusError::Unavailable("localStorage is disabled".to_string()))?;
        Ok(Self { window, storage })
    }

    /// Read `key`
    #[must_use]
    pub fn get_item(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }
}

impl SharedStorage for LocalStorage {
    fn set_item(&self, key: &str, value: &str) -> Result<(), BusError> {
        self.storage
            .set_item(key, value)
            .map_err(|err| BusError::Publish(js_error(&err)))
    }

    fn remove_item(&self, key: &str) -> Result<(), BusError> {
        self.storage
            .remove_item(key)
            .map_err(|err| BusError::Publish(js_error(&err)))
    }

    fn watch(&self, listener: StorageListener) -> Result<Subscription, BusError> {
        let callback = Closure::<dyn FnMut(web_sys::StorageEvent)>::new(
            move |event: web_sys::StorageEvent| {
                // A null key means the whole store was cleared
                let Some(key) = event.key() else {
                    return;
                };
                listener(StorageEvent {
                    key,
                    new_value: event.new_value(),
                });
            },
        );

        self.window
            .add_event_listener_with_callback("storage", callback.as_ref().unchecked_ref())
            .map_err(|err| BusError::Subscribe(js_error(&err)))?;

        let window = self.window.clone();
        Ok(Subscription::new(move || {
            let _ = window
                .remove_event_listener_with_callback("storage", callback.as_ref().unchecked_ref());
        }))
    }
}
