//! # Listener Registry
//!
//! Classification key → set of listener callbacks. Keys are case-sensitive and a
//! key exists only while at least one listener is registered under it.
//!
//! Set semantics are by identity: a listener is its `Arc` allocation, so
//! registering the same `Arc` twice under one key is a no-op, while two
//! separately created closures with identical code are two listeners.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::notification::Notification;

/// A notification callback. Clone the `Arc` to keep a handle for `unsubscribe`.
pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Thread-safe registry shared by the client handle and its router.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Listener>>> {
        // A panicking listener never runs under this lock, so the map is always consistent.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `listener` under `key`, creating the set if needed.
    ///
    /// Returns `false` if that exact listener was already registered there.
    pub fn subscribe(&self, key: &str, listener: &Listener) -> bool {
        let mut map = self.lock();
        let set = map.entry(key.to_string()).or_default();

        if set.iter().any(|l| same_listener(l, listener)) {
            return false;
        }
        set.push(Arc::clone(listener));
        log::debug!("Listener added under '{}' ({} total)", key, set.len());
        true
    }

    /// Removes `listener` from `key`. Unknown keys and listeners are ignored.
    ///
    /// Takes effect immediately: the next dispatch no longer sees it.
    pub fn unsubscribe(&self, key: &str, listener: &Listener) -> bool {
        let mut map = self.lock();
        let Some(set) = map.get_mut(key) else {
            return false;
        };

        let before = set.len();
        set.retain(|l| !same_listener(l, listener));
        let removed = set.len() != before;

        if set.is_empty() {
            map.remove(key);
        }
        removed
    }

    /// A stable copy of the listeners under `key`, safe to invoke while the
    /// registry is being modified.
    pub fn snapshot(&self, key: &str) -> Vec<Listener> {
        self.lock().get(key).cloned().unwrap_or_default()
    }

    /// Number of listeners currently under `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, Vec::len)
    }

    /// Whether at least one listener is registered under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// All keys with at least one listener, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}
