//! # Notification Router
//!
//! Classifies a decoded payload and delivers it to every listener set whose key
//! matches. The rules are independent; every rule that matches contributes a
//! key:
//!
//! 1.  **Wildcard**: `*` always matches.
//! 2.  **Type**: the payload's `type` value.
//! 3.  **Derived service**: a `message` shaped like `ORDER_ERROR: text` yields
//!     `serviceName = "ORDER"` and `severity = "ERROR"`, which are written back
//!     onto the payload; the key is the lowercased service name.
//! 4.  **Known service**: a `serviceName` (sent by the server or derived in 3)
//!     that names one of `KNOWN_SERVICES`, case-insensitively; the key is the
//!     lowercased name.
//! 5.  **User type**: the payload's `userType` value.
//!
//! Keys are de-duplicated, so a listener under one key fires at most once per
//! payload. A listener registered under two keys that both match fires twice.
//! Every listener sees the fully annotated payload, whichever rule matched it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::engine::registry::ListenerRegistry;
use crate::models::notification::Notification;

/// The key every payload matches.
pub const WILDCARD_KEY: &str = "*";

/// Backend services whose `serviceName` is routed even without a
/// `SERVICE_SEVERITY:` message prefix.
pub const KNOWN_SERVICES: [&str; 4] = ["order", "stock", "product", "payment"];

/// Dispatches payloads against a shared `ListenerRegistry`.
#[derive(Clone)]
pub struct NotificationRouter {
    registry: Arc<ListenerRegistry>,
}

impl NotificationRouter {
    /// Creates a router over `registry`.
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }

    /// # Route
    ///
    /// Annotates `notification` in place (see `annotate`), then invokes every
    /// listener under every matching key before returning.
    ///
    /// Each key's listener set is snapshotted before its listeners run, so a
    /// listener may subscribe or unsubscribe (itself included) without skipping
    /// or double-firing the others in this pass. A panicking listener is logged
    /// and does not stop the rest.
    ///
    /// # Returns
    /// The number of listener invocations that completed without panicking.
    pub fn route(&self, notification: &mut Notification) -> usize {
        let derived = annotate(notification);
        let notification: &Notification = notification;

        let mut delivered = 0;
        for key in matching_keys(notification, derived) {
            for listener in self.registry.snapshot(&key) {
                match catch_unwind(AssertUnwindSafe(|| listener(notification))) {
                    Ok(()) => delivered += 1,
                    Err(panic) => {
                        log::error!(
                            "Listener under '{}' panicked: {}",
                            key,
                            panic_message(panic.as_ref())
                        );
                    }
                }
            }
        }

        log::trace!("Routed notification to {} listener(s)", delivered);
        delivered
    }
}

/// Splits a `SERVICE_SEVERITY: text` message and stores the service name and
/// severity on the payload.
///
/// Only the first colon and the first two underscore-separated segments count.
/// A message without a colon, or whose head has no underscore, leaves the
/// payload untouched.
///
/// # Returns
/// `true` if the payload was annotated.
pub fn annotate(notification: &mut Notification) -> bool {
    let Some((service, severity)) = notification.message.as_deref().and_then(split_service_severity)
    else {
        return false;
    };

    // Non-string values under these names would otherwise serialize twice.
    notification.extra.remove("serviceName");
    notification.extra.remove("severity");
    notification.service_name = Some(service);
    notification.severity = Some(severity);
    true
}

fn split_service_severity(message: &str) -> Option<(String, String)> {
    let (head, _rest) = message.split_once(':')?;
    let mut parts = head.split('_');
    let service = parts.next()?;
    let severity = parts.next()?;
    Some((service.to_string(), severity.to_string()))
}

/// The de-duplicated keys a payload matches, in rule order.
///
/// `derived` says whether `annotate` just filled in the service name; only
/// then does an unrecognised service name produce a key.
pub fn matching_keys(notification: &Notification, derived: bool) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(4);
    let mut push = |key: String| {
        if !keys.contains(&key) {
            keys.push(key);
        }
    };

    push(WILDCARD_KEY.to_string());

    if let Some(kind) = &notification.kind {
        push(kind.clone());
    }

    if let Some(service) = &notification.service_name {
        let service = service.to_lowercase();
        if derived || KNOWN_SERVICES.contains(&service.as_str()) {
            push(service);
        }
    }

    if let Some(user_type) = &notification.user_type {
        push(user_type.clone());
    }

    keys
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
