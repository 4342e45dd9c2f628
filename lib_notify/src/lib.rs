//! # lib_notify
//!
//! Client side of the real-time notification channel. The crate keeps one live
//! WebSocket connection per user session, authenticates it with the session's
//! bearer token, and fans every pushed notification out to listeners that
//! registered interest under a classification key.
//!
//! ## Modules:
//!
//! - **`auth`**: bearer header parsing and best-effort session identity decoding.
//! - **`configs`**: the `ClientConfig` (endpoint, retry budget, timeouts).
//! - **`engine`**: the listener registry, the notification router and the retry policy.
//! - **`models`**: the notification payload and the outbound handshake frame.
//! - **`ingestors`**: the `NotificationClient` connection manager (feature `client`).
//!
//! Lifecycle: `NotificationClient::new` → `connect` → … → `disconnect`. Listener
//! registrations survive every connect/disconnect/reconnect cycle.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod auth;
pub mod configs;
pub mod engine;
pub mod error;
pub mod models;

#[cfg(feature = "client")]
pub mod ingestors;

// --- Public API Re-exports ---
pub use auth::session::{bearer_token, decode_session_identity, CredentialContext};
pub use configs::config_client::ClientConfig;
pub use engine::backoff::{RetryDecision, RetryPolicy};
pub use engine::registry::{Listener, ListenerRegistry};
pub use engine::router::{NotificationRouter, KNOWN_SERVICES, WILDCARD_KEY};
pub use error::NotifyError;
pub use models::handshake::Handshake;
pub use models::notification::Notification;

#[cfg(feature = "client")]
pub use ingestors::notify_wss::{ConnectionState, NotificationClient};
