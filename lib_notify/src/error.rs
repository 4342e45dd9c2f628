//! # Error Types
//!
//! Every failure the notification client can surface to its caller. Transport
//! problems stay inside the connection manager and reach the caller only as the
//! `Err` of a `connect` (or `send`) call.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by the notification client.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The WebSocket transport failed to establish or broke while in use.
    #[cfg(feature = "client")]
    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The channel did not open within the configured connect timeout.
    #[error("Timed out after {0:?} waiting for the notification channel to open")]
    ConnectTimeout(Duration),

    /// The configured endpoint is not a valid URL.
    #[cfg(feature = "client")]
    #[error("Invalid notification endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// A frame could not be encoded or a config file could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A config file could not be read.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// An operation needed an open channel and there is none.
    #[error("Notification channel is not connected")]
    NotConnected,

    /// A pending connection attempt was superseded by `disconnect` or a newer `connect`.
    #[error("Connection attempt was cancelled")]
    Cancelled,

    /// The background driver task is gone, so the client can no longer act.
    #[error("Notification client has shut down")]
    ClientClosed,
}
