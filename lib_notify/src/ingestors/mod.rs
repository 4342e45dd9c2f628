//! # Data Ingestors Module
//!
//! Clients that hold a live connection to an upstream source and feed what they
//! receive into the engine.
//!
//! ## Contained Modules:
//! - **`notify_wss`**: the resilient WebSocket client for the notification
//!   endpoint (`NotificationClient`).

/// The WebSocket client for the notification endpoint.
pub mod notify_wss;
