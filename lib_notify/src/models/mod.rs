//! # Wire Models
//!
//! JSON frames exchanged with the notification endpoint.

/// The inbound, open-ended notification payload.
pub mod notification;
/// The outbound subscription handshake.
pub mod handshake;
