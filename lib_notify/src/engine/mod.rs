//! # Core Engine Module
//!
//! The transport-independent half of the notification client.
//!
//! ## Core Components:
//!
//! - **`registry`**: classification key → set of listener callbacks, with
//!   identity-based de-duplication and immediate unsubscribe.
//! - **`router`**: classifies each payload against the routing rules and invokes
//!   every matching listener, isolating listener panics.
//! - **`backoff`**: the bounded linear retry policy the connection manager
//!   consults after every lost channel.

/// Key-indexed listener sets.
pub mod registry;
/// Payload classification and fan-out.
pub mod router;
/// Reconnection policy.
pub mod backoff;
