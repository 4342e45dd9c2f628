//! # Authentication Helpers
//!
//! The notification channel is authenticated with the same bearer token the
//! rest of the session uses. This module turns the collaborator-supplied
//! `Authorization` header into a token, and the token into a best-effort user
//! identity for the subscription handshake.

/// Bearer header parsing and session identity decoding.
pub mod session;
