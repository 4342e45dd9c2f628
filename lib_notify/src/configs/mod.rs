//! # Configuration Modules
//!
//! Client-side settings for the notification channel.

/// Endpoint, retry and timeout settings for `NotificationClient`.
pub mod config_client;
