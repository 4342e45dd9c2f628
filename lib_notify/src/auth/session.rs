//! # Session Identity
//!
//! The bearer token is a three-segment JWT. The notification client never
//! verifies it (the server does that); it only peeks at the payload segment to
//! learn which user the handshake is for. Identity is best-effort: any decoding
//! problem yields `None` and the connection proceeds anonymously.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;
use thiserror::Error;

const BEARER_PREFIX: &str = "Bearer ";
/// Claim names checked for the user identifier, in order of preference.
const IDENTITY_CLAIMS: [&str; 2] = ["userId", "sub"];

#[derive(Debug, Error)]
enum SessionError {
    #[error("token has {0} segments, expected 3")]
    Segments(usize),

    #[error("payload segment is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload segment is not JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// # Credential Context
///
/// What the session layer hands the notification client: the value of the
/// `Authorization` header it would put on an HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialContext {
    /// The raw header value, normally `Bearer <token>`.
    pub authorization: Option<String>,
}

impl CredentialContext {
    /// Builds a context carrying `Bearer <token>`.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self {
            authorization: Some(format!("{}{}", BEARER_PREFIX, token.as_ref())),
        }
    }

    /// A context without any credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The bearer token, if the header has one.
    pub fn token(&self) -> Option<&str> {
        self.authorization.as_deref().and_then(bearer_token)
    }
}

/// Extracts the token from a `Bearer <token>` header value.
///
/// Returns `None` for other schemes and for an empty token.
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header.trim().strip_prefix(BEARER_PREFIX)?.trim();
    (!token.is_empty()).then_some(token)
}

/// # Decode Session Identity
///
/// Reads the user identifier out of a JWT payload, preferring `userId` and
/// falling back to `sub`. Numeric identifiers are rendered in decimal.
///
/// Never fails: malformed tokens are logged and produce `None`.
pub fn decode_session_identity(token: &str) -> Option<String> {
    match try_decode(token) {
        Ok(identity) => identity,
        Err(e) => {
            log::warn!("Could not decode session identity from token: {}", e);
            None
        }
    }
}

fn try_decode(token: &str) -> Result<Option<String>, SessionError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(SessionError::Segments(segments.len()));
    }

    // Some issuers pad the segments even though base64url JWTs should not be.
    let bytes = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
    let claims: Value = serde_json::from_slice(&bytes)?;

    Ok(IDENTITY_CLAIMS
        .iter()
        .filter_map(|claim| claims.get(claim))
        .find_map(identity_string))
}

fn identity_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_with(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.signature", header, payload)
    }

    #[test]
    fn test_prefers_user_id_over_sub() {
        let token = token_with(json!({ "userId": "u-17", "sub": "alice" }));
        assert_eq!(decode_session_identity(&token).as_deref(), Some("u-17"));
    }

    #[test]
    fn test_falls_back_to_sub() {
        let token = token_with(json!({ "sub": "alice", "exp": 9999999999u64 }));
        assert_eq!(decode_session_identity(&token).as_deref(), Some("alice"));
    }

    #[test]
    fn test_numeric_user_id_is_rendered() {
        let token = token_with(json!({ "userId": 42 }));
        assert_eq!(decode_session_identity(&token).as_deref(), Some("42"));
    }

    #[test]
    fn test_no_identity_claim_yields_none() {
        let token = token_with(json!({ "role": "admin" }));
        assert_eq!(decode_session_identity(&token), None);
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let header = URL_SAFE_NO_PAD.encode("{}");
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"abc"}"#);
        assert!(payload.ends_with('='));
        let token = format!("{}.{}.sig", header, payload);
        assert_eq!(decode_session_identity(&token).as_deref(), Some("abc"));
    }

    #[test]
    fn test_malformed_tokens_yield_none() {
        assert_eq!(decode_session_identity(""), None);
        assert_eq!(decode_session_identity("only.two"), None);
        assert_eq!(decode_session_identity("a.b.c.d"), None);
        assert_eq!(decode_session_identity("head.!!not-base64!!.sig"), None);

        let not_json = URL_SAFE_NO_PAD.encode("plain text");
        assert_eq!(decode_session_identity(&format!("h.{}.s", not_json)), None);
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("  Bearer   tok  "), Some("tok"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("tok"), None);
    }

    #[test]
    fn test_credential_context_token() {
        assert_eq!(CredentialContext::bearer("xyz").token(), Some("xyz"));
        assert_eq!(CredentialContext::anonymous().token(), None);
    }
}
