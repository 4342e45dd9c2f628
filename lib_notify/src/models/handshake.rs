use serde::{Deserialize, Serialize};

/// # Subscription Handshake
///
/// The first frame sent on every freshly opened channel:
/// `{ "type": "subscribe", "userId": <string|null>, "userType": <role> }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Always `subscribe`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Session identity decoded from the bearer token; serialised as `null` when unknown.
    pub user_id: Option<String>,
    /// The caller's role.
    pub user_type: String,
}

impl Handshake {
    /// Builds the subscribe frame for a user and role.
    pub fn subscribe(user_id: Option<String>, user_type: &str) -> Self {
        Self {
            kind: "subscribe".to_string(),
            user_id,
            user_type: user_type.to_string(),
        }
    }
}
