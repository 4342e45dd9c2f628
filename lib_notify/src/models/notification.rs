use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// # Notification Payload
///
/// One server-pushed event. The schema is open: the fields the router looks at
/// have typed slots, everything else lands in `extra` and is passed to
/// listeners untouched.
///
/// A typed slot is filled only when the wire value is a string. Any other
/// value under that name (a number, an object, `null`) stays in `extra`, so a
/// well-formed object is never rejected for the shape of a single field.
///
/// `service_name` and `severity` are usually absent on the wire; the router
/// fills them in from `message` when it matches the `SERVICE_SEVERITY: text`
/// pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct Notification {
    /// Notification type (`payment`, `error`, `alert`, ...).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// The user category the notification is addressed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    /// Free text; may carry a `SERVICE_SEVERITY:` prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Originating backend service, sent by the server or derived from `message`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Severity derived from `message`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Server-side notification id, when sent as a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Short human-readable headline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Every field without a typed slot, or whose value is not a string.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn take_string(fields: &mut Map<String, Value>, name: &str) -> Option<String> {
    if !fields.get(name).is_some_and(Value::is_string) {
        return None;
    }
    match fields.remove(name) {
        Some(Value::String(text)) => Some(text),
        _ => None,
    }
}

impl From<Map<String, Value>> for Notification {
    fn from(mut fields: Map<String, Value>) -> Self {
        Self {
            kind: take_string(&mut fields, "type"),
            user_type: take_string(&mut fields, "userType"),
            message: take_string(&mut fields, "message"),
            service_name: take_string(&mut fields, "serviceName"),
            severity: take_string(&mut fields, "severity"),
            id: take_string(&mut fields, "id"),
            title: take_string(&mut fields, "title"),
            extra: fields,
        }
    }
}

impl Notification {
    /// Decodes one inbound frame. Only text that is not a JSON object fails.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Looks up a field that has no typed slot.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}
