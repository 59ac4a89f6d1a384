//! Request validation: turns an untyped payload into a [`ClientId`].

use serde_json::Value;

/// Name of the payload field carrying the client identifier.
pub const CLIENT_ID_FIELD: &str = "clientId";

/// Opaque, caller-supplied client identifier.
///
/// Used verbatim as the storage key. No trimming, case folding or length
/// check is applied, and the empty string is a valid identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The payload has no string `clientId`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Missing or invalid 'clientId'.")]
pub struct ValidationError;

/// Extract the client identifier from a request payload.
///
/// Succeeds iff `raw` is an object whose `clientId` field is a JSON string.
/// Other fields are ignored.
pub fn validate(raw: &Value) -> Result<ClientId, ValidationError> {
    match raw.get(CLIENT_ID_FIELD) {
        Some(Value::String(id)) => Ok(ClientId(id.clone())),
        _ => Err(ValidationError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_string_client_id() {
        let id = validate(&json!({ "clientId": "c1", "extra": 42 })).unwrap();
        assert_eq!(id.as_str(), "c1");
    }

    #[test]
    fn accepts_empty_string() {
        let id = validate(&json!({ "clientId": "" })).unwrap();
        assert_eq!(id, ClientId::new(""));
    }

    #[test]
    fn keeps_identifier_verbatim() {
        let id = validate(&json!({ "clientId": "  Mixed/Case  " })).unwrap();
        assert_eq!(id.as_str(), "  Mixed/Case  ");
    }

    #[test]
    fn rejects_missing_or_non_string() {
        for payload in [
            json!({}),
            json!({ "clientId": null }),
            json!({ "clientId": 7 }),
            json!({ "clientId": ["c1"] }),
            json!({ "clientId": { "id": "c1" } }),
            json!({ "clientid": "c1" }),
            json!(null),
            json!("c1"),
            json!([{ "clientId": "c1" }]),
        ] {
            assert_eq!(validate(&payload), Err(ValidationError), "payload {payload}");
        }
    }

    #[test]
    fn error_message_is_human_readable() {
        assert_eq!(ValidationError.to_string(), "Missing or invalid 'clientId'.");
    }
}
