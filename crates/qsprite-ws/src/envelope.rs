//! Structured messages multiplexed over text frames.
//!
//! An envelope travels as a text frame whose first character is
//! [`SENTINEL`], followed by a JSON object:
//!
//! ```text
//! \u{FFFE}{"type":"call","service":"chat","name":"say","data":{...},"callback":7}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{WsError, WsResult};

/// Leading character that marks a text frame as an envelope.
pub const SENTINEL: char = '\u{FFFE}';

/// Envelope type that binds one more service to an open conversation.
pub const BIND_CLIENT_SERVICE: &str = "bind_client_service";
/// Envelope type of a method call.
pub const CALL: &str = "call";
/// Envelope type of a method call result.
pub const CALLBACK: &str = "callback";
/// Envelope type of a pushed event.
pub const EVENT: &str = "event";

/// A tagged application message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type (`call`, `callback`, `event`, `bind_client_service`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    /// Target or source service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Method, event or service name, depending on `kind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Call id a `callback` answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<Value>,

    /// Error carried by a failed `callback`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    /// Fields not covered above, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope of the given type with no other fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            service: None,
            name: None,
            data: None,
            callback: None,
            error: None,
            extra: Map::new(),
        }
    }

    /// Create a call to `service.name`.
    pub fn call(service: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        Self::new(CALL)
            .with_service(service)
            .with_name(name)
            .with_data(data)
    }

    /// Create an event pushed by `service`.
    pub fn event(service: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        Self::new(EVENT)
            .with_service(service)
            .with_name(name)
            .with_data(data)
    }

    /// Create a successful answer to call `id`.
    pub fn callback(service: impl Into<String>, id: Value, data: Value) -> Self {
        let mut envelope = Self::new(CALLBACK).with_service(service).with_data(data);
        envelope.callback = Some(id);
        envelope
    }

    /// Create a failed answer to call `id`.
    pub fn callback_error(service: impl Into<String>, id: Value, error: impl Into<Value>) -> Self {
        let mut envelope = Self::new(CALLBACK).with_service(service);
        envelope.callback = Some(id);
        envelope.error = Some(error.into());
        envelope
    }

    /// Create a late-binding request for `service`.
    pub fn bind_client_service(service: impl Into<String>) -> Self {
        Self::new(BIND_CLIENT_SERVICE).with_name(service)
    }

    /// Set the service.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether this is a late-binding request.
    pub fn is_bind_client_service(&self) -> bool {
        self.kind == BIND_CLIENT_SERVICE
    }

    /// Service named by a late-binding request (`name`, else `service`).
    pub fn bind_target(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.service.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Parse a text frame.
    ///
    /// Returns `Ok(None)` when the text does not start with [`SENTINEL`].
    pub fn parse(text: &str) -> WsResult<Option<Self>> {
        let Some(json) = text.strip_prefix(SENTINEL) else {
            return Ok(None);
        };
        serde_json::from_str(json)
            .map(Some)
            .map_err(|e| WsError::DecodeFailed(e.to_string()))
    }

    /// Serialize into sentinel-prefixed text.
    pub fn encode(&self) -> WsResult<String> {
        let json = serde_json::to_string(self).map_err(|e| WsError::EncodeFailed(e.to_string()))?;
        let mut text = String::with_capacity(json.len() + SENTINEL.len_utf8());
        text.push(SENTINEL);
        text.push_str(&json);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_call() {
        let text = "\u{FFFE}{\"type\":\"call\",\"service\":\"chat\",\"name\":\"say\",\"data\":{\"msg\":\"hi\"},\"callback\":7}";
        let envelope = Envelope::parse(text).unwrap().unwrap();
        assert_eq!(envelope.kind, CALL);
        assert_eq!(envelope.service.as_deref(), Some("chat"));
        assert_eq!(envelope.name.as_deref(), Some("say"));
        assert_eq!(envelope.data, Some(json!({"msg": "hi"})));
        assert_eq!(envelope.callback, Some(json!(7)));
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(Envelope::parse("hello").unwrap(), None);
        assert_eq!(Envelope::parse("").unwrap(), None);
    }

    #[test]
    fn test_parse_bad_json() {
        let err = Envelope::parse("\u{FFFE}{not json").unwrap_err();
        assert!(matches!(err, WsError::DecodeFailed(_)));
    }

    #[test]
    fn test_encode_skips_empty_fields() {
        let text = Envelope::event("chat", "joined", json!({"user": "ann"}))
            .encode()
            .unwrap();
        assert!(text.starts_with(SENTINEL));
        let value: Value = serde_json::from_str(&text[SENTINEL.len_utf8()..]).unwrap();
        assert_eq!(
            value,
            json!({"type": "event", "service": "chat", "name": "joined", "data": {"user": "ann"}})
        );
    }

    #[test]
    fn test_extra_fields_preserved() {
        let envelope = Envelope::parse("\u{FFFE}{\"type\":\"call\",\"service\":\"a\",\"trace\":\"x1\"}")
            .unwrap()
            .unwrap();
        assert_eq!(envelope.extra.get("trace"), Some(&json!("x1")));
        assert!(envelope.encode().unwrap().contains("\"trace\":\"x1\""));
    }

    #[test]
    fn test_bind_target() {
        let by_name = Envelope::bind_client_service("files");
        assert!(by_name.is_bind_client_service());
        assert_eq!(by_name.bind_target(), Some("files"));

        let by_service = Envelope::new(BIND_CLIENT_SERVICE).with_service(" billing ");
        assert_eq!(by_service.bind_target(), Some("billing"));

        assert_eq!(Envelope::new(BIND_CLIENT_SERVICE).bind_target(), None);
    }

    #[test]
    fn test_callback_error() {
        let envelope = Envelope::callback_error("chat", json!(3), "boom");
        assert_eq!(envelope.kind, CALLBACK);
        assert_eq!(envelope.error, Some(json!("boom")));
        assert_eq!(envelope.data, None);
    }
}
