//! Wire types shared between the broker, its clients, and peer tooling.
//!
//! The broker speaks a self-describing JSON envelope: requests carry a
//! `type`, an optional `command`, and optional `data`; replies carry a `type`
//! and `data`. Failures travel as replies whose `type` is `"error"`. Brokers
//! advertise themselves to peers through [`InstanceRecord`] files.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply `type` used for error envelopes.
pub const ERROR_TYPE: &str = "error";

/// Request envelope as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Logical type name, matched case-insensitively by the broker.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Action to run against the type; the broker defaults it when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Attributes of the type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// Builds a request for the given type with no command or data.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            command: None,
            data: None,
        }
    }

    /// Sets the command.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Sets the data object.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialises the request as a single JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error when `data` cannot be serialised.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Reply envelope returned by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Type of the reply; `"error"` for failures.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Reply payload.
    #[serde(default)]
    pub data: Value,
}

impl Reply {
    /// Builds a successful reply.
    #[must_use]
    pub fn new(type_name: impl Into<String>, data: Value) -> Self {
        Self {
            type_name: type_name.into(),
            data,
        }
    }

    /// Builds an error reply.
    #[must_use]
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let kind: String = kind.into();
        let message: String = message.into();
        Self {
            type_name: ERROR_TYPE.to_owned(),
            data: serde_json::json!({ "kind": kind, "message": message }),
        }
    }

    /// Returns true when this reply reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.type_name == ERROR_TYPE
    }

    /// Extracts the error body of an error reply.
    #[must_use]
    pub fn error_body(&self) -> Option<ErrorBody> {
        if !self.is_error() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }

    /// Parses a reply from a payload frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is not a reply envelope.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Serialises the reply as a single JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error when `data` cannot be serialised.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Payload of an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error kind, for example `UnknownType`.
    pub kind: String,
    /// Human-readable detail.
    pub message: String,
}

/// Record advertising a running broker to its peers.
///
/// Stored as `<name>.json` in the shared `brokers/` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Random instance name, `broker-` followed by five letters.
    pub name: String,
    /// Front-end port, as a decimal string.
    pub port: String,
    /// Owning process identifier.
    pub pid: u32,
    /// Start time in RFC 3339 form.
    pub time: String,
}

impl InstanceRecord {
    /// Parses the advertised port.
    #[must_use]
    pub fn port_number(&self) -> Option<u16> {
        self.port.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn request_omits_absent_fields() {
        let bytes = Request::new("ping").to_bytes().expect("serialise");
        assert_eq!(bytes, br#"{"type":"ping"}"#.to_vec());
    }

    #[test]
    fn ping_reply_has_documented_shape() {
        let reply = Reply::new("ping", json!({ "ping": "pong" }));
        let text = String::from_utf8(reply.to_bytes().expect("serialise")).expect("utf8");
        assert_eq!(text, r#"{"type":"ping","data":{"ping":"pong"}}"#);
    }

    #[test]
    fn error_reply_exposes_body() {
        let reply = Reply::error("UnknownType", "widget");
        assert!(reply.is_error());
        assert_eq!(
            reply.error_body(),
            Some(ErrorBody {
                kind: "UnknownType".to_owned(),
                message: "widget".to_owned(),
            })
        );
    }

    #[rstest]
    #[case("5555", Some(5555))]
    #[case("not-a-port", None)]
    fn instance_record_port_parses(#[case] port: &str, #[case] expected: Option<u16>) {
        let record = InstanceRecord {
            name: "broker-abcde".to_owned(),
            port: port.to_owned(),
            pid: 1,
            time: "2024-01-01T00:00:00Z".to_owned(),
        };
        assert_eq!(record.port_number(), expected);
    }

    #[test]
    fn instance_record_uses_documented_field_names() {
        let record: InstanceRecord = serde_json::from_value(json!({
            "name": "broker-QwErT",
            "port": "5556",
            "pid": 4242,
            "time": "2024-05-01T12:00:00Z"
        }))
        .expect("record should parse");
        assert_eq!(record.pid, 4242);
        assert_eq!(record.port_number(), Some(5556));
    }
}
