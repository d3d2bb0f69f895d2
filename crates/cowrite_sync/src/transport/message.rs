//! Wire message envelope.
//!
//! This is the one bit-exact contract shared with the sync server: field
//! names, the `type` enumeration, and base64 encoding of CRDT bytes must
//! not change. Everything on the wire is a JSON text frame shaped as
//!
//! ```json
//! { "type": "...", "document_id": "...", "user_id": "...",
//!   "payload": { }, "timestamp": "2026-01-01T00:00:00Z" }
//! ```
//!
//! Parsing produces `Result` rather than panicking; the session read loop
//! drops malformed frames silently so a misbehaving peer can never take
//! down the session.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Result, SyncError};

/// Cursor coordinates with an optional selection range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_end: Option<u32>,
}

/// Typed payload, one variant per recognized `type` value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Announces this user joined the document session.
    UserJoin,

    /// Announces this user left the document session.
    UserLeave,

    /// An opaque CRDT update.
    DocumentUpdate { update: Vec<u8> },

    /// Sync handshake: an update, a state vector, or both.
    Sync {
        update: Option<Vec<u8>>,
        state_vector: Option<Vec<u8>>,
    },

    /// Arbitrary presence map, relayed verbatim.
    Awareness(serde_json::Map<String, Value>),

    /// Cursor movement.
    Cursor(CursorPosition),

    /// Keepalive request.
    Ping,

    /// Keepalive response.
    Pong,
}

impl Payload {
    /// Wire name for this payload's `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            Payload::UserJoin => "UserJoin",
            Payload::UserLeave => "UserLeave",
            Payload::DocumentUpdate { .. } => "DocumentUpdate",
            Payload::Sync { .. } => "Sync",
            Payload::Awareness(_) => "Awareness",
            Payload::Cursor(_) => "Cursor",
            Payload::Ping => "Ping",
            Payload::Pong => "Pong",
        }
    }
}

/// A complete wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub payload: Payload,
    pub document_id: String,
    pub user_id: String,
    /// ISO-8601 timestamp, stamped at construction time for outbound
    /// messages and taken verbatim from the wire for inbound ones.
    pub timestamp: String,
}

impl Envelope {
    /// Build an outbound envelope stamped with the current time.
    pub fn new(
        payload: Payload,
        document_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            payload,
            document_id: document_id.into(),
            user_id: user_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        let payload = match &self.payload {
            Payload::UserJoin | Payload::UserLeave | Payload::Ping | Payload::Pong => json!({}),
            Payload::DocumentUpdate { update } => json!({ "update": BASE64.encode(update) }),
            Payload::Sync {
                update,
                state_vector,
            } => {
                let mut obj = serde_json::Map::new();
                if let Some(update) = update {
                    obj.insert("update".to_string(), json!(BASE64.encode(update)));
                }
                if let Some(sv) = state_vector {
                    obj.insert("state_vector".to_string(), json!(BASE64.encode(sv)));
                }
                Value::Object(obj)
            }
            Payload::Awareness(map) => Value::Object(map.clone()),
            Payload::Cursor(cursor) => serde_json::to_value(cursor)?,
        };

        let frame = json!({
            "type": self.payload.type_name(),
            "document_id": self.document_id,
            "user_id": self.user_id,
            "payload": payload,
            "timestamp": self.timestamp,
        });
        Ok(frame.to_string())
    }

    /// Parse an inbound JSON text frame.
    ///
    /// Fails (rather than panics) on malformed JSON, a non-object envelope
    /// or payload, missing required fields, or an unrecognized `type`.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Some(obj) = value.as_object() else {
            return Err(SyncError::Protocol("envelope is not an object".to_string()));
        };

        let kind = require_str(obj, "type")?;
        let document_id = require_str(obj, "document_id")?.to_string();
        let user_id = require_str(obj, "user_id")?.to_string();
        let timestamp = require_str(obj, "timestamp")?.to_string();

        let Some(payload_obj) = obj.get("payload").and_then(Value::as_object) else {
            return Err(SyncError::Protocol("payload is not an object".to_string()));
        };

        let payload = match kind {
            "UserJoin" => Payload::UserJoin,
            "UserLeave" => Payload::UserLeave,
            "DocumentUpdate" => Payload::DocumentUpdate {
                update: b64_field(payload_obj, "update")?.ok_or_else(|| {
                    SyncError::Protocol("DocumentUpdate payload missing 'update'".to_string())
                })?,
            },
            "Sync" => Payload::Sync {
                update: b64_field(payload_obj, "update")?,
                state_vector: b64_field(payload_obj, "state_vector")?,
            },
            "Awareness" => Payload::Awareness(payload_obj.clone()),
            "Cursor" => Payload::Cursor(serde_json::from_value(Value::Object(
                payload_obj.clone(),
            ))?),
            "Ping" => Payload::Ping,
            "Pong" => Payload::Pong,
            other => {
                return Err(SyncError::Protocol(format!(
                    "unrecognized message type: {}",
                    other
                )));
            }
        };

        Ok(Self {
            payload,
            document_id,
            user_id,
            timestamp,
        })
    }
}

fn require_str<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Result<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::Protocol(format!("missing or non-string field '{}'", key)))
}

fn b64_field(obj: &serde_json::Map<String, Value>, key: &str) -> Result<Option<Vec<u8>>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => BASE64
            .decode(s)
            .map(Some)
            .map_err(|e| SyncError::Protocol(format!("invalid base64 in '{}': {}", key, e))),
        Some(_) => Err(SyncError::Protocol(format!(
            "field '{}' is not a base64 string",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_field_names_are_exact() {
        let env = Envelope::new(
            Payload::DocumentUpdate { update: vec![0x41] },
            "doc1",
            "u1",
        );
        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "DocumentUpdate");
        assert_eq!(value["document_id"], "doc1");
        assert_eq!(value["user_id"], "u1");
        assert_eq!(value["payload"]["update"], "QQ==");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_roundtrip_all_types() {
        let mut awareness = serde_json::Map::new();
        awareness.insert("color".to_string(), json!("#ff0000"));

        let payloads = vec![
            Payload::UserJoin,
            Payload::UserLeave,
            Payload::DocumentUpdate {
                update: vec![1, 2, 3],
            },
            Payload::Sync {
                update: Some(vec![4]),
                state_vector: Some(vec![5, 6]),
            },
            Payload::Sync {
                update: None,
                state_vector: Some(vec![7]),
            },
            Payload::Awareness(awareness),
            Payload::Cursor(CursorPosition {
                x: 10.0,
                y: 20.5,
                selection_start: Some(3),
                selection_end: None,
            }),
            Payload::Ping,
            Payload::Pong,
        ];

        for payload in payloads {
            let env = Envelope::new(payload, "doc1", "u1");
            let parsed = Envelope::parse(&env.to_json().unwrap()).unwrap();
            assert_eq!(parsed, env);
        }
    }

    #[test]
    fn test_malformed_frames_fail_without_panic() {
        // Non-JSON string
        assert!(Envelope::parse("not json at all").is_err());
        // JSON, but an array rather than an object
        assert!(Envelope::parse(r#"[1, 2, 3]"#).is_err());
        // Object missing `type`
        assert!(
            Envelope::parse(
                r#"{"document_id":"d","user_id":"u","payload":{},"timestamp":"t"}"#
            )
            .is_err()
        );
        // Non-string `type`
        assert!(
            Envelope::parse(
                r#"{"type":7,"document_id":"d","user_id":"u","payload":{},"timestamp":"t"}"#
            )
            .is_err()
        );
        // Non-object payload
        assert!(
            Envelope::parse(
                r#"{"type":"Ping","document_id":"d","user_id":"u","payload":"x","timestamp":"t"}"#
            )
            .is_err()
        );
        // Unrecognized type
        assert!(
            Envelope::parse(
                r#"{"type":"Telemetry","document_id":"d","user_id":"u","payload":{},"timestamp":"t"}"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_invalid_base64_is_a_protocol_error() {
        let frame = r#"{"type":"DocumentUpdate","document_id":"d","user_id":"u",
                        "payload":{"update":"!!not-base64!!"},"timestamp":"t"}"#;
        assert!(matches!(
            Envelope::parse(frame),
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn test_cursor_selection_fields_are_optional_on_wire() {
        let env = Envelope::new(
            Payload::Cursor(CursorPosition {
                x: 1.0,
                y: 2.0,
                selection_start: None,
                selection_end: None,
            }),
            "doc1",
            "u1",
        );
        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert!(value["payload"].get("selection_start").is_none());
        assert!(value["payload"].get("selection_end").is_none());
    }
}
