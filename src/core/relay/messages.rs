//! Relay message envelopes.
//!
//! Every frame on either connection is a JSON object with a `type` discriminator.
//! The relay only inspects the handful of types that affect the session and
//! forwards everything else untouched.

use serde::Serialize;
use serde_json::Value;

use super::base::{RelayError, RelayResult};
use super::ledger::CostData;

/// Maximum characters of session instructions echoed into logs
pub const INSTRUCTIONS_PREVIEW_CHARS: usize = 100;

/// Message types the relay recognises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    SessionUpdate,
    SessionCreated,
    SessionDisconnect,
    ResponseCreate,
    ResponseCreated,
    ResponseDone,
    ConversationItemCreated,
    ConnectionEstablished,
    ConnectionClosed,
    CostUpdate,
    Error,
    /// Any other discriminator, forwarded opaquely
    Other(String),
}

impl MessageType {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "session.update" => Self::SessionUpdate,
            "session.created" => Self::SessionCreated,
            "session.disconnect" => Self::SessionDisconnect,
            "response.create" => Self::ResponseCreate,
            "response.created" => Self::ResponseCreated,
            "response.done" => Self::ResponseDone,
            "conversation.item.created" => Self::ConversationItemCreated,
            "connection.established" => Self::ConnectionEstablished,
            "connection.closed" => Self::ConnectionClosed,
            "cost.update" => Self::CostUpdate,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionUpdate => "session.update",
            Self::SessionCreated => "session.created",
            Self::SessionDisconnect => "session.disconnect",
            Self::ResponseCreate => "response.create",
            Self::ResponseCreated => "response.created",
            Self::ResponseDone => "response.done",
            Self::ConversationItemCreated => "conversation.item.created",
            Self::ConnectionEstablished => "connection.established",
            Self::ConnectionClosed => "connection.closed",
            Self::CostUpdate => "cost.update",
            Self::Error => "error",
            Self::Other(kind) => kind,
        }
    }
}

/// A parsed envelope: the discriminator plus the whole object.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: String,
    body: Value,
}

impl Envelope {
    /// Parse a raw text frame. Fails unless it is a JSON object with a string `type`.
    pub fn parse(raw: &str) -> RelayResult<Self> {
        let body: Value =
            serde_json::from_str(raw).map_err(|e| RelayError::MalformedMessage(e.to_string()))?;
        let kind = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RelayError::MalformedMessage("expected an object with a string `type`".to_string())
            })?
            .to_string();
        Ok(Self { kind, body })
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::parse(&self.kind)
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Look up a nested value by JSON pointer (e.g. `/session/id`).
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.body.pointer(pointer)
    }

    /// `session.instructions` truncated for logging.
    pub fn instructions_preview(&self) -> String {
        let instructions = self
            .pointer("/session/instructions")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if instructions.chars().count() > INSTRUCTIONS_PREVIEW_CHARS {
            let cut: String = instructions
                .chars()
                .take(INSTRUCTIONS_PREVIEW_CHARS)
                .collect();
            format!("{cut}...")
        } else {
            instructions.to_string()
        }
    }
}

// =============================================================================
// Outgoing Messages (Relay -> Client)
// =============================================================================

/// Messages synthesised by the relay for the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum RelayOutgoingMessage {
    /// Upstream connection is up
    #[serde(rename = "connection.established")]
    ConnectionEstablished { message: String },

    /// Upstream connection dropped
    #[serde(rename = "connection.closed")]
    ConnectionClosed {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Running session cost
    #[serde(rename = "cost.update")]
    CostUpdate { cost: CostData },

    /// Local failure report
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Upstream frame that was not valid JSON
    #[serde(rename = "raw")]
    Raw { data: String },
}

impl RelayOutgoingMessage {
    pub fn error(message: impl Into<String>, error: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            error,
        }
    }

    pub fn to_json(&self) -> String {
        // Only strings and numbers; serialisation does not fail in practice.
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize outgoing message: {}", e);
            String::from(r#"{"type":"error","message":"Internal serialization error"}"#)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_envelope() {
        let env = Envelope::parse(r#"{"type":"session.update","session":{"voice":"alloy"}}"#)
            .unwrap();
        assert_eq!(env.message_type(), MessageType::SessionUpdate);
        assert_eq!(env.pointer("/session/voice"), Some(&json!("alloy")));
        assert_eq!(env.pointer("/session/missing"), None);
    }

    #[test]
    fn test_pointer_unescapes_every_segment() {
        let env = Envelope::parse(r#"{"type":"x","a/b":{"c~d":1},"e":{"f/g":2}}"#).unwrap();
        assert_eq!(env.pointer("/a~1b/c~0d"), Some(&json!(1)));
        assert_eq!(env.pointer("/e/f~1g"), Some(&json!(2)));
        assert_eq!(env.pointer("/type"), Some(&json!("x")));
        assert_eq!(env.pointer(""), Some(env.body()));
    }

    #[test]
    fn test_parse_rejects_non_envelopes() {
        assert!(matches!(
            Envelope::parse("not json"),
            Err(RelayError::MalformedMessage(_))
        ));
        assert!(Envelope::parse(r#"{"session":{}}"#).is_err());
        assert!(Envelope::parse(r#"[1,2,3]"#).is_err());
        assert!(Envelope::parse(r#"{"type":42}"#).is_err());
    }

    #[test]
    fn test_unknown_types_round_trip_their_name() {
        let t = MessageType::parse("input_audio_buffer.append");
        assert_eq!(t, MessageType::Other("input_audio_buffer.append".into()));
        assert_eq!(t.as_str(), "input_audio_buffer.append");
        assert_eq!(MessageType::parse("response.done").as_str(), "response.done");
    }

    #[test]
    fn test_instructions_preview_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let raw = json!({"type": "session.update", "session": {"instructions": long}});
        let env = Envelope::parse(&raw.to_string()).unwrap();
        let preview = env.instructions_preview();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), INSTRUCTIONS_PREVIEW_CHARS + 3);

        let short = Envelope::parse(r#"{"type":"session.update"}"#).unwrap();
        assert_eq!(short.instructions_preview(), "");
    }

    #[test]
    fn test_outgoing_wire_format() {
        let msg = RelayOutgoingMessage::error("Error parsing message", Some("eof".into()));
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "message": "Error parsing message", "error": "eof"})
        );

        let msg = RelayOutgoingMessage::error("Upstream connection not available", None);
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert!(value.get("error").is_none());

        let msg = RelayOutgoingMessage::CostUpdate {
            cost: CostData {
                total: 0.5,
                input_tokens: 1,
                output_tokens: 2,
                cached_tokens: 3,
            },
        };
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "cost.update");
        assert_eq!(value["cost"]["cachedTokens"], 3);
    }
}
