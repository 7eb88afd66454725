// Optional and mixed-type fields are kept as `serde_json::Value` so a single odd
// record never fails the whole file; they are validated once in `message.rs`.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One message record exactly as the exporter wrote it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Display name of the author. Records without one are dropped at normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Milliseconds since the UNIX epoch. Not unique within a conversation.
    #[serde(default)]
    pub timestamp_ms: i64,
    /// Message body; only string values carry text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Attached story/reel/link. Any JSON object marks the message as shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<Value>,
    /// Reaction list, expected as `[{"reaction": "...", "actor": "..."}, ...]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Value>,
}

impl RawMessage {
    /// Plain text message.
    pub fn text(sender: &str, timestamp_ms: i64, content: &str) -> Self {
        RawMessage {
            sender_name: Some(sender.to_string()),
            timestamp_ms,
            content: Some(Value::String(content.to_string())),
            share: None,
            reactions: None,
        }
    }

    /// Mark the message as a shared story/reel with the given link.
    pub fn with_share(mut self, link: &str) -> Self {
        self.share = Some(json!({ "link": link }));
        self
    }

    /// Append a reaction from `actor`.
    pub fn with_reaction(mut self, reaction: &str, actor: &str) -> Self {
        let entry = json!({ "reaction": reaction, "actor": actor });
        match self.reactions {
            Some(Value::Array(ref mut list)) => list.push(entry),
            _ => self.reactions = Some(Value::Array(vec![entry])),
        }
        self
    }
}

/// Top-level shape of one `message_<n>.json` export file.
///
/// Only `messages` is consumed; participants, title and thread metadata are
/// ignored by the deserializer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportDocument {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

/// Messages of a single export file together with its numeric file index.
#[derive(Debug, Clone, Default)]
pub struct MessagePart {
    pub index: u64,
    pub messages: Vec<RawMessage>,
}
