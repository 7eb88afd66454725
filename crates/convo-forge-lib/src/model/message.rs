use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::TextCodec;
use crate::model::raw_message::RawMessage;

/// Fully typed view of a [`RawMessage`], produced once at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub sender: String,
    pub timestamp_ms: i64,
    /// Codec-normalized body, empty when the record had no string content.
    pub text: String,
    pub shared: bool,
    pub reaction: Option<String>,
}

impl NormalizedMessage {
    /// Normalize a raw record.
    ///
    /// Returns `None` for records without a sender name. `aliases` maps
    /// exported display names to the name used downstream.
    pub fn from_raw(
        raw: &RawMessage,
        codec: &dyn TextCodec,
        aliases: &BTreeMap<String, String>,
    ) -> Option<Self> {
        let sender = raw.sender_name.as_ref()?;
        let sender = aliases.get(sender).unwrap_or(sender).clone();

        let text = match &raw.content {
            Some(Value::String(s)) => codec.normalize(s),
            _ => String::new(),
        };
        let shared = matches!(raw.share, Some(Value::Object(_)));
        let reaction = first_reaction(raw.reactions.as_ref()).map(|r| codec.normalize(r));

        Some(NormalizedMessage {
            sender,
            timestamp_ms: raw.timestamp_ms,
            text,
            shared,
            reaction,
        })
    }
}

fn first_reaction(reactions: Option<&Value>) -> Option<&str> {
    reactions?.as_array()?.first()?.get("reaction")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Verbatim;
    use serde_json::json;

    fn norm(raw: &RawMessage) -> Option<NormalizedMessage> {
        NormalizedMessage::from_raw(raw, &Verbatim, &BTreeMap::new())
    }

    #[test]
    fn string_content_becomes_text() {
        let m = norm(&RawMessage::text("A", 5, "hello")).unwrap();
        assert_eq!(m.sender, "A");
        assert_eq!(m.timestamp_ms, 5);
        assert_eq!(m.text, "hello");
        assert!(!m.shared);
        assert!(m.reaction.is_none());
    }

    #[test]
    fn non_string_content_is_empty() {
        let mut raw = RawMessage::text("A", 5, "");
        raw.content = Some(json!(42));
        assert_eq!(norm(&raw).unwrap().text, "");
        raw.content = None;
        assert_eq!(norm(&raw).unwrap().text, "");
    }

    #[test]
    fn share_must_be_an_object() {
        let mut raw = RawMessage::text("A", 0, "x").with_share("https://example.com/reel");
        assert!(norm(&raw).unwrap().shared);
        raw.share = Some(json!("link"));
        assert!(!norm(&raw).unwrap().shared);
        raw.share = Some(Value::Null);
        assert!(!norm(&raw).unwrap().shared);
    }

    #[test]
    fn first_reaction_wins() {
        let raw = RawMessage::text("A", 0, "x")
            .with_reaction("first", "B")
            .with_reaction("second", "A");
        assert_eq!(norm(&raw).unwrap().reaction.as_deref(), Some("first"));

        let mut odd = RawMessage::text("A", 0, "x");
        odd.reactions = Some(json!([{"actor": "B"}]));
        assert!(norm(&odd).unwrap().reaction.is_none());
        odd.reactions = Some(json!([]));
        assert!(norm(&odd).unwrap().reaction.is_none());
        odd.reactions = Some(json!({"reaction": "x"}));
        assert!(norm(&odd).unwrap().reaction.is_none());
    }

    #[test]
    fn missing_sender_is_dropped_and_aliases_apply() {
        let mut raw = RawMessage::text("A", 0, "x");
        raw.sender_name = None;
        assert!(norm(&raw).is_none());

        let mut aliases = BTreeMap::new();
        aliases.insert("𝙳𝚒𝚟".to_string(), "Div".to_string());
        let m = NormalizedMessage::from_raw(&RawMessage::text("𝙳𝚒𝚟", 0, "x"), &Verbatim, &aliases)
            .unwrap();
        assert_eq!(m.sender, "Div");
    }
}
