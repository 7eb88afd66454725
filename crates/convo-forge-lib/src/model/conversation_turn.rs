// Timestamps stay in epoch milliseconds as exported; no date/time crate is needed
// for ordering or window arithmetic.
use serde::{Deserialize, Serialize};

/// A merged run of consecutive same-sender messages inside one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based, dense, assigned per folder after merging.
    pub turn_id: u64,
    pub folder_id: String,
    pub sender: String,
    /// Timestamp of the run's opening message.
    pub timestamp_ms: i64,
    /// Blank-line joined, trimmed text of every message in the run.
    pub text: String,
    /// Share flag of the opening message.
    pub shared: bool,
    /// Reaction of the opening message.
    pub reaction: Option<String>,
}

impl Turn {
    /// True when the turn carries no visible text.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Ordered turns of one two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub folder_id: String,
    pub turns: Vec<Turn>,
}

impl ConversationThread {
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Distinct senders in order of first appearance.
    pub fn senders(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(2);
        for t in &self.turns {
            if !out.contains(&t.sender.as_str()) {
                out.push(&t.sender);
            }
        }
        out
    }
}
