/*
Ingestion merger: turns one folder's raw export records into an ordered
sequence of conversational turns.

Design notes:
- Timestamps are epoch milliseconds (i64) exactly as exported.
- Only two-party folders produce a thread; anything else returns `None`.
- The adjacency window is measured from the opening message of a run, not
  from the previous message, so a long burst is cut into several turns.
- Share/reaction state of a turn is that of its opening message.
*/

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::TextCodec;
use crate::model::conversation_turn::{ConversationThread, Turn};
use crate::model::message::NormalizedMessage;
use crate::model::raw_message::{MessagePart, RawMessage};

/// Default adjacency window: five minutes.
pub const DEFAULT_WINDOW_MS: i64 = 300_000;
/// Prefix stored in front of turns opened by a shared story/reel.
pub const DEFAULT_SHARE_PREFIX: &str = "replied to story/sent a reel: ";
/// Separator between the texts of merged messages.
const RUN_SEPARATOR: &str = "\n\n";

/// Configuration for the ingestion merger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Maximum distance (ms) from a run's opening message for a same-sender
    /// message to join the run. Default: DEFAULT_WINDOW_MS.
    pub window_ms: i64,
    /// Text prepended to turns whose opening message is a share.
    pub share_prefix: String,
    /// Exported display name -> name used in turns.
    pub sender_aliases: BTreeMap<String, String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            window_ms: DEFAULT_WINDOW_MS,
            share_prefix: DEFAULT_SHARE_PREFIX.to_string(),
            sender_aliases: BTreeMap::new(),
        }
    }
}

/// Run being accumulated during the forward scan.
struct Run {
    sender: String,
    start_ms: i64,
    text: String,
    shared: bool,
    reaction: Option<String>,
}

impl Run {
    fn open(m: NormalizedMessage) -> Self {
        Run {
            sender: m.sender,
            start_ms: m.timestamp_ms,
            text: m.text,
            shared: m.shared,
            reaction: m.reaction,
        }
    }

    fn absorbs(&self, m: &NormalizedMessage, window_ms: i64) -> bool {
        self.sender == m.sender && m.timestamp_ms.saturating_sub(self.start_ms) <= window_ms
    }

    fn push(&mut self, text: &str) {
        self.text.push_str(RUN_SEPARATOR);
        self.text.push_str(text);
    }

    /// Finish the run, or `None` for a lone message without text.
    ///
    /// Runs of several content-less messages still close into a turn.
    fn close(self, folder_id: &str, cfg: &MergeConfig) -> Option<Turn> {
        if self.text.is_empty() {
            return None;
        }
        let trimmed = self.text.trim();
        let text = if self.shared {
            format!("{}{}", cfg.share_prefix, trimmed).trim().to_string()
        } else {
            trimmed.to_string()
        };
        Some(Turn {
            turn_id: 0,
            folder_id: folder_id.to_string(),
            sender: self.sender,
            timestamp_ms: self.start_ms,
            text,
            shared: self.shared,
            reaction: self.reaction,
        })
    }
}

/// Merge one folder's raw records into a conversation thread.
///
/// `raw` must already be in ingestion order (file by file, ascending file
/// index); equal timestamps keep that order. Returns `None` unless the folder
/// has exactly two distinct senders.
pub fn merge(
    raw: Vec<RawMessage>,
    folder_id: &str,
    codec: &dyn TextCodec,
    cfg: &MergeConfig,
) -> Option<ConversationThread> {
    let total = raw.len();
    let mut messages: Vec<NormalizedMessage> = raw
        .iter()
        .filter_map(|r| NormalizedMessage::from_raw(r, codec, &cfg.sender_aliases))
        .collect();
    drop(raw);
    if messages.len() < total {
        debug!(
            folder = folder_id,
            dropped = total - messages.len(),
            "dropped records without sender"
        );
    }

    let senders: HashSet<&str> = messages.iter().map(|m| m.sender.as_str()).collect();
    if senders.len() != 2 {
        debug!(
            folder = folder_id,
            senders = senders.len(),
            "not a two-party conversation"
        );
        return None;
    }

    // Stable: ties keep ingestion order.
    messages.sort_by_key(|m| m.timestamp_ms);

    let mut turns: Vec<Turn> = Vec::new();
    let mut current: Option<Run> = None;
    for m in messages {
        match current.as_mut() {
            Some(run) if run.absorbs(&m, cfg.window_ms) => run.push(&m.text),
            _ => {
                if let Some(turn) = current.take().and_then(|r| r.close(folder_id, cfg)) {
                    turns.push(turn);
                }
                current = Some(Run::open(m));
            }
        }
    }
    if let Some(turn) = current.and_then(|r| r.close(folder_id, cfg)) {
        turns.push(turn);
    }

    for (i, t) in turns.iter_mut().enumerate() {
        t.turn_id = (i as u64) + 1;
    }

    Some(ConversationThread {
        folder_id: folder_id.to_string(),
        turns,
    })
}

/// Default part ordering: ascending numeric file index.
pub fn by_part_index(a: &MessagePart, b: &MessagePart) -> Ordering {
    a.index.cmp(&b.index)
}

/// Order per-file batches with `order`, concatenate them and [`merge`].
pub fn merge_parts<F>(
    mut parts: Vec<MessagePart>,
    folder_id: &str,
    order: F,
    codec: &dyn TextCodec,
    cfg: &MergeConfig,
) -> Option<ConversationThread>
where
    F: FnMut(&MessagePart, &MessagePart) -> Ordering,
{
    parts.sort_by(order);
    let raw: Vec<RawMessage> = parts.into_iter().flat_map(|p| p.messages).collect();
    merge(raw, folder_id, codec, cfg)
}
