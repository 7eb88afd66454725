//! Pair deriver: prompt/response training pairs from turn sequences.
//!
//! A pair is emitted wherever a turn by the other party is immediately
//! followed by a turn from the primary sender. Derivation never looks across
//! folders.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use crate::codec::TextCodec;
use crate::model::conversation_turn::Turn;
use crate::model::training_pair::TrainingPair;
use crate::TurnRow;

/// Anything with a sender and a text that pairs can be derived from.
pub trait Utterance {
    fn sender(&self) -> &str;
    fn text(&self) -> &str;
}

impl Utterance for Turn {
    fn sender(&self) -> &str {
        &self.sender
    }
    fn text(&self) -> &str {
        &self.text
    }
}

impl Utterance for TurnRow {
    fn sender(&self) -> &str {
        &self.sender
    }
    fn text(&self) -> &str {
        &self.message
    }
}

impl<T: Utterance + ?Sized> Utterance for &T {
    fn sender(&self) -> &str {
        (**self).sender()
    }
    fn text(&self) -> &str {
        (**self).text()
    }
}

/// The sender whose turns become responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimarySender {
    pub name: String,
    /// First whitespace-separated token of `name`.
    pub label: String,
    /// Number of turns attributed to `name`.
    pub turns: usize,
}

/// Given name used as the pair label: the first token of `name`.
pub fn label_for(name: &str) -> String {
    name.split_whitespace().next().unwrap_or(name).to_string()
}

/// Sender with the most turns; ties go to the lexicographically smallest name.
pub fn primary_sender<T: Utterance>(turns: &[T]) -> Option<PrimarySender> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for t in turns {
        *counts.entry(t.sender()).or_insert(0) += 1;
    }
    // BTreeMap iterates names ascending; keep the first maximum.
    let (name, count) = counts
        .into_iter()
        .fold(None::<(&str, usize)>, |best, (name, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((name, n)),
        })?;
    info!(sender = name, turns = count, "primary sender");
    Some(PrimarySender {
        name: name.to_string(),
        label: label_for(name),
        turns: count,
    })
}

/// Derive pairs from one folder's ordered turns.
///
/// `prompt`/`response` are the codec-normalized texts; pairs where either
/// side is empty after normalization are dropped.
pub fn derive_pairs<T: Utterance>(
    turns: &[T],
    primary_sender: &str,
    primary_label: &str,
    codec: &dyn TextCodec,
) -> Vec<TrainingPair> {
    let mut out = Vec::new();
    for w in turns.windows(2) {
        let (prev, next) = (&w[0], &w[1]);
        if prev.sender() == primary_sender || next.sender() != primary_sender {
            continue;
        }
        let prompt = codec.normalize(prev.text());
        let response = codec.normalize(next.text());
        if prompt.trim().is_empty() || response.trim().is_empty() {
            continue;
        }
        out.push(TrainingPair {
            prompt,
            response,
            target: primary_label.to_string(),
        });
    }
    out
}

/// Derive pairs from a whole turn table, one folder at a time.
///
/// Folders are visited in order of first appearance; rows inside a folder
/// are ordered by `message_id`.
pub fn derive_table_pairs(
    rows: &[TurnRow],
    primary: &PrimarySender,
    codec: &dyn TextCodec,
) -> Vec<TrainingPair> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&TurnRow>> = HashMap::new();
    for row in rows {
        let group = groups.entry(row.folder_id.as_str()).or_insert_with(|| {
            order.push(row.folder_id.as_str());
            Vec::new()
        });
        group.push(row);
    }

    let mut pairs = Vec::new();
    for folder in order {
        let Some(mut group) = groups.remove(folder) else {
            continue;
        };
        group.sort_by_key(|r| r.message_id);
        let derived = derive_pairs(&group, &primary.name, &primary.label, codec);
        debug!(folder, pairs = derived.len(), "derived folder pairs");
        pairs.extend(derived);
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Demojize, Emojize, Verbatim};

    fn turn(id: u64, sender: &str, ts: i64, text: &str) -> Turn {
        Turn {
            turn_id: id,
            folder_id: "f".to_string(),
            sender: sender.to_string(),
            timestamp_ms: ts,
            text: text.to_string(),
            shared: false,
            reaction: None,
        }
    }

    fn row(id: u64, folder: &str, sender: &str, message: &str) -> TurnRow {
        TurnRow {
            message_id: id,
            folder_id: folder.to_string(),
            sender: sender.to_string(),
            timestamp: id as i64,
            message: message.to_string(),
            shared: false,
            reaction: None,
        }
    }

    #[test]
    fn only_other_then_primary_transitions_pair() {
        let turns = vec![
            turn(1, "B", 0, "b0"),
            turn(2, "A", 1, "a1"),
            turn(3, "A", 2, "a2"),
            turn(4, "B", 3, "b3"),
        ];
        let pairs = derive_pairs(&turns, "A", "Alex", &Verbatim);
        assert_eq!(
            pairs,
            vec![TrainingPair {
                prompt: "b0".to_string(),
                response: "a1".to_string(),
                target: "Alex".to_string(),
            }]
        );
    }

    #[test]
    fn empty_sides_are_dropped() {
        let turns = vec![
            turn(1, "B", 0, ""),
            turn(2, "A", 1, "a"),
            turn(3, "B", 2, "b"),
            turn(4, "A", 3, "   "),
            turn(5, "B", 4, "c"),
            turn(6, "A", 5, "d"),
        ];
        let pairs = derive_pairs(&turns, "A", "A", &Verbatim);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].prompt, "c");
        assert_eq!(pairs[0].response, "d");
    }

    #[test]
    fn short_sequences_yield_nothing() {
        let none: Vec<Turn> = Vec::new();
        assert!(derive_pairs(&none, "A", "A", &Verbatim).is_empty());
        assert!(derive_pairs(&[turn(1, "B", 0, "x")], "A", "A", &Verbatim).is_empty());
    }

    #[test]
    fn pair_codec_restores_emoji_stored_at_ingestion() {
        let stored = Demojize.normalize("that's hilarious 😂");
        let turns = vec![turn(1, "B", 0, &stored), turn(2, "A", 1, "🔥 right")];
        let pairs = derive_pairs(&turns, "A", "A", &Emojize);
        assert_eq!(pairs[0].prompt, "that's hilarious 😂");
        assert_eq!(pairs[0].response, "🔥 right");
    }

    #[test]
    fn primary_sender_counts_turns_and_breaks_ties_by_name() {
        let rows = vec![
            row(1, "f", "Zed Q", "x"),
            row(2, "f", "Alex Doe", "x"),
            row(3, "g", "Zed Q", "x"),
            row(4, "g", "Alex Doe", "x"),
            row(5, "g", "Bo", "x"),
        ];
        let primary = primary_sender(&rows).unwrap();
        assert_eq!(primary.name, "Alex Doe");
        assert_eq!(primary.label, "Alex");
        assert_eq!(primary.turns, 2);

        let empty: Vec<TurnRow> = Vec::new();
        assert!(primary_sender(&empty).is_none());
    }

    #[test]
    fn label_falls_back_to_whole_name() {
        assert_eq!(label_for("Alex Doe"), "Alex");
        assert_eq!(label_for("  solo  "), "solo");
        assert_eq!(label_for(""), "");
    }

    #[test]
    fn table_pairs_never_cross_folders() {
        let rows = vec![
            row(1, "f", "B", "f-b"),
            row(2, "f", "A", "f-a"),
            row(3, "f", "B", "f-b-last"),
            // Would pair with the previous row if folders were ignored.
            row(4, "g", "A", "g-a-first"),
            row(5, "g", "C", "g-c"),
            row(6, "g", "A", "g-a"),
        ];
        let primary = PrimarySender {
            name: "A".to_string(),
            label: "A".to_string(),
            turns: 3,
        };
        let pairs = derive_table_pairs(&rows, &primary, &Verbatim);
        let got: Vec<(&str, &str)> = pairs
            .iter()
            .map(|p| (p.prompt.as_str(), p.response.as_str()))
            .collect();
        assert_eq!(got, vec![("f-b", "f-a"), ("g-c", "g-a")]);
    }

    #[test]
    fn table_rows_are_ordered_by_message_id_within_folder() {
        let rows = vec![
            row(4, "f", "A", "answer"),
            row(9, "g", "B", "other"),
            row(3, "f", "B", "question"),
        ];
        let primary = PrimarySender {
            name: "A".to_string(),
            label: "A".to_string(),
            turns: 1,
        };
        let pairs = derive_table_pairs(&rows, &primary, &Verbatim);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].prompt, "question");
    }
}
