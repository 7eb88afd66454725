//! Library entry point for convo-forge.
//!
//! Re-exports the core types and provides helpers to persist and restore the
//! aggregated turn table as CSV. The table row (`TurnRow`) is a flat,
//! externally named representation kept separate from the internal `Turn`
//! so the on-disk columns can stay stable while the model evolves.
//
// Public modules
pub mod aggregate;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod merge;
pub mod model;
pub mod pairs;
pub mod repair;
pub mod source;

// Re‑export primary types for ergonomic use.
pub use aggregate::{
    aggregate, aggregate_batches, aggregate_inbox, AggregateConfig, AggregateReport, Aggregation,
    ProgressCallback, WorkerPool,
};
pub use codec::{CodecKind, Demojize, Emojize, TextCodec, Verbatim};
pub use config::ForgeConfig;
pub use merge::{merge, merge_parts, MergeConfig};
pub use model::{
    conversation_turn::{ConversationThread, Turn},
    message::NormalizedMessage,
    raw_message::{MessagePart, RawMessage},
    training_pair::TrainingPair,
};
pub use pairs::{derive_pairs, derive_table_pairs, label_for, primary_sender, PrimarySender};
pub use source::{Inbox, SourceError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Byte-order mark written in front of the CSV so spreadsheet tools pick UTF-8.
const UTF8_BOM: &str = "\u{feff}";

/// One row of the aggregated turn table.
///
/// # Fields
/// - `message_id`: global id, dense 1..M over the whole table
/// - `folder_id`: contact folder the turn came from
/// - `timestamp`: epoch milliseconds of the turn's opening message
/// - `message`: merged turn text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRow {
    pub message_id: u64,
    pub folder_id: String,
    pub sender: String,
    pub timestamp: i64,
    pub message: String,
    pub shared: bool,
    pub reaction: Option<String>,
}

impl TurnRow {
    /// Build a row from a folder turn and its global id.
    pub fn from_turn(message_id: u64, turn: Turn) -> Self {
        TurnRow {
            message_id,
            folder_id: turn.folder_id,
            sender: turn.sender,
            timestamp: turn.timestamp_ms,
            message: turn.text,
            shared: turn.shared,
            reaction: turn.reaction,
        }
    }
}

/// Save turn table rows to a CSV file.
///
/// # Arguments
///
/// * `rows` - rows in table order
/// * `path` - filesystem path to write CSV to
///
/// # Notes
///
/// - The file starts with a UTF-8 BOM; `load_turn_table_csv` accepts files
///   with or without it.
/// - `reaction` is written as an empty cell when absent.
pub fn save_turn_table_csv(rows: &[TurnRow], path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(UTF8_BOM.as_bytes())?;

    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing row {} to {}", row.message_id, path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Load a turn table previously written with `save_turn_table_csv`.
pub fn load_turn_table_csv(path: &Path) -> Result<Vec<TurnRow>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let body = raw.strip_prefix(UTF8_BOM).unwrap_or(&raw);

    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<TurnRow>().enumerate() {
        let row = record.with_context(|| format!("parsing record {} of {}", i + 1, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(id: u64, sender: &str, message: &str, reaction: Option<&str>) -> TurnRow {
        TurnRow {
            message_id: id,
            folder_id: "alice_1".to_string(),
            sender: sender.to_string(),
            timestamp: 1_700_000_000_000 + id as i64,
            message: message.to_string(),
            shared: id % 2 == 0,
            reaction: reaction.map(str::to_string),
        }
    }

    #[test]
    fn csv_table_survives_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("turns.csv");
        let rows = vec![
            row(1, "Alex Doe", "hey, you there?\n\n:joy:", None),
            row(2, "Sam", "replied to story/sent a reel: \"nice\"", Some(":fire:")),
        ];
        save_turn_table_csv(&rows, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM.as_bytes()));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text
            .trim_start_matches(UTF8_BOM)
            .starts_with("messageId,folderId,sender,timestamp,message,shared,reaction"));

        assert_eq!(load_turn_table_csv(&path).unwrap(), rows);
    }

    #[test]
    fn from_turn_renames_fields() {
        let turn = Turn {
            turn_id: 7,
            folder_id: "f".to_string(),
            sender: "A".to_string(),
            timestamp_ms: 42,
            text: "t".to_string(),
            shared: true,
            reaction: Some("r".to_string()),
        };
        let r = TurnRow::from_turn(3, turn);
        assert_eq!(r.message_id, 3);
        assert_eq!(r.timestamp, 42);
        assert_eq!(r.message, "t");
        assert_eq!(r.folder_id, "f");
    }
}
