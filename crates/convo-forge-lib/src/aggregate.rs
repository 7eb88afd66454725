//! Thread aggregator: runs the ingestion merger over many folders on a bounded
//! worker pool and flattens the resulting threads into one turn table.
//!
//! Folders are independent. Each folder is loaded and merged inside a single
//! pool task and its outcome is sent over a completion channel that only the
//! calling thread consumes, so no locking is needed. A folder that fails to
//! load, or panics while merging, is logged and left out.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::TextCodec;
use crate::config::ForgeConfig;
use crate::merge::{by_part_index, merge_parts, MergeConfig};
use crate::model::conversation_turn::ConversationThread;
use crate::model::raw_message::{MessagePart, RawMessage};
use crate::source::{Inbox, SourceError};
use crate::TurnRow;

/// Progress callback type for long-running operations.
/// The callback receives a message describing the current step and a progress fraction (0.0..1.0).
pub type ProgressCallback = Arc<dyn Fn(String, f32) + Send + Sync>;

/// Fixed-size worker pool owned by the caller of [`aggregate`].
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Build a pool with exactly `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            anyhow::bail!("worker count must be at least 1");
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("convo-forge-worker-{}", i))
            .build()
            .with_context(|| format!("building worker pool with {} threads", workers))?;
        Ok(WorkerPool { pool, workers })
    }

    /// Build a pool sized to the machine's available parallelism.
    pub fn with_available_parallelism() -> Result<Self> {
        Self::new(default_workers())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// Number of workers used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Configuration for the thread aggregator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Worker count; `None` uses the available parallelism.
    pub workers: Option<usize>,
    /// Order threads by folder id before numbering, making the table
    /// identical across runs. When false, threads appear in completion order.
    pub sorted_output: bool,
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    pub folders_seen: usize,
    pub folders_merged: usize,
    /// Folders that are not two-party conversations.
    pub folders_skipped: usize,
    /// Folders excluded because loading or merging failed.
    pub failed_folders: Vec<String>,
    pub turns: usize,
}

/// Result of [`aggregate`].
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub rows: Vec<TurnRow>,
    pub report: AggregateReport,
}

enum FolderOutcome {
    Merged(ConversationThread),
    Skipped,
    Failed(String),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

fn run_folder<T, F>(
    folder_id: &str,
    payload: T,
    load: &F,
    codec: &dyn TextCodec,
    cfg: &MergeConfig,
) -> FolderOutcome
where
    F: Fn(&str, T) -> Result<Vec<MessagePart>>,
{
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Option<ConversationThread>> {
        let parts = load(folder_id, payload)?;
        Ok(merge_parts(parts, folder_id, by_part_index, codec, cfg))
    }));
    match attempt {
        Ok(Ok(Some(thread))) => FolderOutcome::Merged(thread),
        Ok(Ok(None)) => FolderOutcome::Skipped,
        Ok(Err(e)) => FolderOutcome::Failed(format!("{:#}", e)),
        Err(payload) => FolderOutcome::Failed(panic_message(payload)),
    }
}

/// Load and merge every folder on `pool`, then flatten the threads.
///
/// # Arguments
///
/// * `pool` - caller-owned worker pool; one task per folder
/// * `folders` - `(folder_id, payload)` pairs; the payload is handed to `load`
/// * `load` - produces the folder's per-file batches (runs on a worker)
/// * `codec` - text codec applied during normalization
/// * `progress` - optional callback invoked as folders complete
///
/// # Returns
///
/// Rows numbered 1..M over the concatenated threads, plus a report.
pub fn aggregate<T, F>(
    pool: &WorkerPool,
    folders: Vec<(String, T)>,
    load: F,
    codec: &dyn TextCodec,
    merge_cfg: &MergeConfig,
    cfg: &AggregateConfig,
    progress: Option<ProgressCallback>,
) -> Aggregation
where
    T: Send,
    F: Fn(&str, T) -> Result<Vec<MessagePart>> + Sync,
{
    let start = Instant::now();
    let total = folders.len();
    let mut report = AggregateReport {
        folders_seen: total,
        ..Default::default()
    };
    let mut threads: Vec<ConversationThread> = Vec::new();

    let (tx, rx) = mpsc::channel::<(String, FolderOutcome)>();
    let load = &load;

    pool.pool.in_place_scope(|s| {
        for (folder_id, payload) in folders {
            let tx = tx.clone();
            s.spawn(move |_| {
                let outcome = run_folder(&folder_id, payload, load, codec, merge_cfg);
                // The receiver outlives the scope; a send can only fail if it panicked.
                let _ = tx.send((folder_id, outcome));
            });
        }
        drop(tx);

        for (done, (folder_id, outcome)) in rx.iter().enumerate() {
            match outcome {
                FolderOutcome::Merged(thread) => {
                    debug!(folder = %folder_id, turns = thread.len(), "merged folder");
                    report.folders_merged += 1;
                    threads.push(thread);
                }
                FolderOutcome::Skipped => report.folders_skipped += 1,
                FolderOutcome::Failed(reason) => {
                    warn!(folder = %folder_id, error = %reason, "error processing folder");
                    report.failed_folders.push(folder_id.clone());
                }
            }
            if let Some(ref cb) = progress {
                cb(folder_id, (done + 1) as f32 / total as f32);
            }
        }
    });

    if cfg.sorted_output {
        threads.sort_by(|a, b| a.folder_id.cmp(&b.folder_id));
    }
    report.failed_folders.sort();

    let rows: Vec<TurnRow> = threads
        .into_iter()
        .flat_map(|t| t.turns)
        .enumerate()
        .map(|(i, turn)| TurnRow::from_turn((i as u64) + 1, turn))
        .collect();
    report.turns = rows.len();

    info!(
        folders = report.folders_seen,
        merged = report.folders_merged,
        skipped = report.folders_skipped,
        failed = report.failed_folders.len(),
        turns = report.turns,
        workers = pool.workers(),
        elapsed = ?start.elapsed(),
        "aggregation finished"
    );

    Aggregation { rows, report }
}

/// [`aggregate`] over batches already in memory, one part per folder.
///
/// Each batch must already be in ingestion order.
pub fn aggregate_batches(
    pool: &WorkerPool,
    batches: BTreeMap<String, Vec<RawMessage>>,
    codec: &dyn TextCodec,
    merge_cfg: &MergeConfig,
    cfg: &AggregateConfig,
) -> Aggregation {
    let folders: Vec<(String, Vec<RawMessage>)> = batches.into_iter().collect();
    aggregate(
        pool,
        folders,
        |_, messages| Ok(vec![MessagePart { index: 1, messages }]),
        codec,
        merge_cfg,
        cfg,
        None,
    )
}

/// [`aggregate`] over every folder of an inbox directory.
///
/// Files are read on the workers. Only failing to list the inbox itself is
/// an error; per-folder failures end up in the report. Folders without any
/// `message_<n>.json` file count as skipped.
pub fn aggregate_inbox(
    pool: &WorkerPool,
    inbox: &Inbox,
    cfg: &ForgeConfig,
    progress: Option<ProgressCallback>,
) -> Result<Aggregation> {
    let folders: Vec<(String, ())> = inbox
        .folders()
        .with_context(|| format!("listing inbox {}", inbox.root().display()))?
        .into_iter()
        .map(|f| (f, ()))
        .collect();
    Ok(aggregate(
        pool,
        folders,
        |folder, ()| match inbox.load_parts(folder) {
            Err(SourceError::NoMessageFiles(path)) => {
                debug!(path = %path.display(), "folder has no message files");
                Ok(Vec::new())
            }
            loaded => Ok(loaded?),
        },
        cfg.ingest_codec.codec(),
        &cfg.merge,
        &cfg.aggregate,
        progress,
    ))
}
