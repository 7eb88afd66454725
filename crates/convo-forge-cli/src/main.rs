//! CLI for convo-forge.
//!
//! Subcommands:
//!  - `repair` : rewrite an exported inbox with mojibake repaired.
//!  - `ingest` : merge every two-party folder of an inbox into a turn table (CSV).
//!  - `pairs`  : derive prompt/response training pairs from a turn table.
//!  - `run`    : `ingest` followed by `pairs`.
//!
//! Usage examples:
//!  cargo run -p convo-forge -- ingest --inbox ./inbox --out turns.csv
//!  cargo run -p convo-forge -- pairs --turns turns.csv --out-dir dataset

use std::path::{Path, PathBuf};
#[cfg(feature = "progress")]
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;

mod settings;

use crate::settings::Overrides;

/// Local library crate export (hyphen -> underscore).
use convo_forge::{
    aggregate::default_workers,
    aggregate_inbox, dataset, derive_table_pairs, label_for, load_turn_table_csv, primary_sender,
    repair::repair_tree, save_turn_table_csv, ForgeConfig, Inbox, PrimarySender, WorkerPool,
};
#[cfg(feature = "progress")]
use convo_forge::ProgressCallback;

/// File names written by `pairs` inside `--out-dir`.
const PAIRS_JSON: &str = "final_dataset.json";
const PAIRS_JSONL: &str = "final_dataset.jsonl";
const PAIRS_RELABELED_JSONL: &str = "final_dataset2.jsonl";
/// Turn table file written by `run` inside `--out-dir`.
const TURNS_CSV: &str = "turns.csv";

/// CLI entrypoint.
#[derive(Parser)]
#[command(
    name = "convo-forge",
    about = "convo-forge CLI: chat inbox exports to turn tables and training pairs",
    version
)]
struct Cli {
    /// Default log level when RUST_LOG is not set (error|warn|info|debug|trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy an inbox tree with mis-decoded (mojibake) text repaired.
    Repair(RepairArgs),

    /// Merge every two-party folder of an inbox into one turn table.
    Ingest(IngestArgs),

    /// Derive prompt/response pairs from a turn table.
    Pairs(PairsArgs),

    /// Ingest an inbox and derive pairs in one go.
    Run(RunArgs),
}

/// Arguments for the `repair` subcommand.
#[derive(Args, Debug)]
struct RepairArgs {
    /// Inbox directory to read.
    #[arg(long, short = 'i', value_name = "PATH")]
    input: PathBuf,

    /// Directory to write repaired files to (same layout as the input).
    #[arg(long, short = 'o', value_name = "PATH")]
    output: PathBuf,
}

/// Options shared by `ingest` and `run`.
#[derive(Args, Debug)]
struct IngestOptions {
    /// Inbox directory: one sub-directory per contact with message_<n>.json files.
    #[arg(long, value_name = "PATH")]
    inbox: PathBuf,

    /// JSON config file (values not given keep their defaults).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of parallel folder workers (default: available parallelism).
    #[arg(long)]
    workers: Option<usize>,

    /// Adjacency window in seconds for merging same-sender messages (default: 300).
    #[arg(long)]
    window_secs: Option<u64>,

    /// Rename a sender, e.g. --alias "Fancy Display Name=Sam". Repeatable.
    #[arg(long = "alias", value_name = "FROM=TO")]
    aliases: Vec<String>,

    /// Order folders by name so the table is identical across runs.
    #[arg(long)]
    sorted: bool,

    /// Skip mojibake repair while parsing (use after `repair`).
    #[arg(long)]
    no_repair: bool,
}

impl IngestOptions {
    fn resolve(&self) -> Result<ForgeConfig> {
        let overrides = Overrides {
            workers: self.workers,
            window_secs: self.window_secs,
            aliases: self.aliases.clone(),
            sorted: self.sorted,
            no_repair: self.no_repair,
        };
        settings::resolve(self.config.as_deref(), &overrides)
    }
}

/// Arguments for the `ingest` subcommand.
#[derive(Args, Debug)]
struct IngestArgs {
    #[command(flatten)]
    opts: IngestOptions,

    /// Path to write the turn table CSV to.
    #[arg(long, short = 'o', value_name = "PATH")]
    out: PathBuf,

    /// Print the aggregation report as JSON to stdout.
    #[arg(long)]
    json: bool,
}

/// Options shared by `pairs` and `run`.
#[derive(Args, Debug)]
struct PairOptions {
    /// Directory for final_dataset.json / .jsonl / final_dataset2.jsonl.
    #[arg(long, value_name = "PATH")]
    out_dir: PathBuf,

    /// Use this sender as the responder instead of the one with most turns.
    #[arg(long)]
    primary: Option<String>,

    /// Label for the responder key (default: first name of the primary sender).
    #[arg(long)]
    label: Option<String>,
}

/// Arguments for the `pairs` subcommand.
#[derive(Args, Debug)]
struct PairsArgs {
    /// Turn table CSV written by `ingest`.
    #[arg(long, value_name = "PATH")]
    turns: PathBuf,

    /// JSON config file (only the pair codec is used).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(flatten)]
    pairs: PairOptions,

    /// Print a summary as JSON to stdout.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    opts: IngestOptions,

    #[command(flatten)]
    pairs: PairOptions,
}

/// Application entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Repair(args) => run_repair(args),
        Commands::Ingest(args) => run_ingest(args),
        Commands::Pairs(args) => run_pairs(args),
        Commands::Run(args) => run_all(args),
    }
}

/// Initializes the tracing subscriber; logs go to stderr, summaries to stdout.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("convo_forge={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the `repair` subcommand.
fn run_repair(args: RepairArgs) -> Result<()> {
    let stats = repair_tree(&args.input, &args.output)
        .with_context(|| format!("repairing {}", args.input.display()))?;
    println!(
        "Repaired {} files into {} ({} skipped as invalid JSON)",
        stats.converted,
        args.output.display(),
        stats.skipped
    );
    Ok(())
}

#[cfg(feature = "progress")]
fn folder_progress() -> (indicatif::ProgressBar, ProgressCallback) {
    use indicatif::{ProgressBar, ProgressStyle};

    const STEPS: u64 = 1000;
    let bar = ProgressBar::new(STEPS);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            .unwrap()
            .progress_chars("##-"),
    );
    bar.set_message("Merging folders...");
    let handle = bar.clone();
    let cb: ProgressCallback = Arc::new(move |folder: String, fraction: f32| {
        handle.set_position((fraction * STEPS as f32) as u64);
        handle.set_message(folder);
    });
    (bar, cb)
}

/// Aggregate the inbox and write the turn table.
fn ingest_to_csv(opts: &IngestOptions, out: &Path) -> Result<convo_forge::Aggregation> {
    let cfg = opts.resolve()?;
    let workers = cfg.aggregate.workers.unwrap_or_else(default_workers);
    let pool = WorkerPool::new(workers)?;
    let inbox = Inbox::new(&opts.inbox, cfg.repair_encoding);
    info!(
        inbox = %opts.inbox.display(),
        workers,
        window_ms = cfg.merge.window_ms,
        codec = cfg.ingest_codec.as_str(),
        "starting ingest"
    );

    #[cfg(feature = "progress")]
    let aggregation = {
        let (bar, cb) = folder_progress();
        let result = aggregate_inbox(&pool, &inbox, &cfg, Some(cb));
        bar.finish_and_clear();
        result?
    };
    #[cfg(not(feature = "progress"))]
    let aggregation = aggregate_inbox(&pool, &inbox, &cfg, None)?;

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    save_turn_table_csv(&aggregation.rows, out)
        .with_context(|| format!("saving turn table to {}", out.display()))?;
    Ok(aggregation)
}

/// Run the `ingest` subcommand.
fn run_ingest(args: IngestArgs) -> Result<()> {
    let start = Instant::now();
    let aggregation = ingest_to_csv(&args.opts, &args.out)?;
    let report = &aggregation.report;

    if args.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "Merged {} of {} folders ({} not two-party, {} failed) into {} turns in {:?}",
            report.folders_merged,
            report.folders_seen,
            report.folders_skipped,
            report.failed_folders.len(),
            report.turns,
            start.elapsed()
        );
        for folder in &report.failed_folders {
            println!("  failed: {}", folder);
        }
        println!("Saved turn table to {}", args.out.display());
    }
    Ok(())
}

/// Pick the responder: explicit `--primary`, or the sender with most turns.
fn choose_primary(
    rows: &[convo_forge::TurnRow],
    opts: &PairOptions,
) -> Result<PrimarySender> {
    let mut primary = match &opts.primary {
        Some(name) => PrimarySender {
            name: name.clone(),
            label: label_for(name),
            turns: rows.iter().filter(|r| &r.sender == name).count(),
        },
        None => primary_sender(rows)
            .ok_or_else(|| anyhow::anyhow!("turn table is empty; nothing to derive pairs from"))?,
    };
    if let Some(label) = &opts.label {
        primary.label = label.clone();
    }
    if primary.label.is_empty() {
        return Err(anyhow::anyhow!(
            "primary sender '{}' has no usable label; pass --label",
            primary.name
        ));
    }
    Ok(primary)
}

/// Derive pairs from `rows` and write the three dataset files.
fn write_pairs(
    rows: &[convo_forge::TurnRow],
    cfg: &ForgeConfig,
    opts: &PairOptions,
) -> Result<serde_json::Value> {
    let primary = choose_primary(rows, opts)?;
    println!(
        "The most frequent sender is: {} with {} turns",
        primary.name, primary.turns
    );

    let pairs = derive_table_pairs(rows, &primary, cfg.pair_codec.codec());

    let json_path = opts.out_dir.join(PAIRS_JSON);
    let jsonl_path = opts.out_dir.join(PAIRS_JSONL);
    let relabeled_path = opts.out_dir.join(PAIRS_RELABELED_JSONL);

    dataset::save_pairs_json(&pairs, &json_path)?;
    let lines = dataset::json_to_jsonl(&json_path, &jsonl_path)?;
    let relabeled = dataset::relabel_jsonl(&jsonl_path, &relabeled_path, &primary.label)?;
    info!(pairs = pairs.len(), lines, relabeled, "dataset written");

    Ok(json!({
        "primary_sender": primary.name,
        "label": primary.label,
        "primary_turns": primary.turns,
        "pairs": pairs.len(),
        "json": json_path,
        "jsonl": jsonl_path,
        "relabeled_jsonl": relabeled_path,
    }))
}

/// Run the `pairs` subcommand.
fn run_pairs(args: PairsArgs) -> Result<()> {
    let cfg = match &args.config {
        Some(path) => ForgeConfig::load(path)?,
        None => ForgeConfig::default(),
    };
    let rows = load_turn_table_csv(&args.turns)
        .with_context(|| format!("loading turn table {}", args.turns.display()))?;
    let summary = write_pairs(&rows, &cfg, &args.pairs)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Wrote {} pairs to {}",
            summary["pairs"],
            args.pairs.out_dir.display()
        );
    }
    Ok(())
}

/// Run the `run` subcommand.
fn run_all(args: RunArgs) -> Result<()> {
    let start = Instant::now();
    let turns_path = args.pairs.out_dir.join(TURNS_CSV);
    let aggregation = ingest_to_csv(&args.opts, &turns_path)?;
    println!(
        "Saved {} turns from {} folders to {}",
        aggregation.report.turns,
        aggregation.report.folders_merged,
        turns_path.display()
    );

    let cfg = args.opts.resolve()?;
    let summary = write_pairs(&aggregation.rows, &cfg, &args.pairs)?;
    println!(
        "Wrote {} pairs to {} in {:?}",
        summary["pairs"],
        args.pairs.out_dir.display(),
        start.elapsed()
    );
    Ok(())
}
