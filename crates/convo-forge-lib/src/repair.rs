//! Mojibake repair for exporter output.
//!
//! Some exporters write UTF-8 text whose bytes were each escaped as a separate
//! code point (`ð\u009f\u0098\u0082` instead of `😂`). Re-reading those
//! code points as bytes and decoding them as UTF-8 recovers the original text.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Recursively repair every string inside `value`.
///
/// Strings containing a code point above U+00FF, or whose bytes are not
/// valid UTF-8, are already correct and are returned unchanged.
pub fn repair_encoding(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(repair_str(s)),
        Value::Array(items) => Value::Array(items.into_iter().map(repair_encoding).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (repair_str(k), repair_encoding(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Repair a single string; see [`repair_encoding`].
pub fn repair_str(s: String) -> String {
    if s.is_ascii() {
        return s;
    }
    let mut bytes = Vec::with_capacity(s.len());
    for c in s.chars() {
        let cp = c as u32;
        if cp > 0xFF {
            return s;
        }
        bytes.push(cp as u8);
    }
    String::from_utf8(bytes).unwrap_or(s)
}

/// Counters for [`repair_tree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    pub converted: usize,
    /// Files skipped because they are not valid JSON.
    pub skipped: usize,
}

/// Repair every `.json` file under `input`, mirroring the tree into `output`.
///
/// Output files are pretty-printed with 4-space indentation and keep
/// non-ASCII text unescaped. Files that fail to parse are logged and skipped.
pub fn repair_tree(input: &Path, output: &Path) -> Result<RepairStats> {
    let mut stats = RepairStats::default();
    walk(input, input, output, &mut stats)?;
    Ok(stats)
}

fn walk(root: &Path, dir: &Path, output: &Path, stats: &mut RepairStats) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, output, stats)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to decode JSON file");
                stats.skipped += 1;
                continue;
            }
        };

        let relative = path.strip_prefix(root).unwrap_or(&path);
        let target = output.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = fs::File::create(&target).with_context(|| format!("creating {}", target.display()))?;
        let mut out = BufWriter::new(file);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        repair_encoding(value).serialize(&mut ser)?;
        out.flush()?;
        stats.converted += 1;
    }
    Ok(())
}
