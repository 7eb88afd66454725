//! Training dataset persistence.
//!
//! Pairs are first written as one pretty JSON array of
//! `{"user": prompt, "<label>": response}` objects, then converted to JSON
//! Lines, and finally relabelled to `{"Prompt": ..., "Completion": ...}`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::model::training_pair::TrainingPair;

/// Key holding the prompt in labelled records.
pub const PROMPT_KEY: &str = "user";
/// Keys used after relabelling.
pub const RELABELED_PROMPT_KEY: &str = "Prompt";
pub const RELABELED_COMPLETION_KEY: &str = "Completion";

/// `{"user": prompt, "<target>": response}` view of a pair, key order preserved.
pub struct LabeledRecord<'a>(pub &'a TrainingPair);

impl Serialize for LabeledRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(PROMPT_KEY, &self.0.prompt)?;
        map.serialize_entry(&self.0.target, &self.0.response)?;
        map.end()
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Write pairs as a 4-space indented JSON array of labelled records.
pub fn save_pairs_json(pairs: &[TrainingPair], path: &Path) -> Result<()> {
    let records: Vec<LabeledRecord<'_>> = pairs.iter().map(LabeledRecord).collect();
    let mut out = create(path)?;
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    records
        .serialize(&mut ser)
        .with_context(|| format!("writing {}", path.display()))?;
    out.flush()?;
    Ok(())
}

/// Convert a JSON array file into JSON Lines. Returns the number of records.
pub fn json_to_jsonl(input: &Path, output: &Path) -> Result<usize> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let items: Vec<Value> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a JSON array", input.display()))?;

    let mut out = create(output)?;
    for item in &items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(items.len())
}

/// Rename `user` -> `Prompt` and `label` -> `Completion` in every line.
///
/// Missing keys become `null`. Blank lines are skipped. Returns the number of
/// records written.
pub fn relabel_jsonl(input: &Path, output: &Path, label: &str) -> Result<usize> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let mut out = create(output)?;
    let mut written = 0usize;
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut record: Map<String, Value> = serde_json::from_str(line)
            .with_context(|| format!("line {} of {}", i + 1, input.display()))?;
        let prompt = record.remove(PROMPT_KEY).unwrap_or(Value::Null);
        let completion = record.remove(label).unwrap_or(Value::Null);
        record.insert(RELABELED_PROMPT_KEY.to_string(), prompt);
        record.insert(RELABELED_COMPLETION_KEY.to_string(), completion);
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pair(prompt: &str, response: &str) -> TrainingPair {
        TrainingPair {
            prompt: prompt.to_string(),
            response: response.to_string(),
            target: "Alex".to_string(),
        }
    }

    #[test]
    fn labeled_record_keeps_user_first() {
        let p = pair("hi 😂", "yo");
        let s = serde_json::to_string(&LabeledRecord(&p)).unwrap();
        assert_eq!(s, r#"{"user":"hi 😂","Alex":"yo"}"#);
    }

    #[test]
    fn json_jsonl_and_relabel_chain() {
        let tmp = TempDir::new().unwrap();
        let json = tmp.path().join("out/final_dataset.json");
        let jsonl = tmp.path().join("out/final_dataset.jsonl");
        let relabeled = tmp.path().join("out/final_dataset2.jsonl");

        let pairs = vec![pair("q1", "a1"), pair("line\nbreak", "a2")];
        save_pairs_json(&pairs, &json).unwrap();
        let pretty = fs::read_to_string(&json).unwrap();
        assert!(pretty.starts_with("[\n    {\n        \"user\": \"q1\","));

        assert_eq!(json_to_jsonl(&json, &jsonl).unwrap(), 2);
        let lines: Vec<String> = fs::read_to_string(&jsonl)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines[0], r#"{"user":"q1","Alex":"a1"}"#);
        assert_eq!(lines[1], r#"{"user":"line\nbreak","Alex":"a2"}"#);

        assert_eq!(relabel_jsonl(&jsonl, &relabeled, "Alex").unwrap(), 2);
        let first: Value = serde_json::from_str(
            fs::read_to_string(&relabeled).unwrap().lines().next().unwrap(),
        )
        .unwrap();
        assert_eq!(first["Prompt"], "q1");
        assert_eq!(first["Completion"], "a1");
        assert!(first.get("user").is_none());
        assert!(first.get("Alex").is_none());
    }

    #[test]
    fn relabel_with_unknown_label_yields_null_completion() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.jsonl");
        let output = tmp.path().join("out.jsonl");
        fs::write(&input, "{\"user\":\"q\",\"Sam\":\"a\"}\n\n").unwrap();
        assert_eq!(relabel_jsonl(&input, &output, "Alex").unwrap(), 1);
        let v: Value = serde_json::from_str(fs::read_to_string(&output).unwrap().trim()).unwrap();
        assert_eq!(v["Prompt"], "q");
        assert!(v["Completion"].is_null());
        assert_eq!(v["Sam"], "a");
    }
}
