use anyhow::Result;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn write_folder(root: &Path, folder: &str, body: &str) {
    let dir = root.join(folder);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("message_1.json"), body).unwrap();
}

fn convo_forge() -> Command {
    Command::new(env!("CARGO_BIN_EXE_convo-forge"))
}

/// Integration test: `run` writes the turn table and all three dataset files.
#[test]
fn run_writes_table_and_dataset() -> Result<()> {
    let tmp = TempDir::new()?;
    let inbox = tmp.path().join("inbox");
    write_folder(
        &inbox,
        "casey_1",
        r#"{"messages": [
            {"sender_name": "Jordan Lee", "timestamp_ms": 1000000, "content": "night"},
            {"sender_name": "Jordan Lee", "timestamp_ms": 400000, "content": "see you"},
            {"sender_name": "Casey", "timestamp_ms": 350000, "content": "bye"},
            {"sender_name": "Jordan Lee", "timestamp_ms": 60000, "content": "all good"},
            {"sender_name": "Casey", "timestamp_ms": 0, "content": "how are you"}
        ]}"#,
    );
    write_folder(&inbox, "empty_2", r#"{"messages": []}"#);
    let out = tmp.path().join("out");

    let status = convo_forge()
        .args(["--log-level", "warn", "run", "--sorted", "--workers", "2"])
        .arg("--inbox")
        .arg(&inbox)
        .arg("--out-dir")
        .arg(&out)
        .status()?;
    assert!(status.success());

    let table = fs::read_to_string(out.join("turns.csv"))?;
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 6, "header plus five turns: {table}");
    assert!(lines[1].starts_with("1,casey_1,Casey,0,how are you,false,"));

    let relabeled = fs::read_to_string(out.join("final_dataset2.jsonl"))?;
    assert_eq!(
        relabeled.lines().collect::<Vec<_>>(),
        vec![
            r#"{"Prompt":"how are you","Completion":"all good"}"#,
            r#"{"Prompt":"bye","Completion":"see you"}"#,
        ]
    );
    let labeled = fs::read_to_string(out.join("final_dataset.jsonl"))?;
    assert!(labeled.starts_with(r#"{"user":"how are you","Jordan":"all good"}"#));
    Ok(())
}

/// `pairs` refuses an empty turn table.
#[test]
fn pairs_on_empty_table_fails() -> Result<()> {
    let tmp = TempDir::new()?;
    let table = tmp.path().join("turns.csv");
    fs::write(
        &table,
        "\u{feff}messageId,folderId,sender,timestamp,message,shared,reaction\n",
    )?;

    let output = convo_forge()
        .arg("pairs")
        .arg("--turns")
        .arg(&table)
        .arg("--out-dir")
        .arg(tmp.path().join("out"))
        .output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("turn table is empty"), "stderr: {stderr}");
    Ok(())
}

/// `repair` copies the tree with mojibake decoded.
#[test]
fn repair_rewrites_tree() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("raw");
    write_folder(
        &input,
        "casey_1",
        r#"{"messages": [{"sender_name": "Casey", "timestamp_ms": 0, "content": "cafÃ©"}]}"#,
    );
    let output = tmp.path().join("fixed");

    let status = convo_forge()
        .arg("repair")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .status()?;
    assert!(status.success());

    let fixed = fs::read_to_string(output.join("casey_1/message_1.json"))?;
    assert!(fixed.contains("café"), "{fixed}");
    Ok(())
}
