use std::process::{Command, Output};

use anyhow::Result;
use serde_json::Value as Json;
use tempfile::TempDir;

fn seed(rows: i64) -> Result<(TempDir, String)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("events.db");
    let conn = rusqlite::Connection::open(&path)?;
    conn.execute_batch("CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT);")?;
    for id in 1..=rows {
        let kind = if id % 2 == 0 { "even" } else { "odd" };
        conn.execute(
            "INSERT INTO events (id, kind) VALUES (?1, ?2)",
            rusqlite::params![id, kind],
        )?;
    }
    Ok((dir, path.to_string_lossy().into_owned()))
}

fn sluice(dir: &TempDir, args: &[&str]) -> Result<Output> {
    let config = dir.path().join("absent.yaml");
    Ok(Command::new(env!("CARGO_BIN_EXE_sluice"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()?)
}

fn ids(report: &Json) -> Vec<i64> {
    report["rows"]
        .as_array()
        .map(|rows| rows.iter().filter_map(|row| row[0].as_i64()).collect())
        .unwrap_or_default()
}

#[test]
fn test_native_and_emulated_paging_agree() -> Result<()> {
    let (dir, db) = seed(20)?;
    let base = vec![
        "--output", "json", "query", "--db", db.as_str(), "--sql",
        "SELECT id, kind FROM events WHERE kind = ? ORDER BY id", "--arg", "odd", "--skip", "2",
        "--take", "3",
    ];

    let native = sluice(&dir, &base)?;
    assert!(native.status.success(), "{}", String::from_utf8_lossy(&native.stderr));
    let native: Json = serde_json::from_slice(&native.stdout)?;
    assert_eq!(native["paging"], "native");
    assert_eq!(ids(&native), vec![5, 7, 9]);

    let mut emulated_args = base.clone();
    emulated_args.push("--emulate");
    let emulated = sluice(&dir, &emulated_args)?;
    assert!(emulated.status.success());
    let emulated: Json = serde_json::from_slice(&emulated.stdout)?;
    assert_eq!(emulated["paging"], "emulated");
    assert_eq!(ids(&emulated), vec![5, 7, 9]);
    assert_eq!(emulated["row_count"], 3);
    Ok(())
}

#[test]
fn test_async_driver_returns_rows() -> Result<()> {
    let (dir, db) = seed(5)?;
    let output = sluice(
        &dir,
        &[
            "--output", "json", "query", "--db", db.as_str(), "--sql", "SELECT id FROM events ORDER BY id",
            "--async",
        ],
    )?;
    assert!(output.status.success());
    let report: Json = serde_json::from_slice(&output.stdout)?;
    assert_eq!(ids(&report), vec![1, 2, 3, 4, 5]);
    assert_eq!(report["mapper_mode"], "fast");
    Ok(())
}

#[test]
fn test_human_output_streams_tab_separated_rows() -> Result<()> {
    let (dir, db) = seed(3)?;
    let output = sluice(
        &dir,
        &["query", "--db", db.as_str(), "--sql", "SELECT id, kind FROM events ORDER BY id"],
    )?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["1\todd", "2\teven", "3\todd"]);
    Ok(())
}

#[test]
fn test_missing_database_exits_with_source_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = dir.path().join("missing.db").to_string_lossy().into_owned();
    let output = sluice(
        &dir,
        &[
            "--output", "json", "query", "--db", db.as_str(), "--sql", "SELECT 1",
        ],
    )?;

    assert_eq!(output.status.code(), Some(4));
    let report: Json = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["status"], "error");
    assert_eq!(report["error"]["exit_code"], 4);
    assert_eq!(report["error"]["code"], "SLUICE-1006");
    Ok(())
}

#[test]
fn test_config_command_reports_environment_overrides() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = Command::new(env!("CARGO_BIN_EXE_sluice"))
        .arg("--config")
        .arg(dir.path().join("absent.yaml"))
        .args(["--output", "json", "config"])
        .env("SLUICE__EXECUTION__READER_BUFFER", "32")
        .output()?;

    assert!(output.status.success());
    let report: Json = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["reader_buffer"], 32);
    assert_eq!(report["emulate_take"], false);
    Ok(())
}
