//! Concurrency tests for the lift binary.
//!
//! These tests verify that multiple processes can safely:
//! - Append to the workout log simultaneously (file locking)
//! - Read the log while other processes write it

use assert_cmd::Command;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("lift"));
    cmd.env("XDG_CONFIG_HOME", data_dir.join("config"))
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn log_session(data_dir: PathBuf) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        cli(&data_dir)
            .args(["start", "core_blast", "--auto-complete"])
            .assert()
            .success();
    })
}

#[test]
fn test_concurrent_session_logging() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let handles: Vec<_> = (0..5).map(|_| log_session(data_dir.clone())).collect();
    for handle in handles {
        handle.join().expect("session thread panicked");
    }

    let content = std::fs::read_to_string(data_dir.join("log/workouts.jsonl"))
        .expect("Failed to read log");
    let ids: HashSet<String> = content
        .lines()
        .map(|line| {
            let value: serde_json::Value =
                serde_json::from_str(line).expect("every line is a whole record");
            value["id"].as_str().unwrap().to_string()
        })
        .collect();

    assert_eq!(ids.len(), 5, "Expected 5 distinct sessions, got {}", ids.len());
    assert_eq!(content.lines().count(), 5);
}

#[test]
fn test_concurrent_reads_and_writes() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    log_session(data_dir.clone()).join().unwrap();

    let writers: Vec<_> = (0..3).map(|_| log_session(data_dir.clone())).collect();
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let data_dir = data_dir.clone();
            thread::spawn(move || {
                cli(&data_dir).arg("stats").assert().success();
                cli(&data_dir).arg("history").assert().success();
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    cli(&data_dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicates::str::contains("Sessions:        4"));
}
