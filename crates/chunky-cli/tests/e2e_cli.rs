//! E2E CLI tests: write -> read/head/tail -> meta -> delete/archive.
//!
//! Each test runs the `chunky` binary as a subprocess against an isolated
//! temp group directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs::{self, File};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the chunky binary, with `dir` as the group.
fn chunky_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("chunky"));
    cmd.arg("--group").arg(dir);
    // Suppress tracing output that goes to stderr
    cmd.env("CHUNKY_LOG", "error");
    cmd.env_remove("CHUNKY_FORMAT");
    cmd
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = chunky_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("chunky should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

fn write_lines(dir: &Path, chunk: &str, lines: &[&str]) {
    chunky_cmd(dir)
        .args(["write", chunk])
        .args(lines)
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// Write / read
// ---------------------------------------------------------------------------

#[test]
fn write_creates_data_and_sidecar() {
    let tmp = TempDir::new().expect("tempdir");
    let report = run_json(tmp.path(), &["write", "app", "a", "b", "c"]);

    assert_eq!(report["chunk"], "app");
    assert_eq!(report["written"], 3);
    assert_eq!(report["line_count"], 3);
    assert_eq!(report["checksum_type"], "md5");
    assert_eq!(report["checksum_hash"].as_str().map(str::len), Some(32));

    assert!(tmp.path().join("app.chunk").exists());
    let sidecar: Value = serde_json::from_slice(
        &fs::read(tmp.path().join("app.metadata.json")).expect("read sidecar"),
    )
    .expect("sidecar json");
    assert_eq!(sidecar["chunk.line.count"]["value"], 3);
    assert_eq!(sidecar["chunk.line.count"]["type"], "int");
}

#[test]
fn write_reads_stdin_when_no_lines_given() {
    let tmp = TempDir::new().expect("tempdir");
    chunky_cmd(tmp.path())
        .args(["write", "app"])
        .write_stdin("one\ntwo\n")
        .assert()
        .success();

    chunky_cmd(tmp.path())
        .args(["read", "app"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\d+,one\n\d+,two\n$").expect("regex"));
}

#[test]
fn batch_write_shares_one_timestamp() {
    let tmp = TempDir::new().expect("tempdir");
    chunky_cmd(tmp.path())
        .args(["write", "app", "--batch", "x", "y"])
        .assert()
        .success();

    let output = chunky_cmd(tmp.path())
        .args(["read", "app", "--json"])
        .output()
        .expect("read");
    assert!(output.status.success());
    let records: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["timestamp_ms"], records[1]["timestamp_ms"]);
    assert_eq!(records[1]["payload"], "y");
}

#[test]
fn head_and_tail_are_capped() {
    let tmp = TempDir::new().expect("tempdir");
    write_lines(tmp.path(), "app", &["a", "b", "c"]);

    let head = run_json(tmp.path(), &["head", "app", "-n", "2"]);
    let payloads: Vec<&str> = head["lines"]
        .as_array()
        .expect("lines")
        .iter()
        .filter_map(|line| line["payload"].as_str())
        .collect();
    assert_eq!(payloads, vec!["a", "b"]);

    let tail = run_json(tmp.path(), &["tail", "app", "-n", "10"]);
    assert_eq!(tail["line_count"], 3);
    assert_eq!(tail["lines"].as_array().map(Vec::len), Some(3));

    chunky_cmd(tmp.path())
        .args(["tail", "app", "-n", "1"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with(",c\n"));
}

#[test]
fn follow_exits_after_poll_limit() {
    let tmp = TempDir::new().expect("tempdir");
    write_lines(tmp.path(), "app", &["first"]);

    chunky_cmd(tmp.path())
        .args([
            "read",
            "app",
            "--follow",
            "--interval-ms",
            "10",
            "--max-polls",
            "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(",first"));
}

#[test]
fn read_missing_chunk_reports_not_found() {
    let tmp = TempDir::new().expect("tempdir");
    chunky_cmd(tmp.path())
        .args(["read", "ghost"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error[E3001]"))
        .stderr(predicate::str::contains("Error:").not());
}

#[test]
fn failures_are_rendered_once() {
    let tmp = TempDir::new().expect("tempdir");
    let output = chunky_cmd(tmp.path())
        .args(["read", "ghost", "--json"])
        .output()
        .expect("read");
    assert_eq!(output.status.code(), Some(1));
    let rendered: Value = serde_json::from_slice(&output.stderr).expect("one JSON error on stderr");
    assert_eq!(rendered["error"]["error_code"], "E3001");
}

#[test]
fn follow_waits_for_a_chunk_that_does_not_exist_yet() {
    let tmp = TempDir::new().expect("tempdir");
    chunky_cmd(tmp.path())
        .args(["read", "late", "--follow", "--interval-ms", "10", "--max-polls", "2"])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn follow_prints_lines_written_after_it_started() {
    let tmp = TempDir::new().expect("tempdir");
    let dir = tmp.path().to_path_buf();
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        write_lines(&dir, "late", &["hello"]);
    });

    chunky_cmd(tmp.path())
        .args(["read", "late", "--follow", "--interval-ms", "20", "--max-polls", "150"])
        .assert()
        .success()
        .stdout(predicate::str::contains(",hello\n"));
    writer.join().expect("writer thread");
}

#[test]
fn invalid_chunk_name_is_rejected() {
    let tmp = TempDir::new().expect("tempdir");
    chunky_cmd(tmp.path())
        .args(["write", "../escape", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid_chunk_name"));
    assert!(!tmp.path().join("../escape.chunk").exists());
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[test]
fn meta_add_set_get_round_trip() {
    let tmp = TempDir::new().expect("tempdir");
    write_lines(tmp.path(), "app", &["a"]);

    let added = run_json(
        tmp.path(),
        &["meta", "add", "app", "source.rate", "0.5", "--type", "float"],
    );
    assert_eq!(added["type"], "float");
    assert_eq!(added["value"], 0.5);

    let set = run_json(tmp.path(), &["meta", "set", "app", "source.rate", "0.25"]);
    assert_eq!(set["value"], 0.25);

    chunky_cmd(tmp.path())
        .args(["meta", "get", "app", "chunk.line.count"])
        .assert()
        .success()
        .stdout("1\n");

    let shown = run_json(tmp.path(), &["meta", "show", "app"]);
    assert_eq!(shown["entries"]["source.rate"]["value"], 0.25);
    assert_eq!(shown["entries"]["chunk.checksum.type"]["value"], "md5");
}

#[test]
fn meta_rejects_bad_values() {
    let tmp = TempDir::new().expect("tempdir");
    write_lines(tmp.path(), "app", &["a"]);

    chunky_cmd(tmp.path())
        .args(["meta", "add", "app", "k", "not-a-number", "--type", "int"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1002"));

    chunky_cmd(tmp.path())
        .args(["meta", "add", "app", "k", "1", "--type", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown value type"));

    chunky_cmd(tmp.path())
        .args(["meta", "get", "app", "missing.key"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1003"));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn delete_twice_fails_the_second_time() {
    let tmp = TempDir::new().expect("tempdir");
    write_lines(tmp.path(), "app", &["a"]);

    let report = run_json(tmp.path(), &["delete", "app"]);
    assert_eq!(report["removed"].as_array().map(Vec::len), Some(2));
    assert!(!tmp.path().join("app.chunk").exists());
    assert!(!tmp.path().join("app.metadata.json").exists());

    chunky_cmd(tmp.path())
        .args(["delete", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2001"));
}

#[test]
fn archive_produces_zip_with_both_members() {
    let tmp = TempDir::new().expect("tempdir");
    write_lines(tmp.path(), "app", &["a", "b"]);

    let report = run_json(tmp.path(), &["archive", "app"]);
    assert_eq!(report["members"], serde_json::json!(["app.chunk", "app.metadata.json"]));

    let archive = tmp.path().join("app.zip");
    let zip = zip::ZipArchive::new(File::open(&archive).expect("open zip")).expect("zip");
    assert_eq!(zip.len(), 2);
    assert!(!tmp.path().join("app.chunk").exists());
    assert!(!tmp.path().join("app.metadata.json").exists());
}

#[test]
fn group_config_changes_extensions() {
    let tmp = TempDir::new().expect("tempdir");
    fs::write(
        tmp.path().join("chunky.toml"),
        "data_extension = \"log\"\nchecksum = \"sha256\"\n",
    )
    .expect("config");

    let report = run_json(tmp.path(), &["write", "app", "x"]);
    assert_eq!(report["checksum_type"], "sha256");
    assert!(tmp.path().join("app.log").exists());
}

#[test]
fn missing_explicit_config_fails() {
    let tmp = TempDir::new().expect("tempdir");
    chunky_cmd(tmp.path())
        .args(["--config", "/nonexistent/chunky.toml", "head", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}
