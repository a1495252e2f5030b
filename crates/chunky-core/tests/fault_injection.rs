//! Fault-injection integration tests for the write and read paths.
//!
//! These tests exercise realistic failure modes:
//! - process crash mid-append (torn trailing line)
//! - sidecar replaced by garbage or stripped of required keys
//! - data or sidecar path blocked by a directory
//! - managed files removed behind the chunk's back

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chunky_core::{
    AppendError, Author, Chunk, ChunkError, ErrorCode, MetaData, MetadataError, ReadError, Reader,
};
use tempfile::TempDir;

const BASE_TS_MS: u64 = 1_708_012_200_000;

fn setup_chunk_with_lines(count: usize) -> (TempDir, Chunk) {
    let tmp = TempDir::new().expect("create temp dir");
    let chunk = Chunk::open(tmp.path(), "faulty").expect("open chunk");
    let mut author = Author::with_clock(chunk, || BASE_TS_MS);
    for seq in 0..count {
        author.write_line(format!("line {seq}")).expect("write line");
    }
    drop(author);
    let chunk = Chunk::open(tmp.path(), "faulty").expect("reopen chunk");
    (tmp, chunk)
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open for raw append");
    file.write_all(bytes).expect("raw append");
}

#[test]
fn torn_trailing_line_is_invisible_to_readers() {
    let (_tmp, chunk) = setup_chunk_with_lines(3);
    append_raw(chunk.data_file(), b"1708012200001,half a li");

    let mut reader = Reader::new(chunk).expect("reader");
    let mut lines = Vec::new();
    while let Some(line) = reader.read_line().expect("read") {
        lines.push(line);
    }
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2], format!("{BASE_TS_MS},line 2"));

    assert_eq!(reader.tail(10).expect("tail").len(), 3);
    assert_eq!(
        reader.last_line().expect("last").as_deref(),
        Some(format!("{BASE_TS_MS},line 2").as_str())
    );
}

#[test]
fn garbage_sidecar_fails_to_open() {
    let (tmp, chunk) = setup_chunk_with_lines(1);
    fs::write(chunk.metadata_file(), b"\x00\x01 not json").expect("corrupt sidecar");

    let err = Chunk::open(tmp.path(), "faulty").expect_err("corrupt sidecar");
    assert!(matches!(
        err,
        ChunkError::Metadata(MetadataError::Parse { .. })
    ));
    assert_eq!(err.code(), ErrorCode::MetadataInvalid);
}

#[test]
fn sidecar_missing_required_keys_fails_to_open() {
    let (tmp, chunk) = setup_chunk_with_lines(1);
    fs::write(
        chunk.metadata_file(),
        r#"{"chunk.line.count": {"value": 1, "type": "int"}}"#,
    )
    .expect("truncate sidecar");

    let err = Chunk::open(tmp.path(), "faulty").expect_err("missing keys");
    let keys = match err {
        ChunkError::Metadata(MetadataError::MissingKeys { keys, .. }) => keys,
        other => panic!("expected MissingKeys, got {other}"),
    };
    assert!(keys.iter().any(|key| key == "chunk.checksum.hash"));
    assert!(!keys.iter().any(|key| key == "chunk.line.count"));
}

#[test]
fn sidecar_with_mistyped_required_key_fails_to_open() {
    let (tmp, chunk) = setup_chunk_with_lines(1);
    let mut json: serde_json::Value =
        serde_json::from_slice(&fs::read(chunk.metadata_file()).expect("read")).expect("json");
    json["chunk.line.count"] = serde_json::json!({"value": "many", "type": "str"});
    fs::write(chunk.metadata_file(), json.to_string()).expect("rewrite");

    let err = Chunk::open(tmp.path(), "faulty").expect_err("wrong type");
    assert!(matches!(
        err,
        ChunkError::Metadata(MetadataError::WrongType { .. })
    ));
}

#[test]
fn blocked_data_path_surfaces_append_error() {
    let tmp = TempDir::new().expect("tempdir");
    let chunk = Chunk::open(tmp.path(), "blocked").expect("open");
    fs::create_dir(chunk.data_file()).expect("block data path");

    let mut author = Author::with_clock(chunk, || BASE_TS_MS);
    let err = author.write_line("never lands").expect_err("blocked");
    assert!(matches!(err, AppendError::Append { .. }));
    assert_eq!(err.code(), ErrorCode::ChunkAppendFailed);
    assert_eq!(author.metadata().line_count(), 0);
    assert!(!author.chunk().metadata_file().exists());
}

#[test]
fn blocked_sidecar_keeps_data_ahead_of_metadata() {
    let (tmp, chunk) = setup_chunk_with_lines(2);
    let tmp_sidecar = tmp.path().join("faulty.metadata.json.tmp");
    fs::create_dir(&tmp_sidecar).expect("block sidecar temp path");

    let mut author = Author::with_clock(chunk, || BASE_TS_MS + 1);
    let err = author.write_line("lands without metadata").expect_err("blocked");
    assert!(matches!(
        err,
        AppendError::Metadata(MetadataError::Write { .. })
    ));
    assert_eq!(err.code(), ErrorCode::MetadataWriteFailed);

    let on_disk = MetaData::load(author.chunk().metadata_file()).expect("load");
    assert_eq!(on_disk.line_count(), 2);
    let data = fs::read_to_string(author.chunk().data_file()).expect("data");
    assert_eq!(data.lines().count(), 3);

    // Readers trust the sidecar, so the unrecorded line stays hidden.
    let reader = Reader::new(Chunk::open(tmp.path(), "faulty").expect("open")).expect("reader");
    assert_eq!(reader.tail(10).expect("tail").len(), 2);

    fs::remove_dir(&tmp_sidecar).expect("unblock");
    author.flush().expect("flush after unblock");
    assert_eq!(
        MetaData::load(author.chunk().metadata_file())
            .expect("load")
            .line_count(),
        3
    );
}

#[test]
fn removed_data_file_surfaces_not_found() {
    let (_tmp, chunk) = setup_chunk_with_lines(2);
    fs::remove_file(chunk.data_file()).expect("remove data");

    let reader = Reader::new(chunk).expect("reader");
    let err = reader.head(1).expect_err("missing data");
    assert!(matches!(err, ReadError::NotFound { .. }));
    assert_eq!(err.code(), ErrorCode::ChunkFileNotFound);
}

#[test]
fn delete_with_missing_sidecar_removes_data_then_fails() {
    let (_tmp, chunk) = setup_chunk_with_lines(1);
    fs::remove_file(chunk.metadata_file()).expect("remove sidecar");

    let err = chunk.delete().expect_err("sidecar missing");
    assert_eq!(err.path(), Some(chunk.metadata_file()));
    assert!(!chunk.data_file().exists());
}
