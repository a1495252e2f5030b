//! The reader role: sequential and random-ish access to a chunk's lines.
//!
//! A [`Reader`] never writes. It tracks a byte cursor for incremental
//! [`read_line`](Reader::read_line) calls and the sidecar checksum it last
//! saw, so a follower can poll [`has_changed`](Reader::has_changed) and
//! only reload metadata when the author has persisted something new.
//!
//! Bounded reads ([`head`](Reader::head), [`tail`](Reader::tail)) are
//! capped at the metadata line count, not at the physical file length: a
//! line the author has appended but not yet recorded is invisible to them.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::chunk::Chunk;
use crate::circular::CircularBuffer;
use crate::error::ErrorCode;
use crate::metadata::{MetaData, MetadataError};
use crate::record::{Record, strip_terminator};

/// Errors raised while reading a chunk.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("chunk data file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("error reading {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed line in {} at byte {offset}: {line:?}", path.display())]
    Malformed {
        path: PathBuf,
        offset: u64,
        line: String,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl ReadError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::ChunkFileNotFound,
            Self::Io { .. } | Self::Malformed { .. } => ErrorCode::ChunkReadFailed,
            Self::Metadata(err) => err.code(),
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Read-only view of a chunk.
#[derive(Debug)]
pub struct Reader {
    chunk: Chunk,
    cursor: Option<u64>,
    last_checksum: String,
}

impl Reader {
    /// Wrap a chunk, remembering the current sidecar checksum.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Metadata`] if the sidecar exists but cannot be
    /// hashed.
    pub fn new(chunk: Chunk) -> Result<Self, ReadError> {
        let last_checksum = chunk.metadata().checksum()?;
        Ok(Self {
            chunk,
            cursor: None,
            last_checksum,
        })
    }

    #[must_use]
    pub const fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    #[must_use]
    pub const fn metadata(&self) -> &MetaData {
        self.chunk.metadata()
    }

    /// Byte offset just past the last line returned by
    /// [`read_line`](Self::read_line), or `None` before the first one.
    #[must_use]
    pub const fn position(&self) -> Option<u64> {
        self.cursor
    }

    /// Forget the cursor; the next `read_line` starts at byte 0.
    pub const fn rewind(&mut self) {
        self.cursor = None;
    }

    /// Read the next complete line, without its terminator.
    ///
    /// Returns `None` at end of file. A trailing fragment with no `\n`
    /// (an append still in flight, or a torn write) is also treated as end
    /// of file and the cursor does not move past it, so a later call picks
    /// up the whole line once it is complete.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::NotFound`] if the data file does not exist and
    /// [`ReadError::Io`] on other I/O failures, including invalid UTF-8.
    pub fn read_line(&mut self) -> Result<Option<String>, ReadError> {
        let path = self.chunk.data_file();
        let mut file = self.open_data()?;
        let start = self.cursor.unwrap_or(0);
        if start > 0 {
            file.seek(SeekFrom::Start(start))
                .map_err(|source| ReadError::io(path, source))?;
        }

        let mut buf = Vec::new();
        let read = BufReader::new(file)
            .read_until(b'\n', &mut buf)
            .map_err(|source| ReadError::io(path, source))?;
        if read == 0 || buf.last() != Some(&b'\n') {
            return Ok(None);
        }

        let line = String::from_utf8(buf).map_err(|err| {
            ReadError::io(path, io::Error::new(io::ErrorKind::InvalidData, err))
        })?;
        self.cursor = Some(start + u64::try_from(read).unwrap_or(u64::MAX));
        Ok(Some(strip_terminator(&line).to_string()))
    }

    /// [`read_line`](Self::read_line), parsed into a [`Record`].
    ///
    /// # Errors
    ///
    /// As `read_line`, plus [`ReadError::Malformed`] if the line has no
    /// timestamp prefix. The cursor still moves past a malformed line.
    pub fn read_record(&mut self) -> Result<Option<Record>, ReadError> {
        let offset = self.cursor.unwrap_or(0);
        let Some(line) = self.read_line()? else {
            return Ok(None);
        };
        Record::parse(&line).map(Some).ok_or_else(|| ReadError::Malformed {
            path: self.chunk.data_file().to_path_buf(),
            offset,
            line,
        })
    }

    /// The first `min(n, line_count)` lines.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::NotFound`] if lines are recorded but the data
    /// file is missing, and [`ReadError::Io`] on read failures.
    pub fn head(&self, n: usize) -> Result<Vec<String>, ReadError> {
        let limit = self.recorded_lines().min(n);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut lines = Vec::with_capacity(limit);
        for line in self.lines()?.take(limit) {
            lines.push(line?);
        }
        Ok(lines)
    }

    /// The last `min(n, line_count)` lines, oldest first.
    ///
    /// Streams the recorded lines through a ring buffer of size `n`, so
    /// memory stays bounded by `n` regardless of chunk size.
    ///
    /// # Errors
    ///
    /// Same as [`head`](Self::head).
    pub fn tail(&self, n: usize) -> Result<Vec<String>, ReadError> {
        let recorded = self.recorded_lines();
        let limit = recorded.min(n);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut ring = CircularBuffer::new(limit);
        for line in self.lines()?.take(recorded) {
            ring.push(line?);
        }
        Ok(ring.into_vec())
    }

    /// First recorded line, if any.
    ///
    /// # Errors
    ///
    /// Same as [`head`](Self::head).
    pub fn first_line(&self) -> Result<Option<String>, ReadError> {
        Ok(self.head(1)?.into_iter().next())
    }

    /// Last recorded line, if any.
    ///
    /// # Errors
    ///
    /// Same as [`head`](Self::head).
    pub fn last_line(&self) -> Result<Option<String>, ReadError> {
        Ok(self.tail(1)?.pop())
    }

    /// Check whether the sidecar changed since the last check (or since
    /// construction) and, if so, reload it.
    ///
    /// A deleted sidecar counts as a change and reloads to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Metadata`] if the sidecar cannot be hashed or
    /// the new content is invalid. The previous metadata is kept in that
    /// case and the next call tries again.
    pub fn has_changed(&mut self) -> Result<bool, ReadError> {
        let current = self.chunk.metadata().checksum()?;
        if current == self.last_checksum {
            return Ok(false);
        }

        debug!(chunk = %self.chunk.name(), "metadata changed, reloading");
        self.chunk.metadata_mut().reload()?;
        self.last_checksum = current;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn recorded_lines(&self) -> usize {
        usize::try_from(self.chunk.metadata().line_count()).unwrap_or(usize::MAX)
    }

    fn open_data(&self) -> Result<File, ReadError> {
        let path = self.chunk.data_file();
        File::open(path).map_err(|source| ReadError::io(path, source))
    }

    fn lines(&self) -> Result<impl Iterator<Item = Result<String, ReadError>> + '_, ReadError> {
        let path = self.chunk.data_file();
        let reader = BufReader::new(self.open_data()?);
        Ok(reader
            .lines()
            .map(move |line| line.map_err(|source| ReadError::io(path, source))))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::author::Author;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_chunk(tmp: &TempDir, lines: &[&str]) -> Chunk {
        let chunk = Chunk::open(tmp.path(), "chunk_1").expect("open");
        let mut author = Author::with_clock(chunk, || 1_000);
        for line in lines {
            author.write_line(line).expect("write");
        }
        drop(author);
        Chunk::open(tmp.path(), "chunk_1").expect("reopen")
    }

    #[test]
    fn read_line_walks_the_file() {
        let tmp = TempDir::new().expect("tempdir");
        let mut reader = Reader::new(write_chunk(&tmp, &["a", "b"])).expect("reader");

        assert_eq!(reader.position(), None);
        assert_eq!(reader.read_line().expect("1").as_deref(), Some("1000,a"));
        assert_eq!(reader.position(), Some(7));
        assert_eq!(reader.read_line().expect("2").as_deref(), Some("1000,b"));
        assert_eq!(reader.read_line().expect("eof"), None);
        assert_eq!(reader.read_line().expect("still eof"), None);
        assert_eq!(reader.position(), Some(14));

        reader.rewind();
        assert_eq!(reader.read_line().expect("again").as_deref(), Some("1000,a"));
    }

    #[test]
    fn read_line_picks_up_new_appends() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = write_chunk(&tmp, &["a"]);
        let mut reader = Reader::new(chunk.clone()).expect("reader");
        assert_eq!(reader.read_line().expect("a").as_deref(), Some("1000,a"));
        assert_eq!(reader.read_line().expect("eof"), None);

        let mut author = Author::with_clock(chunk, || 2_000);
        author.write_line("b").expect("write");
        assert_eq!(reader.read_line().expect("b").as_deref(), Some("2000,b"));
    }

    #[test]
    fn trailing_fragment_is_not_returned_until_complete() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = write_chunk(&tmp, &["a"]);
        let data_file = chunk.data_file().to_path_buf();
        let mut reader = Reader::new(chunk).expect("reader");
        reader.read_line().expect("a");

        let mut file = OpenOptions::new().append(true).open(&data_file).expect("open");
        file.write_all(b"2000,par").expect("fragment");
        assert_eq!(reader.read_line().expect("fragment"), None);
        assert_eq!(reader.position(), Some(7));

        file.write_all(b"tial\n").expect("rest");
        assert_eq!(reader.read_line().expect("line").as_deref(), Some("2000,partial"));
    }

    #[test]
    fn read_line_on_missing_file_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = Chunk::open(tmp.path(), "nothing").expect("open");
        let mut reader = Reader::new(chunk).expect("reader");

        let err = reader.read_line().expect_err("missing");
        assert!(matches!(err, ReadError::NotFound { .. }));
        assert_eq!(err.code(), ErrorCode::ChunkFileNotFound);
    }

    #[test]
    fn read_record_parses_and_reports_malformed() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = write_chunk(&tmp, &["x,y"]);
        let data_file = chunk.data_file().to_path_buf();
        let mut reader = Reader::new(chunk).expect("reader");

        let record = reader.read_record().expect("read").expect("record");
        assert_eq!(record.timestamp_ms, 1_000);
        assert_eq!(record.payload, "x,y");

        let mut file = OpenOptions::new().append(true).open(&data_file).expect("open");
        file.write_all(b"garbage\n").expect("garbage");
        let err = reader.read_record().expect_err("malformed");
        assert!(matches!(err, ReadError::Malformed { offset: 9, .. }));
        assert_eq!(reader.read_record().expect("eof"), None);
    }

    #[test]
    fn head_and_tail_are_capped_by_line_count() {
        let tmp = TempDir::new().expect("tempdir");
        let reader = Reader::new(write_chunk(&tmp, &["a", "b", "c"])).expect("reader");

        assert_eq!(reader.head(2).expect("head"), vec!["1000,a", "1000,b"]);
        assert_eq!(reader.head(10).expect("head").len(), 3);
        assert_eq!(reader.tail(2).expect("tail"), vec!["1000,b", "1000,c"]);
        assert_eq!(reader.tail(10).expect("tail").len(), 3);
        assert!(reader.head(0).expect("zero").is_empty());
        assert!(reader.tail(0).expect("zero").is_empty());
    }

    #[test]
    fn unrecorded_lines_are_invisible_to_bounded_reads() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = write_chunk(&tmp, &["a", "b"]);
        let data_file = chunk.data_file().to_path_buf();
        let reader = Reader::new(chunk).expect("reader");

        let mut file = OpenOptions::new().append(true).open(&data_file).expect("open");
        file.write_all(b"3000,unrecorded\n").expect("append");

        assert_eq!(reader.tail(5).expect("tail"), vec!["1000,a", "1000,b"]);
        assert_eq!(reader.last_line().expect("last").as_deref(), Some("1000,b"));
    }

    #[test]
    fn first_and_last_line() {
        let tmp = TempDir::new().expect("tempdir");
        let reader = Reader::new(write_chunk(&tmp, &["a", "b", "c"])).expect("reader");
        assert_eq!(reader.first_line().expect("first").as_deref(), Some("1000,a"));
        assert_eq!(reader.last_line().expect("last").as_deref(), Some("1000,c"));
    }

    #[test]
    fn empty_chunk_has_no_lines() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = Chunk::open(tmp.path(), "empty").expect("open");
        let reader = Reader::new(chunk).expect("reader");
        assert!(reader.head(5).expect("head").is_empty());
        assert_eq!(reader.first_line().expect("first"), None);
        assert_eq!(reader.last_line().expect("last"), None);
    }

    #[test]
    fn has_changed_reloads_once_per_update() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = write_chunk(&tmp, &["a"]);
        let mut reader = Reader::new(chunk.clone()).expect("reader");
        assert!(!reader.has_changed().expect("unchanged"));

        let mut author = Author::with_clock(chunk, || 2_000);
        author.write_line("b").expect("write");

        assert!(reader.has_changed().expect("changed"));
        assert_eq!(reader.metadata().line_count(), 2);
        assert_eq!(reader.metadata().time_update(), 2_000);
        assert!(!reader.has_changed().expect("settled"));
    }

    #[test]
    fn has_changed_leaves_local_edits_until_the_sidecar_moves() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = write_chunk(&tmp, &["a"]);
        let mut writer = chunk.clone();
        let mut reader = Reader::new(chunk).expect("reader");

        reader.chunk.metadata_mut().set_line_count(99);
        assert!(!reader.has_changed().expect("first poll"));
        assert!(!reader.has_changed().expect("second poll"));
        assert_eq!(reader.metadata().line_count(), 99, "unchanged sidecar must not reload");

        writer.metadata_mut().add("source.host", "alpha").expect("add");
        writer.metadata().write_to_disk().expect("write");

        assert!(reader.has_changed().expect("changed"));
        assert_eq!(reader.metadata().line_count(), 1);
        assert_eq!(
            reader.metadata().get("source.host").expect("key").as_str(),
            Some("alpha")
        );
        assert!(!reader.has_changed().expect("settled"));
    }

    #[test]
    fn deleted_sidecar_counts_as_change() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = write_chunk(&tmp, &["a"]);
        let metadata_file = chunk.metadata_file().to_path_buf();
        let mut reader = Reader::new(chunk).expect("reader");

        fs::remove_file(&metadata_file).expect("remove");
        assert!(reader.has_changed().expect("changed"));
        assert_eq!(reader.metadata().line_count(), 0);
    }

    #[test]
    fn invalid_update_keeps_previous_metadata() {
        let tmp = TempDir::new().expect("tempdir");
        let chunk = write_chunk(&tmp, &["a"]);
        let metadata_file = chunk.metadata_file().to_path_buf();
        let mut reader = Reader::new(chunk).expect("reader");

        fs::write(&metadata_file, "{ not json").expect("corrupt");
        let err = reader.has_changed().expect_err("invalid");
        assert!(matches!(err, ReadError::Metadata(_)));
        assert_eq!(reader.metadata().line_count(), 1);
    }
}
