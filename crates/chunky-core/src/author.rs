//! The author role: the single writer that appends lines to a chunk.
//!
//! Every write follows the same order:
//!
//! 1. Append `"<epoch_ms>,<payload>\n"` to the data file (`O_APPEND`,
//!    `write_all`, `flush`; never truncates).
//! 2. Update line count and timestamps in memory.
//! 3. Recompute the data file checksum and persist the sidecar, every
//!    `metadata_sync_every` lines (default: every line).
//!
//! Data always lands before the metadata describing it, so a crash between
//! the two leaves the sidecar under-counting, never overstating.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::checksum::{ChecksumKind, UnknownChecksumKind, checksum_of};
use crate::chunk::Chunk;
use crate::error::ErrorCode;
use crate::metadata::{MetaData, MetadataError};
use crate::record::format_line;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of epoch-millisecond timestamps for appended lines.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

impl<F: Fn() -> u64> Clock for F {
    fn now_millis(&self) -> u64 {
        self()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while appending to a chunk.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("unable to append to {}: {source}", path.display())]
    Append { path: PathBuf, source: io::Error },

    #[error("unable to checksum {}: {source}", path.display())]
    Checksum { path: PathBuf, source: io::Error },

    #[error(transparent)]
    UnknownChecksum(#[from] UnknownChecksumKind),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl AppendError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Append { .. } | Self::Checksum { .. } => ErrorCode::ChunkAppendFailed,
            Self::UnknownChecksum(_) => ErrorCode::UnknownChecksumType,
            Self::Metadata(err) => err.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Author
// ---------------------------------------------------------------------------

/// Appends lines to a chunk and keeps its metadata current.
///
/// Dropping an author with unflushed lines attempts a final flush; a failure
/// there can only be logged, so call [`flush`](Self::flush) explicitly when
/// batching.
#[derive(Debug)]
pub struct Author<C: Clock = SystemClock> {
    chunk: Chunk,
    clock: C,
    pending: u32,
}

impl Author<SystemClock> {
    #[must_use]
    pub const fn new(chunk: Chunk) -> Self {
        Self::with_clock(chunk, SystemClock)
    }
}

impl<C: Clock> Author<C> {
    #[must_use]
    pub const fn with_clock(chunk: Chunk, clock: C) -> Self {
        Self {
            chunk,
            clock,
            pending: 0,
        }
    }

    #[must_use]
    pub const fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    #[must_use]
    pub const fn metadata(&self) -> &MetaData {
        self.chunk.metadata()
    }

    /// Mutable metadata, for extension keys. Persisted on the next
    /// [`flush`](Self::flush) or synced write.
    pub const fn metadata_mut(&mut self) -> &mut MetaData {
        self.chunk.metadata_mut()
    }

    /// Lines appended since the sidecar was last persisted.
    #[must_use]
    pub const fn pending(&self) -> u32 {
        self.pending
    }

    /// Append one line and update metadata. Returns the line's timestamp.
    ///
    /// The payload is written verbatim; an embedded newline breaks line
    /// framing.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Append`] if the data file cannot be written,
    /// and checksum or metadata errors from the flush that follows.
    pub fn write_line(&mut self, data: impl Display) -> Result<u64, AppendError> {
        let now = self.clock.now_millis();
        let line = format_line(now, &data);

        append_lines(&mut self.chunk, now, &line, 1)?;
        self.pending = self.pending.saturating_add(1);

        if self.pending >= self.chunk.config().metadata_sync_every.max(1) {
            self.flush()?;
        }
        Ok(now)
    }

    /// Checksum the data file and persist the sidecar now.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::UnknownChecksum`] if `chunk.checksum.type`
    /// names an unsupported digest, [`AppendError::Checksum`] if the data
    /// file cannot be hashed, and metadata write errors.
    pub fn flush(&mut self) -> Result<(), AppendError> {
        persist(&mut self.chunk)?;
        self.pending = 0;
        Ok(())
    }
}

impl<C: Clock> Drop for Author<C> {
    fn drop(&mut self) {
        if self.pending == 0 {
            return;
        }
        if let Err(err) = self.flush() {
            warn!(
                chunk = %self.chunk.name(),
                pending = self.pending,
                error = %err,
                "failed to flush chunk metadata on drop"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Shared write path
// ---------------------------------------------------------------------------

/// Append `bytes` holding `lines` complete lines stamped `now`, and update
/// the in-memory metadata. Does not persist.
pub(crate) fn append_lines(
    chunk: &mut Chunk,
    now: u64,
    bytes: &str,
    lines: u64,
) -> Result<(), AppendError> {
    let first_write = chunk.metadata().line_count() == 0;
    if first_write {
        chunk
            .ensure_group_dir()
            .map_err(|source| AppendError::Append {
                path: chunk.group_path().to_path_buf(),
                source,
            })?;
    }

    append_to(chunk.data_file(), bytes)?;

    let now = i64::try_from(now).unwrap_or(i64::MAX);
    let file_name = chunk
        .data_file()
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_default();
    let metadata = chunk.metadata_mut();
    if first_write {
        metadata.set_time_create(now);
        metadata.set_chunk_file(file_name);
    }
    metadata.set_line_count(metadata.line_count().saturating_add(lines));
    metadata.set_time_update(now);
    Ok(())
}

/// Recompute the data checksum and write the sidecar.
pub(crate) fn persist(chunk: &mut Chunk) -> Result<(), AppendError> {
    let kind: ChecksumKind = chunk.metadata().checksum_type().parse()?;
    let data_file = chunk.data_file().to_path_buf();
    let hash = match checksum_of(&data_file, kind) {
        Ok(hash) => hash,
        // No lines yet: nothing to hash.
        Err(err) if err.kind() == io::ErrorKind::NotFound && chunk.metadata().line_count() == 0 => {
            String::new()
        }
        Err(source) => {
            return Err(AppendError::Checksum {
                path: data_file,
                source,
            });
        }
    };

    let metadata = chunk.metadata_mut();
    metadata.set_checksum_hash(hash);
    metadata.write_to_disk()?;
    debug!(
        chunk = %chunk.name(),
        lines = chunk.metadata().line_count(),
        "chunk metadata persisted"
    );
    Ok(())
}

fn append_to(path: &Path, bytes: &str) -> Result<(), AppendError> {
    let append_err = |source| AppendError::Append {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(append_err)?;
    file.write_all(bytes.as_bytes()).map_err(append_err)?;
    file.flush().map_err(append_err)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
