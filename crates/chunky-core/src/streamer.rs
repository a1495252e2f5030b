//! The streamer role: batched appends and metadata annotation.
//!
//! Where [`Author`](crate::author::Author) persists per line (or per
//! `metadata_sync_every` lines), a [`Streamer`] takes a whole batch, stamps
//! every line with one timestamp, appends them in a single write and
//! persists the sidecar once.

use std::fmt::Display;

use tracing::debug;

use crate::author::{AppendError, Clock, SystemClock, append_lines, persist};
use crate::chunk::Chunk;
use crate::metadata::{MetaData, MetaValue};
use crate::record::format_line;

#[derive(Debug)]
pub struct Streamer<C: Clock = SystemClock> {
    chunk: Chunk,
    clock: C,
}

impl Streamer<SystemClock> {
    #[must_use]
    pub const fn new(chunk: Chunk) -> Self {
        Self::with_clock(chunk, SystemClock)
    }
}

impl<C: Clock> Streamer<C> {
    #[must_use]
    pub const fn with_clock(chunk: Chunk, clock: C) -> Self {
        Self { chunk, clock }
    }

    #[must_use]
    pub const fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    #[must_use]
    pub const fn metadata(&self) -> &MetaData {
        self.chunk.metadata()
    }

    /// Append every line of `lines` with one shared timestamp, then persist
    /// metadata once. Returns the number of lines written.
    ///
    /// An empty batch touches nothing on disk.
    ///
    /// # Errors
    ///
    /// Same as [`Author::write_line`](crate::author::Author::write_line).
    pub fn write_batch<I>(&mut self, lines: I) -> Result<usize, AppendError>
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let now = self.clock.now_millis();
        let mut buf = String::new();
        let mut count = 0usize;
        for line in lines {
            buf.push_str(&format_line(now, &line));
            count += 1;
        }
        if count == 0 {
            return Ok(0);
        }

        append_lines(
            &mut self.chunk,
            now,
            &buf,
            u64::try_from(count).unwrap_or(u64::MAX),
        )?;
        persist(&mut self.chunk)?;
        debug!(chunk = %self.chunk.name(), lines = count, "batch written");
        Ok(count)
    }

    /// Set `key` to `value`, adding it if absent, and persist.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Metadata`] if `key` exists with a different
    /// type, the value is a non-finite float, or the sidecar cannot be
    /// written.
    pub fn annotate(&mut self, key: &str, value: impl Into<MetaValue>) -> Result<(), AppendError> {
        let metadata = self.chunk.metadata_mut();
        if metadata.contains(key) {
            metadata.set(key, value)?;
        } else {
            metadata.add(key, value)?;
        }
        metadata.write_to_disk()?;
        Ok(())
    }

    /// Annotate several keys with one persist.
    ///
    /// # Errors
    ///
    /// Same as [`annotate`](Self::annotate). Keys before the failing one
    /// are applied in memory but not persisted.
    pub fn annotate_all<K, V>(
        &mut self,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), AppendError>
    where
        K: AsRef<str>,
        V: Into<MetaValue>,
    {
        let metadata = self.chunk.metadata_mut();
        let mut count = 0usize;
        for (key, value) in entries {
            let key = key.as_ref();
            if metadata.contains(key) {
                metadata.set(key, value)?;
            } else {
                metadata.add(key, value)?;
            }
            count += 1;
        }
        metadata.write_to_disk()?;
        debug!(chunk = %self.chunk.name(), keys = count, "metadata annotated");
        Ok(())
    }
}
