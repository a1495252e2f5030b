//! The `"<epoch_millis>,<payload>"` line format of chunk data files.
//!
//! Payloads are opaque: embedded commas are fine because only the first
//! comma separates the timestamp, but an embedded newline breaks framing and
//! is not escaped.

use std::fmt;

/// One parsed data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp_ms: u64,
    pub payload: String,
}

impl Record {
    /// Parse a line (with or without its terminator).
    ///
    /// Returns `None` if there is no comma or the timestamp is not an
    /// unsigned integer.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = strip_terminator(line);
        let (ts, payload) = line.split_once(',')?;
        let timestamp_ms = ts.parse().ok()?;
        Some(Self {
            timestamp_ms,
            payload: payload.to_string(),
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.timestamp_ms, self.payload)
    }
}

/// Format one line, including the trailing `\n`.
#[must_use]
pub fn format_line(timestamp_ms: u64, payload: &impl fmt::Display) -> String {
    format!("{timestamp_ms},{payload}\n")
}

/// Strip one trailing `\n` or `\r\n`.
#[must_use]
pub fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
