//! `chunky read`: print every line of a chunk, optionally following it.
//!
//! `--follow` keeps polling: after draining the file it sleeps for
//! `--interval-ms`, checks whether the sidecar changed, and drains again
//! when it has. Torn or in-flight trailing lines are never printed early.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use chunky_core::{ReadError, Reader, Record};
use clap::Args;
use serde::Serialize;
use tracing::debug;

use crate::cmd::{GroupContext, report};
use crate::output::{OutputMode, millis_to_local_datetime};

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Chunk name.
    pub chunk: String,

    /// Keep polling for new lines after reaching the end.
    #[arg(short, long)]
    pub follow: bool,

    /// Poll interval in milliseconds while following.
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,

    /// Stop following after this many polls.
    #[arg(long, requires = "follow")]
    pub max_polls: Option<u64>,
}

/// One line in JSON output.
#[derive(Debug, Serialize)]
pub struct LineView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    pub payload: String,
}

impl LineView {
    pub fn from_line(line: &str) -> Self {
        Record::parse(line).map_or_else(
            || Self {
                timestamp_ms: None,
                payload: line.to_string(),
            },
            |record| Self {
                timestamp_ms: Some(record.timestamp_ms),
                payload: record.payload,
            },
        )
    }
}

pub fn run_read(args: &ReadArgs, ctx: &GroupContext) -> anyhow::Result<()> {
    let chunk = ctx.open_chunk(&args.chunk)?;
    let mut reader = Reader::new(chunk).map_err(|err| report(ctx.output, err))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    drain(&mut reader, ctx, &mut out, args.follow)?;
    if !args.follow {
        return Ok(());
    }

    let interval = Duration::from_millis(args.interval_ms);
    let mut polls = 0u64;
    loop {
        if args.max_polls.is_some_and(|max| polls >= max) {
            debug!(polls, "poll limit reached");
            return Ok(());
        }
        thread::sleep(interval);
        polls += 1;

        if reader
            .has_changed()
            .map_err(|err| report(ctx.output, err))?
        {
            drain(&mut reader, ctx, &mut out, true)?;
        }
    }
}

/// Print every complete line past the cursor.
///
/// While following, a data file that does not exist yet only means the
/// author has not written its first line.
fn drain(
    reader: &mut Reader,
    ctx: &GroupContext,
    out: &mut dyn Write,
    following: bool,
) -> anyhow::Result<()> {
    let mut printed = 0usize;
    loop {
        let line = match reader.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(ReadError::NotFound { path }) if following => {
                debug!(path = %path.display(), "no data yet, waiting");
                break;
            }
            Err(err) => return Err(report(ctx.output, err)),
        };
        write_line(ctx.output, &line, out)?;
        printed += 1;
    }
    out.flush()?;
    debug!(printed, position = ?reader.position(), "drained chunk");
    Ok(())
}

fn write_line(mode: OutputMode, line: &str, out: &mut dyn Write) -> io::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut *out, &LineView::from_line(line))?;
            writeln!(out)?;
        }
        OutputMode::Text => writeln!(out, "{line}")?,
        OutputMode::Pretty => match Record::parse(line) {
            Some(record) => writeln!(
                out,
                "{}  {}",
                millis_to_local_datetime(i64::try_from(record.timestamp_ms).unwrap_or(i64::MAX)),
                record.payload
            )?,
            None => writeln!(out, "{line}")?,
        },
    }
    Ok(())
}
