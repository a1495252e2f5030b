//! `chunky write`: append lines to a chunk.
//!
//! Lines come from the command line, or from stdin (one per line) when none
//! are given. Without `--batch` every line gets its own timestamp and the
//! sidecar follows the group's `metadata_sync_every`; with `--batch` all
//! lines share one timestamp and the sidecar is persisted once.

use std::io::{self, BufRead, Write};

use chunky_core::{Author, Streamer};
use clap::Args;
use serde::Serialize;
use tracing::debug;

use crate::cmd::{GroupContext, report};
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Chunk name (files are `<group>/<chunk>.<ext>`).
    pub chunk: String,

    /// Lines to append. Reads stdin when omitted.
    pub lines: Vec<String>,

    /// Stamp all lines with one timestamp and persist metadata once.
    #[arg(long)]
    pub batch: bool,
}

#[derive(Debug, Serialize)]
pub struct WriteReport {
    pub chunk: String,
    pub written: usize,
    pub line_count: u64,
    pub checksum_type: String,
    pub checksum_hash: String,
}

pub fn run_write(args: &WriteArgs, ctx: &GroupContext) -> anyhow::Result<()> {
    let chunk = ctx.open_chunk(&args.chunk)?;
    let lines = if args.lines.is_empty() {
        read_stdin_lines()?
    } else {
        args.lines.clone()
    };
    debug!(chunk = %args.chunk, lines = lines.len(), batch = args.batch, "writing");

    let (written, metadata) = if args.batch {
        let mut streamer = Streamer::new(chunk);
        let written = streamer
            .write_batch(&lines)
            .map_err(|err| report(ctx.output, err))?;
        (written, streamer.metadata().clone())
    } else {
        let mut author = Author::new(chunk);
        for line in &lines {
            author
                .write_line(line)
                .map_err(|err| report(ctx.output, err))?;
        }
        if author.pending() > 0 {
            author.flush().map_err(|err| report(ctx.output, err))?;
        }
        (lines.len(), author.metadata().clone())
    };

    let summary = WriteReport {
        chunk: args.chunk.clone(),
        written,
        line_count: metadata.line_count(),
        checksum_type: metadata.checksum_type().to_string(),
        checksum_hash: metadata.checksum_hash().to_string(),
    };

    render_mode(
        ctx.output,
        &summary,
        |r, w| {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                r.chunk, r.written, r.line_count, r.checksum_hash
            )
        },
        |r, w| {
            pretty_section(w, &format!("Wrote {} line(s) to {}", r.written, r.chunk))?;
            pretty_kv(w, "lines", r.line_count.to_string())?;
            pretty_kv(w, r.checksum_type.as_str(), &r.checksum_hash)
        },
    )
}

fn read_stdin_lines() -> anyhow::Result<Vec<String>> {
    let stdin = io::stdin();
    let mut lines = Vec::new();
    for line in stdin.lock().lines() {
        lines.push(line?);
    }
    Ok(lines)
}
