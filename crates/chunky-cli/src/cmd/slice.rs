//! `chunky head` / `chunky tail`: the first or last lines of a chunk.
//!
//! Both are capped at the line count recorded in the sidecar.

use std::io::Write;

use chunky_core::{ReadError, Reader};
use clap::Args;
use serde::Serialize;

use crate::cmd::read::LineView;
use crate::cmd::{GroupContext, report};
use crate::output::{millis_to_local_datetime, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SliceArgs {
    /// Chunk name.
    pub chunk: String,

    /// Number of lines to show.
    #[arg(short = 'n', long = "lines", default_value_t = 10)]
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SliceReport {
    pub chunk: String,
    pub line_count: u64,
    #[serde(skip)]
    pub raw: Vec<String>,
    pub lines: Vec<LineView>,
}

#[derive(Debug, Clone, Copy)]
enum End {
    Head,
    Tail,
}

pub fn run_head(args: &SliceArgs, ctx: &GroupContext) -> anyhow::Result<()> {
    run_slice(args, ctx, End::Head)
}

pub fn run_tail(args: &SliceArgs, ctx: &GroupContext) -> anyhow::Result<()> {
    run_slice(args, ctx, End::Tail)
}

fn run_slice(args: &SliceArgs, ctx: &GroupContext, end: End) -> anyhow::Result<()> {
    let chunk = ctx.open_chunk(&args.chunk)?;
    let reader = Reader::new(chunk).map_err(|err| report(ctx.output, err))?;
    let lines: Result<Vec<String>, ReadError> = match end {
        End::Head => reader.head(args.count),
        End::Tail => reader.tail(args.count),
    };
    let raw = lines.map_err(|err| report(ctx.output, err))?;

    let slice = SliceReport {
        chunk: args.chunk.clone(),
        line_count: reader.metadata().line_count(),
        lines: raw.iter().map(|line| LineView::from_line(line)).collect(),
        raw,
    };

    render_mode(
        ctx.output,
        &slice,
        |s, w| {
            for line in &s.raw {
                writeln!(w, "{line}")?;
            }
            Ok(())
        },
        |s, w| {
            let label = match end {
                End::Head => "first",
                End::Tail => "last",
            };
            pretty_section(
                w,
                &format!(
                    "{} ({label} {} of {} lines)",
                    s.chunk,
                    s.lines.len(),
                    s.line_count
                ),
            )?;
            for line in &s.lines {
                match line.timestamp_ms {
                    Some(ms) => writeln!(
                        w,
                        "{}  {}",
                        millis_to_local_datetime(i64::try_from(ms).unwrap_or(i64::MAX)),
                        line.payload
                    )?,
                    None => writeln!(w, "{}", line.payload)?,
                }
            }
            Ok(())
        },
    )
}
