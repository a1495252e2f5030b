//! `chunky delete`: remove a chunk's data file and sidecar.

use std::io::Write;

use clap::Args;
use serde::Serialize;

use crate::cmd::{GroupContext, report};
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Chunk name.
    pub chunk: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteReport {
    pub chunk: String,
    pub removed: Vec<String>,
}

pub fn run_delete(args: &DeleteArgs, ctx: &GroupContext) -> anyhow::Result<()> {
    let chunk = ctx.open_chunk(&args.chunk)?;
    let removed = chunk
        .managed_files()
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    chunk.delete().map_err(|err| report(ctx.output, err))?;

    let summary = DeleteReport {
        chunk: args.chunk.clone(),
        removed,
    };
    render_mode(
        ctx.output,
        &summary,
        |s, w| {
            for path in &s.removed {
                writeln!(w, "{path}")?;
            }
            Ok(())
        },
        |s, w| {
            pretty_section(w, &format!("Deleted {}", s.chunk))?;
            for path in &s.removed {
                pretty_kv(w, "removed", path)?;
            }
            Ok(())
        },
    )
}
