//! `chunky archive`: zip a chunk's data file and sidecar, then remove them.

use std::io::Write;

use clap::Args;
use serde::Serialize;

use crate::cmd::{GroupContext, report};
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Chunk name.
    pub chunk: String,
}

#[derive(Debug, Serialize)]
pub struct ArchiveReport {
    pub chunk: String,
    pub archive: String,
    pub members: Vec<String>,
}

pub fn run_archive(args: &ArchiveArgs, ctx: &GroupContext) -> anyhow::Result<()> {
    let chunk = ctx.open_chunk(&args.chunk)?;
    let members = chunk
        .managed_files()
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    let archive = chunk.archive().map_err(|err| report(ctx.output, err))?;

    let summary = ArchiveReport {
        chunk: args.chunk.clone(),
        archive: archive.display().to_string(),
        members,
    };
    render_mode(
        ctx.output,
        &summary,
        |s, w| writeln!(w, "{}", s.archive),
        |s, w| {
            pretty_section(w, &format!("Archived {}", s.chunk))?;
            pretty_kv(w, "archive", &s.archive)?;
            pretty_kv(w, "members", s.members.join(", "))
        },
    )
}
