//! `chunky meta`: inspect and edit a chunk's metadata sidecar.

use std::collections::BTreeMap;
use std::io::Write;

use chunky_core::{MetaData, MetadataError};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::{GroupContext, report};
use crate::output::{millis_to_local_datetime, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct MetaArgs {
    #[command(subcommand)]
    pub command: MetaCommand,
}

#[derive(Subcommand, Debug)]
pub enum MetaCommand {
    /// Show every entry.
    Show {
        /// Chunk name.
        chunk: String,
    },
    /// Print one value.
    Get {
        /// Chunk name.
        chunk: String,
        /// Metadata key, e.g. `chunk.line.count`.
        key: String,
    },
    /// Replace an existing value, keeping its type.
    Set {
        /// Chunk name.
        chunk: String,
        key: String,
        value: String,
    },
    /// Add a new typed entry.
    Add {
        /// Chunk name.
        chunk: String,
        key: String,
        value: String,
        /// One of str, int, float, bool, path.
        #[arg(short = 't', long = "type", default_value = "str")]
        kind: String,
    },
}

/// One entry as shown in JSON output, mirroring the sidecar layout.
#[derive(Debug, Serialize)]
pub struct EntryView {
    pub value: Value,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct MetaReport {
    pub chunk: String,
    pub file: String,
    pub entries: BTreeMap<String, EntryView>,
}

impl MetaReport {
    fn from_metadata(chunk: &str, metadata: &MetaData) -> Self {
        Self {
            chunk: chunk.to_string(),
            file: metadata.file().display().to_string(),
            entries: metadata
                .iter()
                .map(|(key, value)| {
                    (
                        key.to_string(),
                        EntryView {
                            value: value.to_json(),
                            kind: value.meta_type().to_string(),
                        },
                    )
                })
                .collect(),
        }
    }
}

pub fn run_meta(args: &MetaArgs, ctx: &GroupContext) -> anyhow::Result<()> {
    match &args.command {
        MetaCommand::Show { chunk } => run_show(chunk, ctx),
        MetaCommand::Get { chunk, key } => run_get(chunk, key, ctx),
        MetaCommand::Set { chunk, key, value } => run_set(chunk, key, value, ctx),
        MetaCommand::Add {
            chunk,
            key,
            value,
            kind,
        } => run_add(chunk, key, value, kind, ctx),
    }
}

fn run_show(name: &str, ctx: &GroupContext) -> anyhow::Result<()> {
    let chunk = ctx.open_chunk(name)?;
    let view = MetaReport::from_metadata(name, chunk.metadata());
    let time_create = chunk.metadata().time_create();
    let time_update = chunk.metadata().time_update();

    render_mode(
        ctx.output,
        &view,
        |v, w| {
            for (key, entry) in &v.entries {
                writeln!(w, "{key}\t{}\t{}", entry.kind, display_value(&entry.value))?;
            }
            Ok(())
        },
        |v, w| {
            pretty_section(w, &format!("{} ({})", v.chunk, v.file))?;
            for (key, entry) in &v.entries {
                pretty_kv(w, key, format!("{} [{}]", display_value(&entry.value), entry.kind))?;
            }
            writeln!(w)?;
            pretty_kv(w, "created", millis_to_local_datetime(time_create))?;
            pretty_kv(w, "updated", millis_to_local_datetime(time_update))
        },
    )
}

fn run_get(name: &str, key: &str, ctx: &GroupContext) -> anyhow::Result<()> {
    let chunk = ctx.open_chunk(name)?;
    let value = chunk
        .metadata()
        .get(key)
        .map_err(|err| report(ctx.output, err))?;
    let entry = EntryView {
        value: value.to_json(),
        kind: value.meta_type().to_string(),
    };

    render_mode(
        ctx.output,
        &entry,
        |e, w| writeln!(w, "{}", display_value(&e.value)),
        |e, w| writeln!(w, "{key} = {} [{}]", display_value(&e.value), e.kind),
    )
}

fn run_set(name: &str, key: &str, raw: &str, ctx: &GroupContext) -> anyhow::Result<()> {
    let mut chunk = ctx.open_chunk(name)?;
    let metadata = chunk.metadata_mut();
    let kind = metadata
        .get(key)
        .map_err(|err| report(ctx.output, err))?
        .meta_type();
    let value = kind
        .coerce(&Value::String(raw.to_string()))
        .ok_or_else(|| {
            report(
                ctx.output,
                MetadataError::Coerce {
                    key: key.to_string(),
                    value: raw.to_string(),
                    kind,
                },
            )
        })?;
    metadata
        .set(key, value)
        .and_then(|()| metadata.write_to_disk())
        .map_err(|err| report(ctx.output, err))?;

    run_get(name, key, ctx)
}

fn run_add(name: &str, key: &str, raw: &str, kind: &str, ctx: &GroupContext) -> anyhow::Result<()> {
    let mut chunk = ctx.open_chunk(name)?;
    let metadata = chunk.metadata_mut();
    metadata
        .add_raw(key, raw, kind)
        .and_then(|()| metadata.write_to_disk())
        .map_err(|err| report(ctx.output, err))?;

    run_get(name, key, ctx)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
