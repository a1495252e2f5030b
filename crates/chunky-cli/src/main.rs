#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use std::io;
use std::path::PathBuf;
use std::process;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cmd::GroupContext;

#[derive(Parser, Debug)]
#[command(
    name = "chunky",
    author,
    version,
    about = "chunky: chunked log files with JSON metadata sidecars",
    long_about = None
)]
struct Cli {
    /// Directory holding the chunk group.
    #[arg(short, long, global = true, default_value = ".")]
    group: PathBuf,

    /// Config file (default: `<group>/chunky.toml` when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Write",
        about = "Append lines to a chunk",
        long_about = "Append lines to a chunk, creating it on first write. Reads stdin when no lines are given.",
        after_help = "EXAMPLES:\n    # Append two lines\n    chunky write app \"started\" \"ready\"\n\n    # Pipe lines in, one timestamp for the whole batch\n    tail -n 100 app.log | chunky write app --batch"
    )]
    Write(cmd::write::WriteArgs),

    #[command(
        next_help_heading = "Read",
        about = "Print every line of a chunk",
        long_about = "Print every line of a chunk. With --follow, keep polling the metadata sidecar and print new lines as they land.",
        after_help = "EXAMPLES:\n    # Dump a chunk\n    chunky read app\n\n    # Follow it, polling every 200ms\n    chunky read app --follow --interval-ms 200"
    )]
    Read(cmd::read::ReadArgs),

    #[command(next_help_heading = "Read", about = "Print the first lines of a chunk")]
    Head(cmd::slice::SliceArgs),

    #[command(next_help_heading = "Read", about = "Print the last lines of a chunk")]
    Tail(cmd::slice::SliceArgs),

    #[command(
        next_help_heading = "Metadata",
        about = "Show or edit chunk metadata",
        after_help = "EXAMPLES:\n    # Show the sidecar\n    chunky meta show app\n\n    # Add a typed extension key\n    chunky meta add app source.rate 0.5 --type float"
    )]
    Meta(cmd::meta::MetaArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Delete a chunk's data file and sidecar"
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Zip a chunk's data file and sidecar, then remove them"
    )]
    Archive(cmd::archive::ArchiveArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHUNKY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "chunky=debug,info"
        } else {
            "chunky=info,warn"
        })
    });

    let format = env::var("CHUNKY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();
    debug!(group = %cli.group.display(), ?output, "chunky starting");

    if let Err(err) = run(&cli, output) {
        if !cmd::is_reported(&err) {
            let cli_error = CliError {
                message: format!("{err:#}"),
                suggestion: None,
                error_code: None,
            };
            if let Err(render_err) = output::render_error(output, &cli_error) {
                warn!(error = %render_err, "failed to render error");
            }
        }
        process::exit(1);
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<()> {
    let ctx = GroupContext::load(cli.group.clone(), cli.config.as_deref(), output)?;

    match &cli.command {
        Commands::Write(args) => cmd::write::run_write(args, &ctx),
        Commands::Read(args) => cmd::read::run_read(args, &ctx),
        Commands::Head(args) => cmd::slice::run_head(args, &ctx),
        Commands::Tail(args) => cmd::slice::run_tail(args, &ctx),
        Commands::Meta(args) => cmd::meta::run_meta(args, &ctx),
        Commands::Delete(args) => cmd::delete::run_delete(args, &ctx),
        Commands::Archive(args) => cmd::archive::run_archive(args, &ctx),
    }
}
