#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::Context;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "metasum: incremental workflow metadata summarizer",
    long_about = None
)]
struct Cli {
    /// Project root holding `.metasum/` (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Metadata database path (defaults to `<root>/.metasum/metadata.sqlite3`).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Append metadata entries from JSONL",
        long_about = "Append metadata entries to the journal. Each line is one JSON object with \
                      workflow_id, key and value, plus optional call_name, job_index and \
                      job_attempt. New entries are flagged for summarization.",
        after_help = "EXAMPLES:\n    # Import a file\n    metasum import events.jsonl\n\n    # Import from stdin\n    cat events.jsonl | metasum import -"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        about = "Fold journal entries into workflow summaries",
        long_about = "Run one summarization batch with the chosen strategy, or repeat batches \
                      until the strategy reports no more work.",
        after_help = "EXAMPLES:\n    # One forward batch with the configured batch size\n    metasum sweep increasing\n\n    # Backfill everything below the forward watermark\n    metasum sweep decreasing --until-caught-up\n\n    # Drain flagged entries 500 at a time\n    metasum sweep flagged --limit 500 --until-caught-up --json"
    )]
    Sweep(cmd::sweep::SweepArgs),

    #[command(
        about = "Show journal counters and sweep positions",
        after_help = "EXAMPLES:\n    metasum status\n    metasum status --json"
    )]
    Status,

    #[command(
        about = "Show one workflow summary",
        after_help = "EXAMPLES:\n    metasum show 3f2a9c1e-wf\n    metasum show 3f2a9c1e-wf --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        about = "Set the archive status of a workflow summary",
        after_help = "EXAMPLES:\n    metasum archive 3f2a9c1e-wf Archived\n    metasum archive 3f2a9c1e-wf ArchiveFailed --json"
    )]
    Archive(cmd::archive::ArchiveArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("METASUM_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "metasum=debug,info"
        } else {
            "metasum=info,warn"
        })
    });

    let format = env::var("METASUM_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output; logs go to stderr.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: Cli, output: OutputMode) -> anyhow::Result<()> {
    let root = match cli.root {
        Some(root) => root,
        None => env::current_dir()?,
    };
    let ctx = Context::new(root, cli.db, output);

    match cli.command {
        Commands::Import(ref args) => cmd::import::run_import(args, &ctx),
        Commands::Sweep(ref args) => cmd::sweep::run_sweep(args, &ctx),
        Commands::Status => cmd::status::run_status(&ctx),
        Commands::Show(ref args) => cmd::show::run_show(args, &ctx),
        Commands::Archive(ref args) => cmd::archive::run_archive(args, &ctx),
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let output = resolve_output_mode(cli.json);

    match run(cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            if render_error(output, &CliError::from(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
