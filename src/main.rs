//! # Draft Desk CLI (`draftdesk`)
//!
//! The `draftdesk` binary serves the report-writing HTTP API and offers a few
//! commands for inspecting the corpus from a terminal.
//!
//! ## Usage
//!
//! ```bash
//! draftdesk --config ./config/draftdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `draftdesk serve` | Start the HTTP server |
//! | `draftdesk search "<text>"` | Rank completed reports against text |
//! | `draftdesk reports` | List completed reports |
//! | `draftdesk drafts [<id>]` | List drafts, or show one draft's revision history |
//! | `draftdesk live [--server <url>]` | Debounced search over stdin lines |
//!
//! Logging goes to stderr. `-v` raises the level to debug, `-vv` to trace,
//! `-q` lowers it to warnings; `DRAFTDESK_LOG` overrides both.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use draftdesk::{config, live, reports, search, server};

/// Draft Desk: a writing assistant for recurring reports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/draftdesk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "draftdesk",
    about = "Draft Desk: related-report search, comment-driven revision, and a writing assistant",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/draftdesk.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Rank completed reports by similarity to the given text.
    Search {
        query: String,

        /// Maximum number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List completed reports.
    Reports,

    /// List drafts, or show the revision history of one draft.
    Drafts { id: Option<String> },

    /// Read document text from stdin, one full version per line, and print
    /// debounced related-report results.
    Live {
        /// Query a running server instead of the local corpus.
        #[arg(long)]
        server: Option<String>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DRAFTDESK_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Reports => {
            reports::run_reports(&cfg).await?;
        }
        Commands::Drafts { id } => {
            reports::run_drafts(&cfg, id.as_deref()).await?;
        }
        Commands::Live { server } => {
            live::run_live(&cfg, server.as_deref()).await?;
        }
    }

    Ok(())
}
