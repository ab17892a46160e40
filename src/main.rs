//! # Folio CLI (`folio`)
//!
//! ## Usage
//!
//! ```bash
//! folio [--config ./folio.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio ingest` | Chunk and embed the content directory into the index file |
//! | `folio search "<query>"` | Show the entries retrieval would use for a query |
//! | `folio ask "<message>"` | Answer one message through the full chat flow |
//! | `folio serve` | Start the chat HTTP server |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use folio::ask::{Answer, Assistant};
use folio::chat::HttpChatClient;
use folio::config;
use folio::embedding::HttpEmbedder;
use folio::index_store::{fetcher_from_config, IndexStore};
use folio::search::SearchParams;
use folio::{ingest, search, server};

/// Folio: a retrieval-grounded chatbot backend for a portfolio site.
///
/// Settings are read from an optional TOML file and overridden by
/// environment variables such as `CHAT_API_KEY` and `LOCAL_EMBED_URL`.
#[derive(Parser)]
#[command(name = "folio", version, about = "Retrieval-grounded chatbot backend for a portfolio site")]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from the content directory.
    ///
    /// Every chunk is embedded; the first embedding failure aborts the run
    /// and leaves any existing index untouched.
    Ingest {
        /// Report file and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Rank the index against a query and print the results.
    Search {
        query: String,

        /// Number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Print similarity scores.
        #[arg(long)]
        scores: bool,
    },

    /// Answer a single message with retrieved context.
    Ask { message: String },

    /// Start the chat HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { dry_run } => {
            let embedder = HttpEmbedder::from_config(&cfg)?;
            ingest::run_ingest(&cfg, &embedder, dry_run).await?;
        }
        Commands::Search { query, k, scores } => {
            let embedder = HttpEmbedder::from_config(&cfg)?;
            let store = IndexStore::new(fetcher_from_config(&cfg)?);
            let index = store.load().await;

            let mut params = SearchParams::from_config(&cfg.retrieval);
            if let Some(k) = k {
                params = params.with_k(k);
            }
            let results = search::search_scored(&index, &query, &embedder, &params).await;

            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, r) in results.iter().enumerate() {
                if scores {
                    println!("{}. [{:.4}] {} ({})", i + 1, r.score, r.entry.id, r.entry.source);
                } else {
                    println!("{}. {} ({})", i + 1, r.entry.id, r.entry.source);
                }
                println!("    {}", preview(&r.entry.text, 160));
            }
        }
        Commands::Ask { message } => {
            let index = Arc::new(IndexStore::new(fetcher_from_config(&cfg)?));
            let embedder = Arc::new(HttpEmbedder::from_config(&cfg)?);
            let chat = Arc::new(HttpChatClient::from_config(&cfg)?);
            let assistant = Assistant::new(&cfg, index, embedder, chat);

            let answer = assistant.answer(&message, &[]).await?;
            println!("{}", answer.reply());
            if let Answer::Grounded { sources, .. } = &answer {
                if !sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for s in sources {
                        println!("  {}", s);
                    }
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

/// Single-line preview of at most `max` characters.
fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}…", cut)
    }
}
