//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ingest [ROOT]` | Ingest new and changed files under ROOT (default `ingest.root`) |
//! | `docqa ask QUESTION` | Answer a question from the corpus and any `--attach`ed files |
//! | `docqa store` | Show which store layer opened and how many chunks it holds |
//!
//! Logging goes to stderr via `tracing`; `RUST_LOG` overrides the level.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa::answer::{self, AnswerRequest};
use docqa::attachments;
use docqa::chunk::Chunker;
use docqa::config::{self, Config};
use docqa::embedding;
use docqa::ingest;
use docqa::llm::OpenAIChat;
use docqa::models::ChatMessage;
use docqa::store_access::StoreAccess;

#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Document-grounded question answering over office documents",
    version
)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new and changed documents into the vector store.
    ///
    /// Files whose modification time matches the manifest are skipped, so
    /// re-running on an unchanged tree does no work.
    Ingest {
        /// Root directory to scan (defaults to `ingest.root`).
        root: Option<PathBuf>,
    },

    /// Ask a question.
    Ask {
        question: String,

        /// JSON file with prior turns: `[{"role":"user","content":"..."}]`.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Chat model (defaults to `chat.model`).
        #[arg(long)]
        model: Option<String>,

        /// Attach a file for this question only. May be repeated.
        #[arg(long)]
        attach: Vec<PathBuf>,
    },

    /// Open the vector store and report its origin and size.
    Store,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = config::load_config(cli.config.as_deref())?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Ingest { root } => {
            let report = ingest::run_ingest(&cfg, root.as_deref()).await?;
            println!(
                "ingest {}",
                root.as_deref().unwrap_or(cfg.ingest.root.as_path()).display()
            );
            println!("  scanned: {}", report.scanned);
            println!("  ingested: {}", report.ingested);
            println!("  unchanged: {}", report.unchanged);
            println!("  unsupported: {}", report.unsupported);
            println!("  failed: {}", report.failed);
            println!("  chunks inserted: {}", report.chunks_inserted);
            println!("  chunks already present: {}", report.chunks_already_present);
            if report.chunks_skipped > 0 {
                println!("  chunks skipped (token budget): {}", report.chunks_skipped);
            }
            println!("ok");
        }
        Commands::Ask {
            question,
            history,
            model,
            attach,
        } => {
            let chat_history = match history {
                Some(path) => read_history(&path)?,
                None => Vec::new(),
            };
            let ephemeral_chunks = attachments::load_attachments(
                &attach,
                &cfg.ocr,
                &Chunker::from_config(&cfg.chunking),
            )
            .context("Failed to load attachments")?;

            let embedder = embedding::create_embedder(&cfg.embedding)
                .context("Failed to create embedding provider")?;
            let access = StoreAccess::new(&cfg);
            let handle = access
                .open(embedder)
                .await
                .context("Failed to open vector store")?;
            let chat = OpenAIChat::new(&cfg.chat).context("Failed to create chat model")?;

            let request = AnswerRequest {
                question,
                chat_history,
                model: model.unwrap_or_else(|| cfg.chat.model.clone()),
                ephemeral_chunks,
            };
            let answer = answer::answer(request, &chat, &handle).await?;
            println!("{}", answer.answer);
        }
        Commands::Store => {
            let embedder = embedding::create_embedder(&cfg.embedding)
                .context("Failed to create embedding provider")?;
            let access = StoreAccess::new(&cfg);
            let handle = access
                .open(embedder)
                .await
                .context("Failed to open vector store")?;
            println!("store");
            println!("  origin: {}", handle.origin());
            println!("  dir: {}", handle.store().dir().display());
            println!("  model: {}", handle.embedder().model_name());
            println!("  chunks: {}", handle.count().await?);
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `debug` when `logging.debug` is set, else `info`.
fn init_tracing(cfg: &Config) {
    let default_level = if cfg.logging.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_history(path: &Path) -> Result<Vec<ChatMessage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| "History must be a JSON array of {role, content}")
}
