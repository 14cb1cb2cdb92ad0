//! # Grounded Chat CLI (`gchat`)
//!
//! The `gchat` binary initializes the knowledge base, ingests documents,
//! answers one-off questions and runs the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! gchat --config ./config/chat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gchat init` | Create the SQLite database and run schema migrations |
//! | `gchat ingest <files>...` | Ingest up to 3 files and/or a `--doc-link` |
//! | `gchat ask "<query>"` | Answer a single question and print it |
//! | `gchat serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! gchat init
//! gchat ingest ./notes.txt ./paper.pdf
//! gchat ingest --doc-link "https://docs.google.com/document/d/<id>/edit"
//! gchat ask "what does the paper conclude?"
//! gchat ask "summarize https://example.com/post"
//! gchat serve
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use grounded_chat::config::{self, Config};
use grounded_chat::ingest::UploadedFile;
use grounded_chat::pipeline::ChatService;
use grounded_chat::{db, logging, migrate, server};

/// Grounded Chat: retrieval-augmented chat over your documents and live web pages.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/chat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gchat",
    about = "Grounded Chat: retrieval-augmented chat over uploaded documents and live web pages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest files and/or a shared document link into the knowledge base.
    ///
    /// URLs found inside the files are fetched and ingested alongside them.
    Ingest {
        /// Files to ingest (`.txt`, `.md`, `.pdf`, `.pptx`).
        files: Vec<PathBuf>,

        /// Shared document link to export and ingest.
        #[arg(long)]
        doc_link: Option<String>,
    },

    /// Answer a single question and print the answer.
    ///
    /// Questions containing URLs are answered from those pages; anything
    /// else is answered from the knowledge base.
    Ask {
        /// The question.
        query: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { files, doc_link } => {
            let service = start_service(&cfg).await?;

            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                uploads.push(UploadedFile::new(file_name, bytes));
            }

            let summary = service.upload(uploads, doc_link.as_deref()).await?;
            println!("Ingest complete:");
            println!("  text blocks: {}", summary.blocks);
            println!("  chunks added: {}", summary.chunks);
            println!("ok");
        }
        Commands::Ask { query } => {
            let service = start_service(&cfg).await?;
            let answer = service.chat(&query, &[]).await?;
            println!("{}", answer);
        }
        Commands::Serve => {
            cfg.require_credentials()?;
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn start_service(cfg: &Config) -> anyhow::Result<ChatService> {
    cfg.require_credentials()?;
    ChatService::from_config(cfg).await
}
