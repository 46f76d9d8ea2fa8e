//! # rag-bot CLI
//!
//! Command-line front end for the retrieval core: build the embedding
//! index, search it, ask grounded questions, and manage the cache and the
//! provider's models.
//!
//! ## Usage
//!
//! ```bash
//! rag-bot --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag-bot index` | Load documents and embed them through the cache |
//! | `rag-bot search "<query>"` | Ranked documents, by vector or keyword |
//! | `rag-bot ask "<query>"` | Retrieve, then generate a grounded answer |
//! | `rag-bot cache stats` | Show what the embedding cache holds |
//! | `rag-bot cache clear` | Empty the embedding cache |
//! | `rag-bot models list` | List models installed on the provider |
//! | `rag-bot models ensure [<name>]` | Download missing models |
//!
//! Logs go to stderr; set `RUST_LOG` or pass `-v` for more detail.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_bot::progress::ProgressMode;
use rag_bot::{config, embed_cmd, logging, models_cmd, search, stats};

/// rag-bot: retrieval-augmented answers over a markdown knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing default config falls back to built-in defaults.
#[derive(Parser)]
#[command(
    name = "rag-bot",
    about = "Retrieval-augmented answers over a markdown knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    /// More log output (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load documents and embed them through the cache.
    ///
    /// Documents already in the cache with unchanged content are not sent
    /// to the provider again.
    Index {
        /// Emit progress as JSON lines on stderr.
        #[arg(long)]
        json_progress: bool,
    },

    /// Search the knowledge base.
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `vector` (embeddings, needs the provider) or
        /// `keyword` (term overlap, offline).
        #[arg(long, default_value = "vector")]
        mode: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Answer a question from the retrieved documents.
    Ask {
        /// The question (at most 1000 characters).
        query: String,

        /// Maximum number of documents given to the model.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Inspect or empty the embedding cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Inspect or download provider models.
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts, file size, and freshness.
    Stats,
    /// Remove every cached embedding.
    Clear,
}

#[derive(Subcommand)]
enum ModelsAction {
    /// List models installed on the provider.
    List,
    /// Make sure a model is available, downloading it if needed.
    ///
    /// Without a name, ensures both configured models.
    Ensure {
        /// Model name, e.g. `mxbai-embed-large`.
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let default_config = PathBuf::from("./config/rag.toml");
    let cfg = if cli.config == default_config && !cli.config.exists() {
        config::Config::minimal()
    } else {
        config::load_config(&cli.config)?
    };

    match cli.command {
        Commands::Index { json_progress } => {
            let mode = if json_progress {
                ProgressMode::Json
            } else {
                ProgressMode::default_for_tty()
            };
            embed_cmd::run_index(&cfg, mode).await?;
        }
        Commands::Search { query, mode, limit } => {
            search::run_search(&cfg, &query, &mode, limit).await?;
        }
        Commands::Ask { query, limit } => {
            search::run_ask(&cfg, &query, limit).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => stats::run_cache_stats(&cfg)?,
            CacheAction::Clear => stats::run_cache_clear(&cfg)?,
        },
        Commands::Models { action } => match action {
            ModelsAction::List => models_cmd::run_models_list(&cfg).await?,
            ModelsAction::Ensure { name } => models_cmd::run_models_ensure(&cfg, name).await?,
        },
    }

    Ok(())
}
