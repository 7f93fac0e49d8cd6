pub mod commands;

use crate::bitable::auth::DEFAULT_TOKEN_FILE;
use crate::config::{DEFAULT_CREDENTIALS_FILE, DEFAULT_FILTER_FILE, DEFAULT_SOURCES_FILE};
use crate::error::Result;
use crate::pipeline::RunPaths;
use crate::storage::news_db::DEFAULT_DB_FILE;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "newswire")]
#[command(about = "Ingest RSS feeds, filter and deduplicate items, relay them to a Feishu Bitable")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one ingestion cycle: fetch, filter, dedup, publish
    Run {
        /// Feed source list (JSON map of display name -> URL)
        #[arg(long, default_value = DEFAULT_SOURCES_FILE)]
        sources: PathBuf,

        /// Filter configuration (keywords, lookback window)
        #[arg(long, default_value = DEFAULT_FILTER_FILE)]
        filter: PathBuf,

        /// Credentials fallback file (environment variables win)
        #[arg(long, default_value = DEFAULT_CREDENTIALS_FILE)]
        credentials: PathBuf,

        /// Persistent news database
        #[arg(long, default_value = DEFAULT_DB_FILE)]
        db: PathBuf,

        /// Token cache file
        #[arg(long, default_value = DEFAULT_TOKEN_FILE)]
        token_cache: PathBuf,
    },

    /// List the configured feed sources
    ListFeeds {
        /// Feed source list (JSON map of display name -> URL)
        #[arg(long, default_value = DEFAULT_SOURCES_FILE)]
        sources: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        commands::init_logging(self.debug, self.verbose)?;

        match self.command {
            Commands::Run {
                sources,
                filter,
                credentials,
                db,
                token_cache,
            } => {
                let paths = RunPaths {
                    sources,
                    filter,
                    credentials,
                    db,
                    token_cache,
                };
                commands::run(paths).await
            }
            Commands::ListFeeds { sources } => commands::list_feeds(sources),
            Commands::Completions { shell } => {
                commands::generate_completions(shell);
                Ok(())
            }
        }
    }
}
