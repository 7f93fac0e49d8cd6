use crate::bitable::BitableClient;
use crate::config;
use crate::error::Result;
use crate::pipeline::{self, RunPaths};
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::path::PathBuf;

use crate::cli::Cli;

/// Execute one ingestion run against the default Feishu endpoint.
pub async fn run(paths: RunPaths) -> Result<()> {
    println!("Starting newswire...");
    println!("{}", "=".repeat(40));

    let client = BitableClient::new();
    let summary = pipeline::run(&paths, &client).await?;

    println!("{}", "=".repeat(40));
    println!(
        "Done. {} items fetched, {} new, {} published, {} feed failures.",
        summary.fetched, summary.added, summary.published, summary.failed_feeds
    );
    Ok(())
}

/// List the configured feed sources.
pub fn list_feeds(sources_path: PathBuf) -> Result<()> {
    let sources = config::load_sources(&sources_path)?;

    if sources.is_empty() {
        println!("No feeds configured in {}.", sources_path.display());
        return Ok(());
    }

    println!("Configured feeds ({}):", sources.len());
    for source in &sources {
        println!("  {} -> {}", source.name, source.url);
    }
    Ok(())
}

/// Generate shell completions
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let cmd_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, cmd_name, &mut std::io::stdout());
}

/// Initialize logging based on verbosity flags
pub fn init_logging(debug: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(debug)
        .with_line_number(debug)
        .init();

    Ok(())
}
