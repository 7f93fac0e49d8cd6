use clap::Parser;
use std::process;

use newswire::cli::Cli;

#[tokio::main]
async fn main() {
    // Credentials may come from a local .env during development.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.run().await {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
