//! paperdrop - automated PDF intake pipeline.
//!
//! Watches a Dropbox folder (or takes a local file argument) for scanned
//! PDF documents, analyzes each one with Claude, then renames the file
//! and stamps the generated summary onto it as a visible annotation.

mod analysis;
mod cli;
mod config;
mod pdf;
mod server;
mod storage;
mod workflow;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "paperdrop=debug"
    } else {
        "paperdrop=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
