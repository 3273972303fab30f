//! CLI entry: mode selection and bootstrap.
//!
//! An argument naming an existing file runs the local workflow; anything
//! else starts the webhook server. Only configuration problems are fatal
//! (exit code 1) - processing failures never change the exit code.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing::info;

use crate::analysis::AnalysisClient;
use crate::config::Settings;
use crate::server;
use crate::storage::DropboxClient;
use crate::workflow::{self, remote::WatchState};

#[derive(Parser)]
#[command(name = "paperdrop")]
#[command(about = "Automated PDF intake: analyze scans with Claude, rename and annotate them")]
#[command(version)]
pub struct Cli {
    /// Local PDF file to process; starts the webhook server when omitted
    pub file: Option<std::path::PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.file {
        Some(path) if path.is_file() => run_local(&path).await,
        _ => run_server().await,
    }
}

async fn run_local(path: &Path) -> anyhow::Result<()> {
    let settings = Settings::from_env(false)?;

    info!("Running in local file mode for: {}", path.display());
    let client = AnalysisClient::new(settings.claude_api_key);
    workflow::local::process(&client, path).await;
    Ok(())
}

async fn run_server() -> anyhow::Result<()> {
    let settings = Settings::from_env(true)?;
    let dropbox = settings
        .dropbox
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Dropbox settings missing"))?;

    let storage = DropboxClient::new(&dropbox);
    let account = storage.current_account().await?;
    info!("Connected to Dropbox as {}", account);

    let cursor = storage.latest_cursor(&dropbox.folder_path).await?;
    let watch = Arc::new(WatchState {
        storage,
        analysis: AnalysisClient::new(settings.claude_api_key.clone()),
        file_prefix: dropbox.file_prefix.clone(),
        cursor: Mutex::new(cursor),
    });

    server::serve(settings.port, watch).await
}
