//! Remote workflow: drain the watched folder's change stream.
//!
//! Each notification pages through `list_folder/continue` from the owned
//! cursor, processes every qualifying file, and advances the cursor per
//! page. One file's failure never stops the page loop or the cursor.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::AnalysisClient;
use crate::pdf;
use crate::storage::{DropboxClient, Entry, StorageError};

/// Everything one watch loop owns: clients, the prefix filter and the
/// change cursor. The cursor is only touched through its mutex, and the
/// server runs notifications on a single worker, so overlapping webhooks
/// cannot race past each other.
pub struct WatchState {
    pub storage: DropboxClient,
    pub analysis: AnalysisClient,
    pub file_prefix: String,
    pub cursor: Mutex<String>,
}

/// Handle one folder-change notification.
pub async fn handle_notification(state: &WatchState) -> Result<(), StorageError> {
    loop {
        let cursor = state.cursor.lock().await.clone();
        let page = state.storage.list_folder_continue(&cursor).await?;

        for entry in &page.entries {
            if !should_process(entry, &state.file_prefix) {
                continue;
            }
            let Some(path) = entry.path_lower.as_deref() else {
                continue;
            };
            if let Err(e) = process_file(state, path).await {
                error!("Error processing file {}: {:#}", path, e);
            }
        }

        // The cursor advances whether or not every entry in the page
        // succeeded: failed files are skipped, not replayed.
        let has_more = page.has_more;
        *state.cursor.lock().await = page.cursor;
        if !has_more {
            return Ok(());
        }
    }
}

/// Filter for entries worth processing: files whose name still carries
/// the unprocessed prefix and whose path ends in `.pdf`. Renamed files
/// lose the prefix, which keeps a later scan from rematching them.
fn should_process(entry: &Entry, prefix: &str) -> bool {
    entry.is_file()
        && entry.name.starts_with(prefix)
        && entry
            .path_lower
            .as_deref()
            .is_some_and(|path| path.ends_with(".pdf"))
}

/// Run the single-file pipeline against one remote path.
async fn process_file(state: &WatchState, dbx_path: &str) -> anyhow::Result<()> {
    info!("Processing Dropbox PDF file: {}", dbx_path);

    let old_local_path = temp_pdf_path();
    let new_local_path = temp_pdf_path();

    let outcome = run_pipeline(state, dbx_path, &old_local_path, &new_local_path).await;

    // Temp files are removed whatever happened above; cleanup problems
    // are logged, never propagated.
    for path in [&old_local_path, &new_local_path] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Error cleaning up temp file {}: {}", path.display(), e);
            }
        }
    }

    outcome
}

async fn run_pipeline(
    state: &WatchState,
    dbx_path: &str,
    old_local_path: &Path,
    new_local_path: &Path,
) -> anyhow::Result<()> {
    let data = state.storage.download(dbx_path).await.map_err(|e| {
        error!("Error downloading file: {}", e);
        e
    })?;
    tokio::fs::write(old_local_path, data).await?;
    info!("Downloaded file to: {}", old_local_path.display());

    let analysis = state.analysis.analyze(old_local_path).await?.into_result();
    info!(
        "Analysis result: date={}, title='{}'",
        analysis.date, analysis.title
    );

    let new_dbx_path = remote_target_path(dbx_path, &analysis.file_name());

    pdf::annotate_pdf(old_local_path, new_local_path, &analysis.summary, 0)?;

    // Rename first, collision handling delegated to Dropbox; then put
    // the annotated bytes at whatever path the rename actually chose.
    let actual_path = state
        .storage
        .move_entry(dbx_path, &new_dbx_path, true)
        .await?;

    let annotated = tokio::fs::read(new_local_path).await?;
    state.storage.upload(&actual_path, annotated).await?;
    info!("Renamed file to: {}", actual_path);

    info!("Successfully processed file: {}", dbx_path);
    Ok(())
}

/// Uniquely named private temp path; concurrent pipelines never share.
fn temp_pdf_path() -> PathBuf {
    std::env::temp_dir().join(format!("{}.pdf", Uuid::new_v4()))
}

/// Sibling path in the same remote directory.
fn remote_target_path(dbx_path: &str, file_name: &str) -> String {
    match dbx_path.rfind('/') {
        Some(idx) => format!("{}/{}", &dbx_path[..idx], file_name),
        None => format!("/{}", file_name),
    }
}
