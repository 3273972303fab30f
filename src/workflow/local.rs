//! Local file workflow: analyze, annotate and rename one PDF in place.

use std::path::{Path, PathBuf};

use console::style;
use tracing::{error, info};

use crate::analysis::{AnalysisClient, AnalysisResult};
use crate::pdf;

/// Process a single local PDF.
///
/// Outcomes are reported through logs and the console only; failures are
/// swallowed here so an interactive run never crashes the process.
pub async fn process(client: &AnalysisClient, file_path: &Path) {
    info!("Processing local PDF file: {}", file_path.display());

    if !file_path.exists() {
        error!("File does not exist: {}", file_path.display());
        return;
    }
    if !has_pdf_extension(file_path) {
        error!("File is not a PDF: {}", file_path.display());
        return;
    }

    if let Err(e) = run(client, file_path).await {
        error!("Error processing local file {}: {:#}", file_path.display(), e);
        return;
    }

    info!("Successfully processed local file");
}

async fn run(client: &AnalysisClient, file_path: &Path) -> anyhow::Result<()> {
    let extraction = client.analyze(file_path).await?;
    if extraction.is_fallback() {
        info!("Analysis fell back to the fixed unreadable-document record");
    }
    let analysis = extraction.into_result();
    info!(
        "Analysis result: date={}, title='{}'",
        analysis.date, analysis.title
    );

    let directory = file_path.parent().unwrap_or_else(|| Path::new("."));
    let original_filename = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Annotated copy goes to a private temp path; the source stays
    // untouched until the very end.
    let annotated_path = pdf::annotate_pdf_to_temp(file_path, &analysis.summary)?;

    let new_path = resolve_collision(directory, &analysis, file_path);

    // Move the annotated file into place first, then drop the original.
    // The reverse order would leave no copy at all if the move failed.
    move_file(&annotated_path, &new_path)?;
    if new_path != file_path {
        std::fs::remove_file(file_path)?;
    }
    info!("Renamed local file to: {}", new_path.display());

    let new_file_name = new_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    println!("\n{}", style("=== ドキュメント分析結果 ===").bold());
    println!("元のファイル名: {}", original_filename);
    println!("推測された日付: {}", analysis.date);
    println!("推測されたタイトル: {}", analysis.title);
    println!("新しいファイル名: {}", new_file_name);
    println!("\n{}", style("=== ドキュメント要約 ===").bold());
    println!("{}", analysis.summary);
    println!("========================\n");

    Ok(())
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Pick the target path, appending `" (n)"` with the smallest free `n`
/// when the computed name is already taken by a different file.
fn resolve_collision(directory: &Path, analysis: &AnalysisResult, original: &Path) -> PathBuf {
    let new_path = directory.join(analysis.file_name());
    if !new_path.exists() || new_path == original {
        return new_path;
    }

    let mut counter = 1;
    loop {
        let candidate = directory.join(format!(
            "{} {} ({}).pdf",
            analysis.date, analysis.title, counter
        ));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Move a file, falling back to copy+remove when the rename crosses
/// filesystems (the temp dir often does).
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}
