//! One-shot linting of files on disk.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::time::{Instant, timeout_at};

use lintbridge_lint::{
    DiagnosticsSnapshot, DocumentEvent, DocumentEventKind, LintConfig, LintEvent, LintManager,
};
use lintbridge_types::{DocumentUri, LanguageId, Position, Range, TextEdit, apply_edits};

/// A file that has been opened and is waiting for its diagnostics.
struct Pending {
    order: usize,
    path: PathBuf,
    uri: DocumentUri,
    language: LanguageId,
    text: String,
}

/// Range covering any document.
const WHOLE_DOCUMENT: Range = Range::new(Position::new(0, 0), Position::new(u32::MAX, u32::MAX));

pub fn file_uri(path: &Path) -> Result<DocumentUri> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("cannot resolve {}", path.display()))?;
    let url = url::Url::from_file_path(&absolute)
        .map_err(|()| anyhow!("cannot build a file URI for {}", absolute.display()))?;
    Ok(DocumentUri::new(url.to_string()))
}

pub async fn run(config: &LintConfig, files: &[PathBuf], fix: bool) -> Result<ExitCode> {
    let mut manager = LintManager::start(config.clone()).await;
    if !manager.is_enabled() {
        bail!("linting is unavailable; see the log for the runtime probe result");
    }

    let mut failed = false;
    let mut waiting = Vec::new();
    for (order, path) in files.iter().enumerate() {
        let Some(language) = config.language_for_path(path) else {
            eprintln!("{}: no analyzer registered for this file type", path.display());
            failed = true;
            continue;
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let uri = file_uri(path)?;
        manager
            .handle_document_event(DocumentEvent::new(
                DocumentEventKind::Opened,
                uri.as_str(),
                language.as_str(),
                text.clone(),
            ))
            .await;
        waiting.push(Pending {
            order,
            path: path.clone(),
            uri,
            language,
            text,
        });
    }

    // Each language serves its files one at a time.
    let rounds = u32::try_from(waiting.len()).unwrap_or(u32::MAX).saturating_add(1);
    let deadline =
        Instant::now() + Duration::from_millis(config.request_timeout_ms).saturating_mul(rounds);

    let mut answered = Vec::new();
    while !waiting.is_empty() {
        let event = match timeout_at(deadline, manager.next_event()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(pending = waiting.len(), "Timed out waiting for analyzers");
                break;
            }
        };
        match event {
            LintEvent::Diagnostics { uri, .. } => {
                if let Some(index) = waiting.iter().position(|p| p.uri == uri) {
                    answered.push(waiting.remove(index));
                }
            }
            // Exchanges for one language complete in the order they were
            // queued, so the failure belongs to the oldest waiting file.
            LintEvent::WorkerStopped { language, reason } => {
                if let Some(index) = waiting.iter().position(|p| p.language == language) {
                    let pending = waiting.remove(index);
                    eprintln!("{}: analyzer {reason}", pending.path.display());
                    failed = true;
                }
            }
        }
    }
    for pending in &waiting {
        eprintln!("{}: no response from analyzer", pending.path.display());
        failed = true;
    }

    answered.sort_by_key(|pending| pending.order);

    for pending in &answered {
        for diagnostic in manager.diagnostics(&pending.uri) {
            println!("{}", diagnostic.display_with_path(&pending.path));
        }

        if fix {
            let edits: Vec<TextEdit> = manager
                .code_actions(&pending.uri, WHOLE_DOCUMENT)
                .into_iter()
                .map(|action| action.edit)
                .collect();
            if !edits.is_empty() {
                let fixed = apply_edits(&pending.text, &edits);
                tokio::fs::write(&pending.path, fixed)
                    .await
                    .with_context(|| format!("failed to write {}", pending.path.display()))?;
                eprintln!("{}: applied {} fix(es)", pending.path.display(), edits.len());
            }
        }
    }

    let snapshot = manager.snapshot();
    manager.shutdown().await;

    if let Some(summary) = summary_line(&snapshot) {
        eprintln!("{summary}");
    }
    if failed || snapshot.error_count() > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Closing status line, e.g. `3 diagnostic(s) in 2 file(s) (E:1 W:2)`.
fn summary_line(snapshot: &DiagnosticsSnapshot) -> Option<String> {
    if snapshot.is_empty() {
        return None;
    }
    Some(format!(
        "{} diagnostic(s) in {} file(s) ({})",
        snapshot.total_count(),
        snapshot.documents().len(),
        snapshot.status_string(),
    ))
}
