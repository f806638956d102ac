//! JSON-lines editor bridge.
//!
//! stdin carries one editor message per line:
//!
//! ```text
//! {"type":"open","uri":"file:///a.csml","languageId":"csml","text":"..."}
//! {"type":"change"|"save"|"focus"|"close", ...same fields...}
//! {"type":"codeAction","id":7,"uri":"file:///a.csml","range":{"start":{...},"end":{...}}}
//! {"type":"shutdown"}
//! ```
//!
//! stdout carries one reply or notification per line (`diagnostics`,
//! `codeActions`, `workerStopped`, `error`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use lintbridge_lint::{DocumentEvent, DocumentEventKind, LintConfig, LintEvent, LintManager};
use lintbridge_types::{CodeAction, Diagnostic, DocumentUri, LanguageId, Range, Sequence};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentParams {
    uri: String,
    language_id: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Incoming {
    Open(DocumentParams),
    Change(DocumentParams),
    Save(DocumentParams),
    Focus(DocumentParams),
    Close(DocumentParams),
    CodeAction {
        id: serde_json::Value,
        uri: String,
        range: Range,
    },
    Shutdown,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Outgoing<'a> {
    Diagnostics {
        uri: &'a DocumentUri,
        sequence: Sequence,
        diagnostics: &'a [Diagnostic],
    },
    WorkerStopped {
        language: &'a LanguageId,
        reason: String,
    },
    CodeActions {
        id: serde_json::Value,
        actions: Vec<CodeAction>,
    },
    Error {
        message: String,
    },
}

impl Incoming {
    fn into_document_event(self) -> Result<DocumentEvent, Self> {
        let (kind, params) = match self {
            Self::Open(p) => (DocumentEventKind::Opened, p),
            Self::Change(p) => (DocumentEventKind::Changed, p),
            Self::Save(p) => (DocumentEventKind::Saved, p),
            Self::Focus(p) => (DocumentEventKind::Activated, p),
            Self::Close(p) => (DocumentEventKind::Closed, p),
            other => return Err(other),
        };
        Ok(DocumentEvent::new(kind, params.uri, params.language_id, params.text))
    }
}

async fn write_message<W: AsyncWrite + Unpin>(out: &mut W, message: &Outgoing<'_>) -> Result<()> {
    let mut line = serde_json::to_vec(message).context("failed to encode reply")?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await?;
    Ok(())
}

/// Whether the loop should keep reading input.
enum Flow {
    Continue,
    Stop,
}

async fn handle_line<W: AsyncWrite + Unpin>(
    manager: &mut LintManager,
    out: &mut W,
    line: &str,
) -> Result<Flow> {
    if line.trim().is_empty() {
        return Ok(Flow::Continue);
    }
    let incoming: Incoming = match serde_json::from_str(line) {
        Ok(incoming) => incoming,
        Err(e) => {
            tracing::warn!("Ignoring malformed editor message: {e}");
            let message = format!("malformed message: {e}");
            write_message(out, &Outgoing::Error { message }).await?;
            return Ok(Flow::Continue);
        }
    };

    match incoming.into_document_event() {
        Ok(event) => {
            manager.handle_document_event(event).await;
            Ok(Flow::Continue)
        }
        Err(Incoming::CodeAction { id, uri, range }) => {
            // Answer from everything published so far, and let the editor
            // see those publications before the reply that depends on them.
            for event in manager.drain_events(usize::MAX) {
                forward_event(out, &event).await?;
            }
            let actions = manager.code_actions(&DocumentUri::new(uri), range);
            write_message(out, &Outgoing::CodeActions { id, actions }).await?;
            Ok(Flow::Continue)
        }
        Err(_) => Ok(Flow::Stop),
    }
}

async fn forward_event<W: AsyncWrite + Unpin>(out: &mut W, event: &LintEvent) -> Result<()> {
    let message = match event {
        LintEvent::Diagnostics {
            uri,
            sequence,
            items,
        } => Outgoing::Diagnostics {
            uri,
            sequence: *sequence,
            diagnostics: items,
        },
        LintEvent::WorkerStopped { language, reason } => Outgoing::WorkerStopped {
            language,
            reason: reason.to_string(),
        },
    };
    write_message(out, &message).await
}

pub async fn run(config: LintConfig) -> Result<()> {
    let mut manager = LintManager::start(config).await;
    if !manager.is_enabled() {
        tracing::warn!("Serving without analyzers; no diagnostics will be published");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    tracing::info!("Editor closed stdin");
                    break;
                };
                if let Flow::Stop = handle_line(&mut manager, &mut out, &line).await? {
                    break;
                }
            }
            Some(event) = manager.next_event() => {
                forward_event(&mut out, &event).await?;
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}
