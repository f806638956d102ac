//! Issue translation, sequence fencing, and the published-diagnostics store.

use std::collections::HashMap;

use lintbridge_types::{Diagnostic, DocumentUri, Issue, Position, Range, Sequence, Severity};

use crate::types::DiagnosticsSnapshot;

/// Map one analyzer issue to an editor diagnostic.
///
/// The range covers `length` characters (default 1) from `(line, column)` on
/// a single line.
pub fn translate(issue: &Issue) -> Diagnostic {
    let start = Position::new(issue.line, issue.column);
    let end = Position::new(
        issue.line,
        issue.column.saturating_add(issue.length.unwrap_or(1)),
    );
    Diagnostic::new(
        Range::new(start, end),
        Severity::from_wire(issue.severity),
        issue.message.clone(),
        issue.code.clone(),
    )
}

/// Tracks the last accepted sequence per document and rejects anything older.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticTranslator {
    accepted: HashMap<DocumentUri, Sequence>,
}

impl DiagnosticTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate `issues` if `sequence` is newer than anything accepted for
    /// `uri`. Returns `None` for a stale response.
    pub fn accept(
        &mut self,
        uri: &DocumentUri,
        sequence: Sequence,
        issues: &[Issue],
    ) -> Option<Vec<Diagnostic>> {
        if let Some(last) = self.accepted.get(uri)
            && sequence <= *last
        {
            tracing::debug!(
                uri = %uri,
                sequence = %sequence,
                accepted = %last,
                "Discarding stale analyzer response"
            );
            return None;
        }
        self.accepted.insert(uri.clone(), sequence);
        Some(issues.iter().map(translate).collect())
    }
}

/// Latest accepted diagnostics per document. An empty set removes the entry.
pub(crate) struct DiagnosticsStore {
    data: HashMap<DocumentUri, Vec<Diagnostic>>,
}

impl DiagnosticsStore {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn update(&mut self, uri: DocumentUri, items: Vec<Diagnostic>) {
        if items.is_empty() {
            self.data.remove(&uri);
        } else {
            self.data.insert(uri, items);
        }
    }

    pub fn get(&self, uri: &DocumentUri) -> &[Diagnostic] {
        self.data.get(uri).map_or(&[], Vec::as_slice)
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut documents: Vec<(DocumentUri, Vec<Diagnostic>)> = self
            .data
            .iter()
            .map(|(uri, items)| (uri.clone(), items.clone()))
            .collect();

        // Documents with errors first, then by uri
        documents.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors.cmp(&a_has_errors).then_with(|| a.0.cmp(&b.0))
        });

        DiagnosticsSnapshot::new(documents)
    }
}
