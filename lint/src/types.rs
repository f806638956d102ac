//! Public types consumed by hosts.
//!
//! These types define the interface between `lintbridge-lint` and whatever
//! drives it (the CLI, an editor bridge). The host builds a [`LintConfig`],
//! feeds [`DocumentEvent`]s, receives [`LintEvent`]s, and reads
//! [`DiagnosticsSnapshot`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use lintbridge_types::{Diagnostic, DocumentUri, LanguageId, Sequence};
use serde::{Deserialize, Serialize};

/// Default idle gap before a burst of edits is analyzed.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default upper bound for one request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

const fn default_true() -> bool {
    true
}

const fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

/// Configuration for the lint subsystem.
#[derive(Debug, Clone, Deserialize)]
pub struct LintConfig {
    /// Whether linting is enabled. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Idle gap (ms) after the last edit before a request fires.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Exchanges running longer than this (ms) count as a worker crash.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Base directory for relative analyzer entry points.
    #[serde(default)]
    pub analyzer_dir: Option<PathBuf>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Analyzers keyed by editor language id. Replaces the defaults when set.
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<LanguageId, LanguageConfig>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            analyzer_dir: None,
            runtime: RuntimeConfig::default(),
            languages: default_languages(),
        }
    }
}

impl LintConfig {
    /// Resolved analyzer entry point for every configured language.
    #[must_use]
    pub fn entry_points(&self) -> BTreeMap<LanguageId, PathBuf> {
        self.languages
            .iter()
            .map(|(language, cfg)| {
                let entry = match &self.analyzer_dir {
                    Some(dir) if cfg.entry_point.is_relative() => dir.join(&cfg.entry_point),
                    _ => cfg.entry_point.clone(),
                };
                (language.clone(), entry)
            })
            .collect()
    }

    /// Language whose configured extensions match `path`, if any.
    #[must_use]
    pub fn language_for_path(&self, path: &Path) -> Option<LanguageId> {
        let ext = path.extension()?.to_str()?;
        self.languages
            .iter()
            .find(|(_, cfg)| cfg.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .map(|(language, _)| language.clone())
    }

    /// Rewrite every path-like string through `expand` (e.g. `${VAR}` expansion).
    #[must_use]
    pub fn map_paths(mut self, expand: impl Fn(&str) -> String) -> Self {
        let rewrite = |path: &Path| PathBuf::from(expand(&path.to_string_lossy()));
        self.analyzer_dir = self.analyzer_dir.as_deref().map(&rewrite);
        for cfg in self.languages.values_mut() {
            cfg.entry_point = rewrite(&cfg.entry_point);
        }
        self
    }
}

fn default_languages() -> BTreeMap<LanguageId, LanguageConfig> {
    [("csml", "csml_linter.py"), ("mcml", "mcml_linter.py")]
        .into_iter()
        .map(|(language, entry)| {
            (
                LanguageId::new(language),
                LanguageConfig {
                    entry_point: PathBuf::from(entry),
                    extensions: vec![language.to_string()],
                },
            )
        })
        .collect()
}

/// Analyzer registration for one language.
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageConfig {
    /// Script handed to the runtime as its only argument.
    pub entry_point: PathBuf,
    /// File extensions (without the dot) that belong to this language.
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// How the analyzer runtime is discovered and validated.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Command names probed in order of preference.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
    /// Arguments that make a candidate print its version.
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
    /// Package the selected runtime must be able to load. `None` skips the check.
    #[serde(default = "default_capability")]
    pub capability: Option<String>,
    /// Arguments that exit 0 iff the capability loads; `{capability}` is substituted.
    #[serde(default = "default_capability_args")]
    pub capability_args: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            version_args: default_version_args(),
            capability: default_capability(),
            capability_args: default_capability_args(),
        }
    }
}

fn default_candidates() -> Vec<String> {
    vec!["python3".into(), "python".into(), "py".into()]
}

fn default_version_args() -> Vec<String> {
    vec!["--version".into()]
}

fn default_capability() -> Option<String> {
    Some("lark".into())
}

fn default_capability_args() -> Vec<String> {
    vec!["-c".into(), "import {capability}".into()]
}

/// What happened to a document in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentEventKind {
    Opened,
    Changed,
    Saved,
    /// The document became the active editor (focus or tab switch).
    Activated,
    Closed,
}

impl DocumentEventKind {
    /// Whether this trigger bypasses the debounce window.
    #[must_use]
    pub fn is_immediate(self) -> bool {
        matches!(self, Self::Opened | Self::Saved | Self::Activated)
    }
}

/// Snapshot of a document as the editor saw it when the event fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub uri: DocumentUri,
    pub language_id: LanguageId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
    pub kind: DocumentEventKind,
    pub document: DocumentSnapshot,
}

impl DocumentEvent {
    #[must_use]
    pub fn new(
        kind: DocumentEventKind,
        uri: impl Into<String>,
        language_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            document: DocumentSnapshot {
                uri: DocumentUri::new(uri),
                language_id: LanguageId::new(language_id),
                text: text.into(),
            },
        }
    }
}

/// An event emitted by the lint subsystem.
#[derive(Debug, Clone)]
pub enum LintEvent {
    /// The full diagnostic set for a document was replaced.
    Diagnostics {
        uri: DocumentUri,
        sequence: Sequence,
        items: Vec<Diagnostic>,
    },
    /// A worker went away; the next request for its language respawns it.
    WorkerStopped {
        language: LanguageId,
        reason: WorkerStopReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStopReason {
    SpawnFailed(String),
    Crashed(String),
}

impl fmt::Display for WorkerStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(msg) => write!(f, "failed to start: {msg}"),
            Self::Crashed(msg) => write!(f, "crashed: {msg}"),
        }
    }
}

/// Lifecycle of the worker slot for one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Uninitialized,
    Starting,
    Idle,
    Busy,
    Crashed,
    Terminated,
}

/// Immutable snapshot of all published diagnostics, suitable for UI rendering.
///
/// Counts are computed from `documents`, never cached alongside it.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    /// Per-document diagnostics, sorted with error-containing documents first.
    documents: Vec<(DocumentUri, Vec<Diagnostic>)>,
}

impl DiagnosticsSnapshot {
    pub(crate) fn new(documents: Vec<(DocumentUri, Vec<Diagnostic>)>) -> Self {
        Self { documents }
    }

    #[must_use]
    pub fn documents(&self) -> &[(DocumentUri, Vec<Diagnostic>)] {
        &self.documents
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn count_where(&self, pred: impl Fn(&Diagnostic) -> bool) -> usize {
        self.documents
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| pred(d))
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_where(|d| d.severity().is_error())
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_where(|d| !d.severity().is_error())
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.documents.iter().map(|(_, items)| items.len()).sum()
    }

    /// Format a compact status string like "E:3 W:5".
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}
