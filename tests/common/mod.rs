//! Shared test utilities and fixtures
//!
//! Fake analyzers are POSIX shell scripts run by `/bin/sh`, standing in for
//! the real runtime + analyzer pair.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lintbridge_lint::{LanguageConfig, LintConfig, LintEvent, LintManager, Runtime, RuntimeVersion};
use lintbridge_types::{Diagnostic, DocumentUri, LanguageId, Sequence};
use tempfile::TempDir;

/// How long a test waits for any single pipeline event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// The response from the end-to-end `.csml` scenario.
pub const UNEXPECTED_TOKEN: &str = r#"[{"line":1,"column":0,"length":1,"severity":2,"message":"Unexpected token","code":"replace-with-C"}]"#;

/// A scratch directory holding one fake analyzer script.
pub struct FakeAnalyzer {
    pub dir: TempDir,
    pub script: PathBuf,
}

impl FakeAnalyzer {
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("analyzer.sh");
        std::fs::write(&script, body).expect("write analyzer script");
        Self { dir, script }
    }

    /// Answer every request with `response`.
    pub fn constant(response: &str) -> Self {
        Self::new(&format!(
            "while IFS= read -r line; do printf '%s\\n' '{response}'; done\n"
        ))
    }

    /// Answer every request with `response`, logging each request line.
    pub fn recording(response: &str) -> Self {
        let analyzer = Self::new("");
        let log = analyzer.requests_log();
        std::fs::write(
            &analyzer.script,
            format!(
                "while IFS= read -r line; do\n  printf '%s\\n' \"$line\" >> '{}'\n  printf '%s\\n' '{response}'\ndone\n",
                log.display()
            ),
        )
        .expect("write analyzer script");
        analyzer
    }

    pub fn requests_log(&self) -> PathBuf {
        self.dir.path().join("requests.log")
    }

    /// Request lines seen so far, across every worker process.
    pub fn requests(&self) -> Vec<String> {
        std::fs::read_to_string(self.requests_log())
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn sh_runtime() -> Runtime {
    Runtime::new("/bin/sh", RuntimeVersion::new(0, 0, 0))
}

pub fn csml() -> LanguageId {
    LanguageId::new("csml")
}

/// Config registering `script` as the `csml` analyzer.
pub fn config_for(script: &Path, debounce_ms: u64) -> LintConfig {
    let mut languages = BTreeMap::new();
    languages.insert(
        csml(),
        LanguageConfig {
            entry_point: script.to_path_buf(),
            extensions: vec!["csml".to_string()],
        },
    );
    LintConfig {
        debounce_ms,
        request_timeout_ms: 2_000,
        languages,
        ..LintConfig::default()
    }
}

pub fn start(analyzer: &FakeAnalyzer, debounce_ms: u64) -> LintManager {
    LintManager::with_runtime(&config_for(&analyzer.script, debounce_ms), sh_runtime())
}

pub async fn next_event(manager: &mut LintManager) -> LintEvent {
    tokio::time::timeout(EVENT_TIMEOUT, manager.next_event())
        .await
        .expect("timed out waiting for a lint event")
        .expect("event channel closed")
}

/// Wait for the next diagnostics publication for `uri`, skipping others.
pub async fn next_diagnostics(
    manager: &mut LintManager,
    uri: &DocumentUri,
) -> (Sequence, Vec<Diagnostic>) {
    loop {
        if let LintEvent::Diagnostics {
            uri: published,
            sequence,
            items,
        } = next_event(manager).await
            && &published == uri
        {
            return (sequence, items);
        }
    }
}

/// Assert nothing is published for `quiet`.
pub async fn assert_quiet(manager: &mut LintManager, quiet: Duration) {
    if let Ok(event) = tokio::time::timeout(quiet, manager.next_event()).await {
        panic!("unexpected lint event: {event:?}");
    }
}
