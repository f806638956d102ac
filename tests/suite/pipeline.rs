//! End-to-end behaviour of `LintManager` against fake analyzers.

use std::time::Duration;

use lintbridge_lint::{
    DocumentEvent, DocumentEventKind, LintEvent, LintManager, Runtime, RuntimeVersion,
    WorkerState, WorkerStopReason,
};
use lintbridge_types::{DocumentUri, Position, Range, Sequence, Severity, apply_edit};

use crate::common::{
    FakeAnalyzer, UNEXPECTED_TOKEN, assert_quiet, config_for, csml, next_diagnostics, next_event,
    start,
};

const URI: &str = "file:///work/rules.csml";

fn uri() -> DocumentUri {
    DocumentUri::new(URI)
}

fn event(kind: DocumentEventKind, text: &str) -> DocumentEvent {
    DocumentEvent::new(kind, URI, "csml", text)
}

#[tokio::test]
async fn open_csml_publishes_error_and_quick_fix() {
    let analyzer = FakeAnalyzer::constant(UNEXPECTED_TOKEN);
    let mut manager = start(&analyzer, 300);
    let text = "rule {\n? -> allow\n}\n";

    manager
        .handle_document_event(event(DocumentEventKind::Opened, text))
        .await;
    let (sequence, items) = next_diagnostics(&mut manager, &uri()).await;

    assert_eq!(sequence, Sequence::new(1));
    assert_eq!(items.len(), 1);
    let diagnostic = &items[0];
    assert_eq!(
        diagnostic.range(),
        Range::new(Position::new(1, 0), Position::new(1, 1))
    );
    assert_eq!(diagnostic.severity(), Severity::Error);
    assert_eq!(diagnostic.message(), "Unexpected token");
    assert_eq!(diagnostic.code(), Some("replace-with-C"));
    assert_eq!(manager.diagnostics(&uri()), items.as_slice());

    let actions = manager.code_actions(&uri(), diagnostic.range());
    assert_eq!(actions.len(), 1);
    assert!(actions[0].is_preferred);
    assert_eq!(apply_edit(text, &actions[0].edit), "rule {\nC -> allow\n}\n");

    assert_eq!(manager.worker_states().get(&csml()), Some(&WorkerState::Idle));
    manager.shutdown().await;
}

#[tokio::test]
async fn edit_burst_sends_one_request_with_last_text() {
    let analyzer = FakeAnalyzer::recording("[]");
    let mut manager = start(&analyzer, 100);

    for i in 1..=5 {
        manager
            .handle_document_event(event(DocumentEventKind::Changed, &format!("v{i}")))
            .await;
    }

    let (sequence, items) = next_diagnostics(&mut manager, &uri()).await;
    assert_eq!(sequence, Sequence::new(1));
    assert!(items.is_empty());
    assert_quiet(&mut manager, Duration::from_millis(400)).await;
    assert_eq!(analyzer.requests(), vec![r#"{"code":"v5"}"#.to_string()]);

    manager.shutdown().await;
}

#[tokio::test]
async fn save_is_immediate_and_cancels_pending_edit() {
    let analyzer = FakeAnalyzer::recording("[]");
    let mut manager = start(&analyzer, 60_000);

    manager
        .handle_document_event(event(DocumentEventKind::Changed, "draft"))
        .await;
    manager
        .handle_document_event(event(DocumentEventKind::Saved, "saved"))
        .await;

    let (sequence, _) = next_diagnostics(&mut manager, &uri()).await;
    assert_eq!(sequence, Sequence::new(1));
    assert_eq!(analyzer.requests(), vec![r#"{"code":"saved"}"#.to_string()]);

    manager.shutdown().await;
}

#[tokio::test]
async fn crash_is_recovered_by_a_fresh_worker() {
    let analyzer = FakeAnalyzer::new("");
    let marker = analyzer.path("crashed-once");
    std::fs::write(
        &analyzer.script,
        format!(
            "if [ ! -f '{marker}' ]; then\n  : > '{marker}'\n  IFS= read -r line\n  exit 3\nfi\n\
             while IFS= read -r line; do printf '%s\\n' '{UNEXPECTED_TOKEN}'; done\n",
            marker = marker.display()
        ),
    )
    .unwrap();
    let mut manager = start(&analyzer, 300);

    manager
        .handle_document_event(event(DocumentEventKind::Opened, "x"))
        .await;
    match next_event(&mut manager).await {
        LintEvent::WorkerStopped { language, reason } => {
            assert_eq!(language, csml());
            assert!(matches!(reason, WorkerStopReason::Crashed(_)));
        }
        other => panic!("expected a crash, got {other:?}"),
    }
    assert_eq!(
        manager.worker_states().get(&csml()),
        Some(&WorkerState::Crashed)
    );
    assert!(manager.diagnostics(&uri()).is_empty());

    manager
        .handle_document_event(event(DocumentEventKind::Saved, "x"))
        .await;
    let (sequence, items) = next_diagnostics(&mut manager, &uri()).await;
    assert_eq!(sequence, Sequence::new(2));
    assert_eq!(items.len(), 1);
    assert_eq!(manager.worker_states().get(&csml()), Some(&WorkerState::Idle));

    manager.shutdown().await;
}

#[tokio::test]
async fn malformed_response_keeps_previous_diagnostics_and_worker() {
    let analyzer = FakeAnalyzer::new(&format!(
        "n=0\nwhile IFS= read -r line; do\n  n=$((n + 1))\n  case $n in\n    \
         1) printf '%s\\n' '{UNEXPECTED_TOKEN}' ;;\n    \
         2) echo 'Traceback (most recent call last):' ;;\n    \
         *) echo '[]' ;;\n  esac\ndone\n"
    ));
    let mut manager = start(&analyzer, 300);

    manager
        .handle_document_event(event(DocumentEventKind::Opened, "v1"))
        .await;
    let (_, items) = next_diagnostics(&mut manager, &uri()).await;
    assert_eq!(items.len(), 1);

    manager
        .handle_document_event(event(DocumentEventKind::Saved, "v2"))
        .await;
    assert_quiet(&mut manager, Duration::from_millis(400)).await;
    assert_eq!(manager.diagnostics(&uri()).len(), 1);

    manager
        .handle_document_event(event(DocumentEventKind::Saved, "v3"))
        .await;
    match next_event(&mut manager).await {
        LintEvent::Diagnostics {
            sequence, items, ..
        } => {
            assert_eq!(sequence, Sequence::new(3));
            assert!(items.is_empty());
        }
        other => panic!("worker should have survived, got {other:?}"),
    }
    assert!(manager.diagnostics(&uri()).is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn close_clears_diagnostics_and_fences_in_flight_response() {
    let analyzer = FakeAnalyzer::new(&format!(
        "while IFS= read -r line; do sleep 1; printf '%s\\n' '{UNEXPECTED_TOKEN}'; done\n"
    ));
    let mut manager = start(&analyzer, 300);

    manager
        .handle_document_event(event(DocumentEventKind::Opened, "x"))
        .await;
    manager
        .handle_document_event(event(DocumentEventKind::Closed, ""))
        .await;

    let (sequence, items) = next_diagnostics(&mut manager, &uri()).await;
    assert_eq!(sequence, Sequence::new(2));
    assert!(items.is_empty());

    // The answer to the open arrives after the close and must not resurface.
    assert_quiet(&mut manager, Duration::from_millis(2_000)).await;
    assert!(manager.diagnostics(&uri()).is_empty());
    assert!(manager.snapshot().is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn save_during_busy_exchange_is_answered_after_it() {
    let analyzer = FakeAnalyzer::new("");
    let log = analyzer.requests_log();
    std::fs::write(
        &analyzer.script,
        format!(
            "while IFS= read -r line; do\n  printf '%s\\n' \"$line\" >> '{}'\n  sleep 1\n  echo '[]'\ndone\n",
            log.display()
        ),
    )
    .unwrap();
    let mut manager = start(&analyzer, 300);

    manager
        .handle_document_event(event(DocumentEventKind::Opened, "v1"))
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        manager.worker_states().get(&csml()),
        Some(&WorkerState::Busy)
    );
    manager
        .handle_document_event(event(DocumentEventKind::Saved, "v2"))
        .await;

    let (first, _) = next_diagnostics(&mut manager, &uri()).await;
    assert_eq!(first, Sequence::new(1));
    let (second, _) = next_diagnostics(&mut manager, &uri()).await;
    assert_eq!(second, Sequence::new(2));
    assert_eq!(
        analyzer.requests(),
        vec![r#"{"code":"v1"}"#.to_string(), r#"{"code":"v2"}"#.to_string()]
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn spawn_failure_is_reported_and_retried_on_next_request() {
    let analyzer = FakeAnalyzer::constant("[]");
    let config = config_for(&analyzer.script, 300);
    let runtime = Runtime::new(
        analyzer.path("no-such-runtime"),
        RuntimeVersion::new(3, 12, 0),
    );
    let mut manager = LintManager::with_runtime(&config, runtime);

    for kind in [DocumentEventKind::Opened, DocumentEventKind::Activated] {
        manager.handle_document_event(event(kind, "x")).await;
        match next_event(&mut manager).await {
            LintEvent::WorkerStopped { reason, .. } => {
                assert!(matches!(reason, WorkerStopReason::SpawnFailed(_)));
            }
            other => panic!("expected a spawn failure, got {other:?}"),
        }
        assert_eq!(
            manager.worker_states().get(&csml()),
            Some(&WorkerState::Uninitialized)
        );
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn unknown_language_is_ignored() {
    let analyzer = FakeAnalyzer::recording("[]");
    let mut manager = start(&analyzer, 10);

    manager
        .handle_document_event(DocumentEvent::new(
            DocumentEventKind::Opened,
            "file:///work/script.py",
            "python",
            "print()",
        ))
        .await;
    assert_quiet(&mut manager, Duration::from_millis(300)).await;
    assert!(analyzer.requests().is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_worker_input_and_stops_events() {
    let analyzer = FakeAnalyzer::new("");
    let exited = analyzer.path("exited");
    std::fs::write(
        &analyzer.script,
        format!(
            "while IFS= read -r line; do echo '[]'; done\n: > '{}'\n",
            exited.display()
        ),
    )
    .unwrap();
    let mut manager = start(&analyzer, 300);

    manager
        .handle_document_event(event(DocumentEventKind::Opened, "x"))
        .await;
    next_diagnostics(&mut manager, &uri()).await;

    manager.shutdown().await;
    assert!(!manager.is_enabled());
    assert!(exited.exists(), "worker should see EOF and exit on its own");
    assert!(manager.next_event().await.is_none());

    // Events after shutdown are dropped without effect.
    manager
        .handle_document_event(event(DocumentEventKind::Saved, "y"))
        .await;
    assert_eq!(manager.poll_events(10), 0);
}
