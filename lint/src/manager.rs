//! `LintManager` facade: the public API consumed by hosts.
//!
//! Construction IS activation: `start()` locates the runtime and spawns the
//! pipeline task. A manager whose runtime could not be located has no
//! pipeline at all (state-as-location) and silently ignores events.

use std::collections::BTreeMap;

use lintbridge_types::{CodeAction, Diagnostic, DocumentUri, LanguageId, Range};
use tokio::sync::mpsc;

use crate::diagnostics::DiagnosticsStore;
use crate::pipeline::{self, PipelineHandle};
use crate::quickfix;
use crate::runtime::{Runtime, RuntimeLocator};
use crate::types::{
    DiagnosticsSnapshot, DocumentEvent, LintConfig, LintEvent, WorkerState, WorkerStopReason,
};

/// Public facade for the lint subsystem.
pub struct LintManager {
    pipeline: Option<PipelineHandle>,
    diagnostics: DiagnosticsStore,
    event_rx: mpsc::UnboundedReceiver<LintEvent>,
    #[cfg(test)]
    event_tx: mpsc::UnboundedSender<LintEvent>,
}

impl LintManager {
    /// Locate the analyzer runtime and start the pipeline.
    ///
    /// Never fails: when linting is disabled in `config`, or no usable runtime
    /// exists, this logs once and returns a manager that ignores every event.
    pub async fn start(config: LintConfig) -> Self {
        if !config.enabled {
            tracing::info!("Linting disabled by configuration");
            return Self::disabled();
        }
        match RuntimeLocator::shared(&config.runtime).locate().await {
            Ok(runtime) => Self::with_runtime(&config, runtime),
            Err(e) => {
                tracing::warn!("Linting disabled: {e}");
                Self::disabled()
            }
        }
    }

    /// Start the pipeline with an already located runtime.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_runtime(config: &LintConfig, runtime: Runtime) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pipeline = pipeline::spawn(config, runtime, event_tx.clone());
        Self {
            pipeline: Some(pipeline),
            diagnostics: DiagnosticsStore::new(),
            event_rx,
            #[cfg(test)]
            event_tx,
        }
    }

    fn disabled() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        #[cfg(not(test))]
        drop(event_tx);
        Self {
            pipeline: None,
            diagnostics: DiagnosticsStore::new(),
            event_rx,
            #[cfg(test)]
            event_tx,
        }
    }

    /// Whether a pipeline is running. State-as-location: it is in the option.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Forward an editor event to the scheduler.
    pub async fn handle_document_event(&self, event: DocumentEvent) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        if let Err(e) = pipeline.send(event).await {
            tracing::warn!("Dropping document event: {e}");
        }
    }

    /// Drain pending events, up to `budget`, into the diagnostics store.
    ///
    /// Non-blocking: returns immediately if nothing is pending.
    pub fn poll_events(&mut self, budget: usize) -> usize {
        self.drain_events(budget).len()
    }

    /// Like [`Self::poll_events`], but hands the drained events back so a
    /// host can forward them after applying.
    pub fn drain_events(&mut self, budget: usize) -> Vec<LintEvent> {
        let mut drained = Vec::new();
        while drained.len() < budget {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.apply(&event);
                    drained.push(event);
                }
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        drained
    }

    /// Wait for the next event, applying it to the store before returning it.
    ///
    /// Returns `None` once the pipeline is gone (or was never started).
    pub async fn next_event(&mut self) -> Option<LintEvent> {
        let event = self.event_rx.recv().await?;
        self.apply(&event);
        Some(event)
    }

    fn apply(&mut self, event: &LintEvent) {
        match event {
            LintEvent::Diagnostics { uri, sequence, items } => {
                tracing::debug!(
                    uri = %uri,
                    sequence = %sequence,
                    count = items.len(),
                    "Diagnostics published"
                );
                self.diagnostics.update(uri.clone(), items.clone());
            }
            LintEvent::WorkerStopped { language, reason } => match reason {
                WorkerStopReason::SpawnFailed(msg) => {
                    tracing::debug!(language = %language, error = %msg, "Analyzer worker failed to start");
                }
                WorkerStopReason::Crashed(msg) => {
                    tracing::debug!(language = %language, error = %msg, "Analyzer worker stopped");
                }
            },
        }
    }

    /// Currently published diagnostics for `uri`.
    #[must_use]
    pub fn diagnostics(&self, uri: &DocumentUri) -> &[Diagnostic] {
        self.diagnostics.get(uri)
    }

    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Quick fixes for the published diagnostics of `uri` that touch `range`.
    #[must_use]
    pub fn code_actions(&self, uri: &DocumentUri, range: Range) -> Vec<CodeAction> {
        quickfix::quick_fixes(self.diagnostics.get(uri), range)
    }

    /// Lifecycle state of each configured language's worker slot.
    #[must_use]
    pub fn worker_states(&self) -> BTreeMap<LanguageId, WorkerState> {
        self.pipeline
            .as_ref()
            .map(PipelineHandle::worker_states)
            .unwrap_or_default()
    }

    /// Cancel all timers and close every worker. Further events are ignored.
    pub async fn shutdown(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            tracing::info!("Shutting down lint pipeline...");
            pipeline.shutdown().await;
        }
    }

    /// Get a reference to the event sender (for testing).
    #[cfg(test)]
    pub(crate) fn event_tx(&self) -> &mpsc::UnboundedSender<LintEvent> {
        &self.event_tx
    }
}
