//! The pipeline task: the single event loop behind [`crate::LintManager`].
//!
//! Document events, debounce deadlines and finished exchanges are all
//! handled here, one at a time. Exchanges themselves run on spawned tasks
//! that own the checked-out worker and report back with a [`Completion`],
//! so a slow analyzer never blocks events for other documents.

use std::time::Duration;

use lintbridge_types::{Diagnostic, DocumentUri, Issue, Sequence};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::diagnostics::DiagnosticTranslator;
use crate::error::LintError;
use crate::pool::{ProcessPool, WorkerStates};
use crate::runtime::Runtime;
use crate::scheduler::{Outcome, Request, RequestScheduler};
use crate::types::{DocumentEvent, LintConfig, LintEvent, WorkerStopReason};
use crate::worker::Worker;

/// Channel capacity for host → pipeline commands.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

pub(crate) enum Command {
    Document(DocumentEvent),
    Shutdown(oneshot::Sender<()>),
}

/// A finished exchange, handing the worker back to the pipeline.
struct Completion {
    worker: Worker,
    request: Request,
    outcome: Result<Vec<Issue>, LintError>,
}

/// Host-side handle to a running pipeline task.
pub(crate) struct PipelineHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    states: watch::Receiver<WorkerStates>,
}

impl PipelineHandle {
    pub async fn send(&self, event: DocumentEvent) -> Result<(), LintError> {
        self.commands
            .send(Command::Document(event))
            .await
            .map_err(|_| LintError::ShutDown)
    }

    pub fn worker_states(&self) -> WorkerStates {
        self.states.borrow().clone()
    }

    /// Stop the pipeline: cancel timers, close every worker, wait for the task.
    pub async fn shutdown(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        if let Err(e) = self.task.await {
            tracing::warn!("Lint pipeline task ended abnormally: {e}");
        }
    }
}

pub(crate) struct Pipeline {
    scheduler: RequestScheduler,
    pool: ProcessPool,
    translator: DiagnosticTranslator,
    request_timeout: Duration,
    events: mpsc::UnboundedSender<LintEvent>,
    completions: mpsc::UnboundedSender<Completion>,
    in_flight: usize,
}

/// Spawn the pipeline task on the current Tokio runtime.
pub(crate) fn spawn(
    config: &LintConfig,
    runtime: Runtime,
    events: mpsc::UnboundedSender<LintEvent>,
) -> PipelineHandle {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (completions_tx, completions_rx) = mpsc::unbounded_channel();

    let pool = ProcessPool::new(runtime, config.entry_points());
    let states = pool.subscribe();
    let pipeline = Pipeline {
        scheduler: RequestScheduler::new(Duration::from_millis(config.debounce_ms)),
        pool,
        translator: DiagnosticTranslator::new(),
        request_timeout: Duration::from_millis(config.request_timeout_ms),
        events,
        completions: completions_tx,
        in_flight: 0,
    };
    let task = tokio::spawn(pipeline.run(commands_rx, completions_rx));

    PipelineHandle {
        commands: commands_tx,
        task,
        states,
    }
}

impl Pipeline {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        let ack = loop {
            let deadline = self.scheduler.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Document(event)) => self.on_document(event),
                    Some(Command::Shutdown(ack)) => break Some(ack),
                    // Every handle dropped without an explicit shutdown.
                    None => break None,
                },
                Some(completion) = completions.recv() => self.on_completion(completion).await,
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let fired = self.scheduler.fire_due(Instant::now());
                    tracing::trace!(fired, "Debounce timers expired");
                }
            }
            self.dispatch();
        };

        self.drain(&mut completions).await;
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn on_document(&mut self, event: DocumentEvent) {
        let language = &event.document.language_id;
        if !self.pool.supports(language) {
            tracing::trace!(
                uri = %event.document.uri,
                language = %language,
                "No analyzer for language; ignoring event"
            );
            return;
        }
        match self.scheduler.on_event(event, Instant::now()) {
            Outcome::Queued(sequence) => {
                tracing::trace!(sequence = %sequence, "Lint request queued");
            }
            Outcome::Debounced => {}
            Outcome::Cleared { uri, sequence } => {
                if let Some(items) = self.translator.accept(&uri, sequence, &[]) {
                    self.publish(uri, sequence, items);
                }
            }
        }
    }

    /// Start an exchange for every language that has work and a free worker.
    fn dispatch(&mut self) {
        while let Some(request) = self.scheduler.next_ready() {
            match self.pool.checkout(&request.language) {
                Ok(worker) => self.start_exchange(worker, request),
                Err(e) => {
                    tracing::warn!(
                        language = %request.language,
                        uri = %request.uri,
                        "Failed to start analyzer worker: {e}"
                    );
                    self.scheduler.complete(&request.language);
                    self.emit(LintEvent::WorkerStopped {
                        language: request.language,
                        reason: WorkerStopReason::SpawnFailed(e.to_string()),
                    });
                }
            }
        }
    }

    fn start_exchange(&mut self, mut worker: Worker, request: Request) {
        let completions = self.completions.clone();
        let timeout = self.request_timeout;
        self.in_flight += 1;
        tokio::spawn(async move {
            let outcome = worker.exchange(&request.text, timeout).await;
            let _ = completions.send(Completion {
                worker,
                request,
                outcome,
            });
        });
    }

    async fn on_completion(&mut self, completion: Completion) {
        self.in_flight -= 1;
        let Completion {
            worker,
            request,
            outcome,
        } = completion;
        self.scheduler.complete(&request.language);

        match outcome {
            Ok(issues) => {
                self.checkin(worker).await;
                let elapsed = request.issued_at.elapsed();
                if let Some(items) = self.translator.accept(&request.uri, request.sequence, &issues)
                {
                    tracing::debug!(
                        uri = %request.uri,
                        sequence = %request.sequence,
                        count = items.len(),
                        elapsed_ms = elapsed.as_millis(),
                        "Diagnostics accepted"
                    );
                    self.publish(request.uri, request.sequence, items);
                }
            }
            Err(e) if e.worker_survives() => {
                // Previously published diagnostics stay as they are.
                tracing::warn!(
                    uri = %request.uri,
                    sequence = %request.sequence,
                    "Discarding analyzer response: {e}"
                );
                self.checkin(worker).await;
            }
            Err(e) => {
                tracing::warn!(
                    language = %request.language,
                    uri = %request.uri,
                    "Analyzer worker crashed: {e}"
                );
                drop(worker);
                self.pool.mark_crashed(&request.language);
                self.emit(LintEvent::WorkerStopped {
                    language: request.language,
                    reason: WorkerStopReason::Crashed(e.to_string()),
                });
            }
        }
    }

    async fn checkin(&mut self, worker: Worker) {
        if let Some(worker) = self.pool.checkin(worker) {
            worker.shutdown().await;
        }
    }

    fn publish(&self, uri: DocumentUri, sequence: Sequence, items: Vec<Diagnostic>) {
        self.emit(LintEvent::Diagnostics {
            uri,
            sequence,
            items,
        });
    }

    fn emit(&self, event: LintEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Lint event receiver dropped");
        }
    }

    /// Teardown: no new requests, idle workers closed, in-flight exchanges
    /// allowed to finish (bounded by the request timeout) and then closed.
    async fn drain(mut self, completions: &mut mpsc::UnboundedReceiver<Completion>) {
        self.scheduler.cancel_all();
        for worker in self.pool.close() {
            worker.shutdown().await;
        }
        while self.in_flight > 0 {
            let Some(completion) = completions.recv().await else {
                break;
            };
            self.in_flight -= 1;
            match completion.outcome {
                Err(e) if !e.worker_survives() => {
                    self.pool.mark_crashed(&completion.request.language);
                }
                _ => self.checkin(completion.worker).await,
            }
        }
        tracing::info!("Lint pipeline stopped");
    }
}
