//! Process pool: one analyzer worker per language, created on demand.
//!
//! A worker is either parked here (`Idle`) or checked out by exactly one
//! exchange (`Busy`). Crashed workers are dropped (the child is killed on
//! drop) and replaced lazily by the next checkout for that language.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use lintbridge_types::LanguageId;
use tokio::sync::watch;

use crate::error::LintError;
use crate::runtime::Runtime;
use crate::types::WorkerState;
use crate::worker::Worker;

pub(crate) type WorkerStates = BTreeMap<LanguageId, WorkerState>;

pub(crate) struct ProcessPool {
    runtime: Runtime,
    entry_points: BTreeMap<LanguageId, PathBuf>,
    idle: HashMap<LanguageId, Worker>,
    states: watch::Sender<WorkerStates>,
    closed: bool,
}

impl ProcessPool {
    pub fn new(runtime: Runtime, entry_points: BTreeMap<LanguageId, PathBuf>) -> Self {
        let initial = entry_points
            .keys()
            .map(|language| (language.clone(), WorkerState::Uninitialized))
            .collect();
        let (states, _) = watch::channel(initial);
        Self {
            runtime,
            entry_points,
            idle: HashMap::new(),
            states,
            closed: false,
        }
    }

    pub fn supports(&self, language: &LanguageId) -> bool {
        self.entry_points.contains_key(language)
    }

    pub fn state(&self, language: &LanguageId) -> WorkerState {
        self.states
            .borrow()
            .get(language)
            .copied()
            .unwrap_or(WorkerState::Uninitialized)
    }

    /// Observe lifecycle changes from outside the pipeline task.
    pub fn subscribe(&self) -> watch::Receiver<WorkerStates> {
        self.states.subscribe()
    }

    fn set_state(&self, language: &LanguageId, state: WorkerState) {
        self.states.send_modify(|states| {
            states.insert(language.clone(), state);
        });
    }

    /// Take the worker for `language`, spawning one if none is live.
    ///
    /// The worker stays `Busy` until it comes back through [`Self::checkin`]
    /// or is reported with [`Self::mark_crashed`].
    pub fn checkout(&mut self, language: &LanguageId) -> Result<Worker, LintError> {
        if self.closed {
            return Err(LintError::ShutDown);
        }
        if self.state(language) == WorkerState::Busy {
            return Err(LintError::WorkerBusy {
                language: language.clone(),
            });
        }

        if let Some(mut worker) = self.idle.remove(language) {
            if !worker.has_exited() {
                self.set_state(language, WorkerState::Busy);
                return Ok(worker);
            }
            tracing::warn!(language = %language, "Analyzer worker exited while idle");
            self.set_state(language, WorkerState::Crashed);
        }

        let entry_point = self
            .entry_points
            .get(language)
            .ok_or_else(|| LintError::UnsupportedLanguage {
                language: language.clone(),
            })?;

        self.set_state(language, WorkerState::Starting);
        match Worker::spawn(language, &self.runtime, entry_point) {
            Ok(worker) => {
                self.set_state(language, WorkerState::Busy);
                Ok(worker)
            }
            Err(e) => {
                self.set_state(language, WorkerState::Uninitialized);
                Err(e)
            }
        }
    }

    /// Park a worker that finished an exchange. Returns it back when the
    /// pool has been closed in the meantime, so the caller can shut it down.
    pub fn checkin(&mut self, worker: Worker) -> Option<Worker> {
        let language = worker.language().clone();
        if self.closed {
            self.set_state(&language, WorkerState::Terminated);
            return Some(worker);
        }
        self.set_state(&language, WorkerState::Idle);
        self.idle.insert(language, worker);
        None
    }

    /// Record that the checked-out worker for `language` died.
    pub fn mark_crashed(&mut self, language: &LanguageId) {
        let state = if self.closed {
            WorkerState::Terminated
        } else {
            WorkerState::Crashed
        };
        self.set_state(language, state);
    }

    /// Stop accepting checkouts and hand back every parked worker.
    pub fn close(&mut self) -> Vec<Worker> {
        self.closed = true;
        let workers: Vec<Worker> = self.idle.drain().map(|(_, worker)| worker).collect();
        self.states.send_modify(|states| {
            for state in states.values_mut() {
                if *state != WorkerState::Busy {
                    *state = WorkerState::Terminated;
                }
            }
        });
        workers
    }
}
