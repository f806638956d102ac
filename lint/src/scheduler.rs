//! Request scheduling: debounce, immediate triggers, per-language queues.
//!
//! The scheduler is a plain state machine driven by the pipeline task. It
//! owns the debounce timers (keyed by document) and the per-language request
//! queues; it never touches a worker. Time is passed in so the pipeline can
//! drive it from `tokio::time` and tests can drive it by hand.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use lintbridge_types::{DocumentUri, LanguageId, Sequence};
use tokio::time::Instant;

use crate::types::{DocumentEvent, DocumentEventKind};

/// A snapshot ready to be sent to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Request {
    pub uri: DocumentUri,
    pub language: LanguageId,
    pub text: String,
    pub sequence: Sequence,
    pub issued_at: Instant,
}

/// What the scheduler did with an incoming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// A request was stamped and queued for its language.
    Queued(Sequence),
    /// A debounce timer was (re)armed for the document.
    Debounced,
    /// The document was closed; its diagnostics should be cleared at `sequence`.
    Cleared { uri: DocumentUri, sequence: Sequence },
}

#[derive(Debug)]
struct DebounceTimer {
    deadline: Instant,
    language: LanguageId,
    text: String,
}

/// One worker's worth of pending work.
#[derive(Debug, Default)]
struct Lane {
    busy: bool,
    queue: VecDeque<Request>,
}

#[derive(Debug)]
pub(crate) struct RequestScheduler {
    debounce: Duration,
    timers: HashMap<DocumentUri, DebounceTimer>,
    sequences: HashMap<DocumentUri, Sequence>,
    lanes: HashMap<LanguageId, Lane>,
}

impl RequestScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            timers: HashMap::new(),
            sequences: HashMap::new(),
            lanes: HashMap::new(),
        }
    }

    pub fn on_event(&mut self, event: DocumentEvent, now: Instant) -> Outcome {
        let DocumentEvent { kind, document } = event;
        match kind {
            DocumentEventKind::Closed => {
                self.timers.remove(&document.uri);
                for lane in self.lanes.values_mut() {
                    lane.queue.retain(|req| req.uri != document.uri);
                }
                let sequence = self.next_sequence(&document.uri);
                Outcome::Cleared {
                    uri: document.uri,
                    sequence,
                }
            }
            kind if kind.is_immediate() => {
                self.timers.remove(&document.uri);
                let sequence = self.issue(document.uri, document.language_id, document.text, now);
                Outcome::Queued(sequence)
            }
            _ => {
                // Replacing the entry cancels the previous timer.
                self.timers.insert(
                    document.uri,
                    DebounceTimer {
                        deadline: now + self.debounce,
                        language: document.language_id,
                        text: document.text,
                    },
                );
                Outcome::Debounced
            }
        }
    }

    /// Earliest pending debounce deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|timer| timer.deadline).min()
    }

    /// Turn every expired timer into a queued request. Returns how many fired.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let due: Vec<DocumentUri> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= now)
            .map(|(uri, _)| uri.clone())
            .collect();
        for uri in &due {
            if let Some(timer) = self.timers.remove(uri) {
                self.issue(uri.clone(), timer.language, timer.text, now);
            }
        }
        due.len()
    }

    /// Pop the next request whose language has no exchange in flight, marking
    /// that language busy until [`Self::complete`].
    pub fn next_ready(&mut self) -> Option<Request> {
        let (_, lane) = self
            .lanes
            .iter_mut()
            .filter(|(_, lane)| !lane.busy && !lane.queue.is_empty())
            .min_by_key(|(_, lane)| lane.queue.front().map(|req| req.issued_at))?;
        let request = lane.queue.pop_front()?;
        lane.busy = true;
        Some(request)
    }

    /// The exchange for `language` finished (successfully or not).
    pub fn complete(&mut self, language: &LanguageId) {
        if let Some(lane) = self.lanes.get_mut(language) {
            lane.busy = false;
        }
    }

    /// Drop all timers and queued requests.
    pub fn cancel_all(&mut self) {
        self.timers.clear();
        for lane in self.lanes.values_mut() {
            lane.queue.clear();
        }
    }

    #[cfg(test)]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    #[cfg(test)]
    pub fn queued(&self, language: &LanguageId) -> usize {
        self.lanes.get(language).map_or(0, |lane| lane.queue.len())
    }

    fn next_sequence(&mut self, uri: &DocumentUri) -> Sequence {
        let next = self
            .sequences
            .get(uri)
            .map_or(Sequence::new(1), |last| last.next());
        self.sequences.insert(uri.clone(), next);
        next
    }

    fn issue(
        &mut self,
        uri: DocumentUri,
        language: LanguageId,
        text: String,
        now: Instant,
    ) -> Sequence {
        let sequence = self.next_sequence(&uri);
        let request = Request {
            uri,
            language,
            text,
            sequence,
            issued_at: now,
        };
        let lane = self.lanes.entry(request.language.clone()).or_default();
        // A queued request for the same document is superseded in place.
        if let Some(slot) = lane.queue.iter_mut().find(|queued| queued.uri == request.uri) {
            tracing::trace!(uri = %request.uri, sequence = %sequence, "Collapsed queued request");
            *slot = request;
        } else {
            lane.queue.push_back(request);
        }
        sequence
    }
}
