//! Failure classes of the lint pipeline.
//!
//! None of these escape [`LintManager`](crate::LintManager): each is logged
//! where it happens and the pipeline keeps running (or disables itself, for
//! [`LintError::RuntimeUnavailable`]).

use lintbridge_types::LanguageId;

#[derive(Debug, thiserror::Error)]
pub enum LintError {
    /// No candidate runtime resolved, or the best one lacks the capability package.
    #[error("no usable analyzer runtime: {reason}")]
    RuntimeUnavailable { reason: String },

    #[error("failed to spawn analyzer for '{language}': {source}")]
    WorkerSpawn {
        language: LanguageId,
        #[source]
        source: std::io::Error,
    },

    /// The analyzer answered, but the answer was not a list of issues.
    #[error("malformed analyzer response: {0}")]
    ProtocolDecode(#[from] serde_json::Error),

    #[error("analyzer for '{language}' crashed: {reason}")]
    WorkerCrash { language: LanguageId, reason: String },

    #[error("no analyzer registered for language '{language}'")]
    UnsupportedLanguage { language: LanguageId },

    #[error("analyzer for '{language}' is already serving a request")]
    WorkerBusy { language: LanguageId },

    #[error("lint pipeline has shut down")]
    ShutDown,
}

impl LintError {
    /// Whether the worker that produced this error can keep serving requests.
    #[must_use]
    pub fn worker_survives(&self) -> bool {
        matches!(self, Self::ProtocolDecode(_))
    }
}
