//! Lint bridge: schedules analyzer requests for editor documents and turns
//! the answers into diagnostics and quick fixes.

pub mod codec;
pub mod types;

pub(crate) mod diagnostics;
pub(crate) mod pipeline;
pub(crate) mod pool;
pub(crate) mod protocol;
pub(crate) mod scheduler;
pub(crate) mod worker;

mod error;
mod manager;
mod quickfix;
mod runtime;

pub use diagnostics::translate;
pub use error::LintError;
pub use manager::LintManager;
pub use quickfix::{quick_fix, quick_fixes, replacement_for};
pub use runtime::{Runtime, RuntimeLocator, RuntimeVersion};
pub use types::{
    DiagnosticsSnapshot, DocumentEvent, DocumentEventKind, DocumentSnapshot, LanguageConfig,
    LintConfig, LintEvent, RuntimeConfig, WorkerState, WorkerStopReason,
};
