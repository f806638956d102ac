//! Core domain types for lintbridge.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! The lint pipeline, configuration, and binary all speak in these types.

mod diagnostic;
mod ids;
mod text;

pub use diagnostic::{Diagnostic, Issue, Position, Range, Severity};
pub use ids::{DocumentUri, LanguageId, Sequence};
pub use text::{CodeAction, TextEdit, apply_edit, apply_edits, byte_offset};
