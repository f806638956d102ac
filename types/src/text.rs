//! Small pure text helpers and the edits applied by code actions.

use serde::{Deserialize, Serialize};

use crate::{Diagnostic, Position, Range};

/// Replace the text inside `range` with `new_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

/// A quick fix offered for one diagnostic.
///
/// Each action carries exactly one edit; applying it touches nothing outside
/// the diagnostic's range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAction {
    pub title: String,
    pub diagnostic: Diagnostic,
    pub edit: TextEdit,
    pub is_preferred: bool,
}

/// Byte offset of `position` in `text`.
///
/// Characters are counted as Unicode scalar values. Positions past the end
/// of a line clamp to the line end; lines past the end of the text clamp to
/// the end of the text.
#[must_use]
pub fn byte_offset(text: &str, position: Position) -> usize {
    let mut line_start = 0;
    for _ in 0..position.line {
        match text[line_start..].find('\n') {
            Some(newline) => line_start += newline + 1,
            None => return text.len(),
        }
    }

    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |newline| line_start + newline);
    let line = &text[line_start..line_end];

    line.char_indices()
        .nth(position.character as usize)
        .map_or(line_end, |(offset, _)| line_start + offset)
}

/// Apply a single edit, returning the new text.
#[must_use]
pub fn apply_edit(text: &str, edit: &TextEdit) -> String {
    let start = byte_offset(text, edit.range.start);
    let end = byte_offset(text, edit.range.end).max(start);

    let mut out = String::with_capacity(text.len() + edit.new_text.len());
    out.push_str(&text[..start]);
    out.push_str(&edit.new_text);
    out.push_str(&text[end..]);
    out
}

/// Apply several non-overlapping edits. Edits are applied back to front so
/// earlier positions stay valid; overlapping edits after the first are skipped.
#[must_use]
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.range.start.cmp(&a.range.start));

    let mut out = text.to_string();
    let mut floor: Option<Position> = None;
    for edit in sorted {
        if floor.is_some_and(|floor| edit.range.end > floor) {
            continue;
        }
        out = apply_edit(&out, edit);
        floor = Some(edit.range.start);
    }
    out
}
