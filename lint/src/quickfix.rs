//! Quick fixes keyed by the analyzer's opaque diagnostic codes.

use lintbridge_types::{CodeAction, Diagnostic, Range, TextEdit};

/// Literal replacement for a diagnostic code, if the code has one.
#[must_use]
pub fn replacement_for(code: &str) -> Option<&'static str> {
    match code {
        "replace-with-C" => Some("C"),
        "replace-with-??" => Some("??"),
        "replace-with-*" => Some("*"),
        "universal-rule" => Some("default"),
        _ => None,
    }
}

/// The single preferred fix for `diagnostic`: replace exactly its range.
#[must_use]
pub fn quick_fix(diagnostic: &Diagnostic) -> Option<CodeAction> {
    let replacement = replacement_for(diagnostic.code()?)?;
    Some(CodeAction {
        title: format!("Replace with '{replacement}'"),
        diagnostic: diagnostic.clone(),
        edit: TextEdit {
            range: diagnostic.range(),
            new_text: replacement.to_string(),
        },
        is_preferred: true,
    })
}

/// Fixes for every diagnostic touching `range`, in input order.
pub fn quick_fixes<'a>(
    diagnostics: impl IntoIterator<Item = &'a Diagnostic>,
    range: Range,
) -> Vec<CodeAction> {
    diagnostics
        .into_iter()
        .filter(|d| d.range().intersects(&range))
        .filter_map(quick_fix)
        .collect()
}
