//! Wire records exchanged with analyzer workers.
//!
//! Request: `{"code": "<source text>"}`. Response: a JSON array of issues.

use lintbridge_types::Issue;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct AnalyzeRequest<'a> {
    pub code: &'a str,
}

/// Serialize a request as a single line (without the separator).
pub(crate) fn encode_request(text: &str) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&AnalyzeRequest { code: text })
}

/// Decode exactly one response frame.
pub(crate) fn decode_response(frame: &[u8]) -> Result<Vec<Issue>, serde_json::Error> {
    serde_json::from_slice(frame)
}
