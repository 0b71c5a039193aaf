//! Error bodies returned by the API.

use serde::{Deserialize, Serialize};

/// Longest error body excerpt kept in diagnostics.
pub const MAX_ERROR_EXCERPT: usize = 512;

/// JSON body Buildkite sends with non-success statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

/// Reduce an error response body to a single short line.
///
/// Uses the `message` field when the body is a Buildkite error document,
/// otherwise the first line of the raw text truncated to [`MAX_ERROR_EXCERPT`]
/// characters.
pub fn summarize_error_body(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ApiErrorBody>(body) {
        return err.message;
    }

    let line = body.lines().next().unwrap_or("").trim();
    match line.char_indices().nth(MAX_ERROR_EXCERPT) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}
