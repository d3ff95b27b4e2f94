//! Content extraction and token-budget heuristics.
//!
//! Content extraction and token-budget heuristics are treated as
//! external collaborators. This module defines the trait boundary the
//! [`crate::worker::Worker`] calls through and a minimal default good
//! enough to exercise the queue end-to-end without a real extraction
//! pipeline.

use serde_json::Value;

/// Pulls plain text out of a job's JSON payload.
pub trait ContentExtractor: Send + Sync {
    /// Returns the empty string when nothing extractable is found; the
    /// caller (the worker) treats that as the `NoExtractableContent` edge
    /// case.
    fn extract(&self, payload: &Value) -> String;
}

/// Reads a top-level `"content"` string field and trims it.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl ContentExtractor for PlainTextExtractor {
    fn extract(&self, payload: &Value) -> String {
        payload
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

const MIN_TOKENS: u32 = 256;
const MAX_TOKENS: u32 = 4096;

/// Cheap word-count heuristic for the output token budget. Not a real
/// tokenizer -- the real heuristic is an external collaborator.
pub fn estimate_max_tokens(content: &str) -> u32 {
    let words = content.split_whitespace().count() as f64;
    let estimate = (words * 1.3).round() as u32;
    estimate.clamp(MIN_TOKENS, MAX_TOKENS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_trimmed_content_field() {
        let extractor = PlainTextExtractor;
        let payload = json!({ "content": "  hello world  " });
        assert_eq!(extractor.extract(&payload), "hello world");
    }

    #[test]
    fn missing_content_field_yields_empty_string() {
        let extractor = PlainTextExtractor;
        let payload = json!({ "other": "field" });
        assert_eq!(extractor.extract(&payload), "");
    }

    #[test]
    fn token_budget_is_clamped_to_minimum() {
        assert_eq!(estimate_max_tokens("one two three"), MIN_TOKENS);
    }

    #[test]
    fn token_budget_is_clamped_to_maximum() {
        let long = "word ".repeat(10_000);
        assert_eq!(estimate_max_tokens(&long), MAX_TOKENS);
    }

    #[test]
    fn token_budget_scales_with_word_count() {
        let content = "word ".repeat(1000);
        let estimate = estimate_max_tokens(&content);
        assert!(estimate > MIN_TOKENS && estimate < MAX_TOKENS);
    }
}
