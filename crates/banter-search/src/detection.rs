// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic detection of queries that need fresh web results.
//!
//! The chat handler escalates to a web search when the message looks like
//! a current-events or factual lookup that a model's training data cannot
//! answer. Weather queries always escalate. Messages that are mostly a
//! shared link never do.

use std::sync::LazyLock;

use regex::Regex;

/// Openers that signal a factual lookup.
const QUESTION_OPENERS: &[&str] = &[
    "who is", "who are", "who won", "what is", "what are", "what happened", "when is", "when did",
    "where is", "how much", "how many",
];

/// Terms that tie a query to the present moment.
const TEMPORAL_MARKERS: &[&str] = &[
    "today", "tonight", "yesterday", "this week", "latest", "current", "currently", "right now",
    "news", "score", "price", "stock",
];

/// Explicit search verbs anywhere in the message.
const SEARCH_VERBS: &[&str] = &["search for", "search the web", "look up", "google"];

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("static pattern is valid"));

/// True when over half of the text is URL characters; such messages are
/// shares, not lookups.
fn is_mostly_url(text: &str) -> bool {
    let url_len: usize = URL_PATTERN.find_iter(text).map(|m| m.as_str().len()).sum();
    url_len * 2 > text.len()
}

/// Decide whether a plain-text query warrants a web search.
pub fn wants_web_search(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || is_mostly_url(trimmed) {
        return false;
    }
    let lower = trimmed.to_lowercase();

    // Weather is always time-sensitive.
    if lower.contains("weather") || lower.contains("forecast") {
        return true;
    }

    if SEARCH_VERBS.iter().any(|v| lower.contains(v)) {
        return true;
    }

    let opens_with_question = QUESTION_OPENERS.iter().any(|q| lower.starts_with(q));
    let has_temporal = TEMPORAL_MARKERS.iter().any(|m| lower.contains(m));

    opens_with_question && has_temporal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_always_searches() {
        assert!(wants_web_search("what's the weather in Lisbon?"));
        assert!(wants_web_search("forecast for tomorrow"));
    }

    #[test]
    fn explicit_search_verbs_search() {
        assert!(wants_web_search("look up the tallest building in Asia"));
        assert!(wants_web_search("can you google rust 2024 edition"));
    }

    #[test]
    fn question_plus_temporal_searches() {
        assert!(wants_web_search("who won the game today"));
        assert!(wants_web_search("what is the current price of gold"));
    }

    #[test]
    fn timeless_questions_do_not_search() {
        assert!(!wants_web_search("what is the capital of France"));
        assert!(!wants_web_search("how are you doing"));
    }

    #[test]
    fn shared_links_do_not_search() {
        assert!(!wants_web_search(
            "look https://example.com/a/really/long/path/that/dominates/the/text"
        ));
    }

    #[test]
    fn empty_text_does_not_search() {
        assert!(!wants_web_search("   "));
    }
}
