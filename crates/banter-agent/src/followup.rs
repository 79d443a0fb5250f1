// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up detection for short pronoun-laden queries.
//!
//! "what about page 3?" sent shortly after a question about a document
//! should inherit that document as its topic. The heuristic is
//! deliberately narrow: short message, contains an anaphoric pronoun or
//! opens with a continuation like "what about", and the previous exchange
//! is recent. Anything else is a fresh query.

use chrono::{DateTime, Utc};

use banter_config::model::FollowupConfig;

/// Pronouns that signal the message refers back to an earlier subject.
const PRONOUNS: &[&str] = &[
    "it", "they", "them", "their", "its", "this", "that", "these", "those",
];

/// Interrogative openers that continue the prior subject without naming
/// it, as in "what about page 3?".
const CONTINUATION_OPENERS: &[&str] = &["what about", "how about", "and what"];

/// Words too generic to carry a topic on their own.
const STOPWORDS: &[&str] = &[
    "about", "after", "again", "before", "could", "should", "there", "these",
    "those", "what", "when", "where", "which", "while", "would", "please",
];

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
}

/// Whether `text` reads as a follow-up to a recent exchange.
pub fn looks_like_followup(
    text: &str,
    config: &FollowupConfig,
    last_activity: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if !config.enabled {
        return false;
    }
    let Some(last) = last_activity else {
        return false;
    };
    let age = now.signed_duration_since(last);
    if age.num_seconds() < 0 || age.num_seconds() as u64 > config.recency_secs {
        return false;
    }
    if words(text).count() > config.max_words {
        return false;
    }
    let lower = text.trim().to_ascii_lowercase();
    if CONTINUATION_OPENERS.iter().any(|o| lower.starts_with(o)) {
        return true;
    }
    words(text).any(|w| PRONOUNS.contains(&w.to_ascii_lowercase().as_str()))
}

/// Pull the likely topic out of a query: content words longer than four
/// characters, or capitalized words past the sentence start. Returns up
/// to four of them, or `None` when nothing qualifies.
pub fn extract_topic(text: &str) -> Option<String> {
    let picked: Vec<&str> = words(text)
        .enumerate()
        .filter(|(i, w)| {
            if STOPWORDS.contains(&w.to_ascii_lowercase().as_str()) {
                return false;
            }
            w.len() > 4 || (*i > 0 && w.chars().next().is_some_and(char::is_uppercase))
        })
        .map(|(_, w)| w)
        .take(4)
        .collect();

    if picked.is_empty() {
        None
    } else {
        Some(picked.join(" "))
    }
}

/// Combine a follow-up query with the remembered topic.
pub fn merge_query(text: &str, topic: &str) -> String {
    format!("{} (about {topic})", text.trim())
}
