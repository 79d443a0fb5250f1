// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment's flat deserialization errors into miette diagnostics
//! a person can act on. An unknown key is underlined in the TOML file it
//! came from and paired with a fuzzy-matched correction when it looks
//! like a typo of a valid key.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler floor below which a correction is more likely to confuse
/// than help. `intervall_secs` scores well above this against
/// `interval_secs`; unrelated keys land below it.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration problem, rendered through miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(banter::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest valid key, when one is close enough.
        suggestion: Option<String>,
        /// Comma-separated valid keys for the section.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(
        code(banter::config::invalid_type),
        help("expected {expected}")
    )]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(banter::config::missing_key),
        help("add `{key} = <value>` to your banter.toml")
    )]
    MissingKey { key: String },

    #[error("validation error: {message}")]
    #[diagnostic(code(banter::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(banter::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Break a `figment::Error` apart into one `ConfigError` per underlying
/// problem. `toml_sources` maps file paths to their contents so unknown
/// keys can be underlined in place.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|e| convert_one(e, toml_sources))
        .collect()
}

fn convert_one(
    error: figment::error::Error,
    toml_sources: &[(String, String)],
) -> ConfigError {
    use figment::error::Kind;

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let valid: Vec<&str> = expected.to_vec();
            let (span, src) = locate_key(&error, field, toml_sources);
            ConfigError::UnknownKey {
                key: field.clone(),
                suggestion: closest_key(field, &valid),
                valid_keys: valid.join(", "),
                span,
                src,
            }
        }
        Kind::MissingField(field) => ConfigError::MissingKey {
            key: field.clone().into_owned(),
        },
        Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
            key: dotted_path(&error),
            detail: format!("found {actual}, expected {expected}"),
            expected: expected.to_string(),
            span: None,
            src: None,
        },
        _ => ConfigError::Other(format!("{error}")),
    }
}

fn dotted_path(error: &figment::error::Error) -> String {
    error
        .path
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Locate `field` in the TOML file the error was read from, yielding the
/// span and source for miette's underline. Either piece may be absent;
/// the diagnostic degrades to text-only in that case.
fn locate_key(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some(path) = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(p) => Some(p.display().to_string()),
            _ => None,
        })
    else {
        return (None, None);
    };

    let Some(content) = toml_sources
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(_, c)| c.as_str())
    else {
        return (None, None);
    };

    let section: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
    match key_offset(content, &section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(path, content.to_string())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` within its TOML section.
///
/// Walks the file line by line tracking the current `[section]`, so a key
/// that also appears under a different section is not misattributed. An
/// empty `path` means the top level, before any section header.
pub(crate) fn key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let wanted = path.first().map(String::as_str);
    let mut in_wanted = wanted.is_none();
    let mut offset = 0;

    for line in content.lines() {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed
            .trim_end()
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
        {
            in_wanted = wanted == Some(header.trim());
        } else if in_wanted {
            if let Some(rest) = trimmed.strip_prefix(field) {
                if matches!(rest.chars().next(), Some(' ' | '\t' | '=')) {
                    return Some(offset + (line.len() - trimmed.len()));
                }
            }
        }
        offset += line.len() + 1; // +1 for newline
    }

    None
}

/// The valid key most similar to `unknown`, if any clears the threshold.
pub(crate) fn closest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print every error to stderr through miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_key_catches_doubled_letter() {
        let valid = &["interval_secs", "batch_limit", "owned_addresses"];
        assert_eq!(
            closest_key("intervall_secs", valid),
            Some("interval_secs".to_string())
        );
    }

    #[test]
    fn closest_key_catches_transposition() {
        let valid = &["sender_capacity", "global_capacity"];
        assert_eq!(
            closest_key("sender_capcity", valid),
            Some("sender_capacity".to_string())
        );
    }

    #[test]
    fn closest_key_rejects_distant_typo() {
        let valid = &["interval_secs", "batch_limit"];
        assert_eq!(closest_key("zzzzzz", valid), None);
    }

    #[test]
    fn key_offset_finds_key_in_its_section() {
        let content = "[poller]\nintervall_secs = 2\n";
        let path = vec!["poller".to_string()];
        let offset = key_offset(content, &path, "intervall_secs").unwrap();
        assert_eq!(&content[offset..offset + 14], "intervall_secs");
    }

    #[test]
    fn key_offset_skips_same_key_in_other_section() {
        let content = "[dispatch]\nlimit = 1\n[poller]\nlimit = 2\n";
        let path = vec!["poller".to_string()];
        let offset = key_offset(content, &path, "limit").unwrap();
        assert_eq!(&content[offset..offset + 9], "limit = 2");
    }

    #[test]
    fn key_offset_top_level_stops_at_first_section() {
        let content = "verbose = true\n[poller]\nverbose = false\n";
        let offset = key_offset(content, &[], "verbose").unwrap();
        assert_eq!(offset, 0);
        assert!(key_offset(content, &[], "interval_secs").is_none());
    }
}
