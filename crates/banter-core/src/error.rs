// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Banter dispatch orchestrator.

use thiserror::Error;

/// The primary error type used across all Banter boundary traits and core operations.
///
/// Variants map directly onto the failure taxonomy the dispatcher acts on:
/// retryable transient failures, terminal request failures, store outages,
/// rate-gate denials, and internal invariant violations.
#[derive(Debug, Error)]
pub enum BanterError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// State database errors (connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The external message store could not be queried (locked, missing, I/O).
    ///
    /// The poller treats this as a transport problem: it backs off and keeps
    /// retrying without advancing the watermark.
    #[error("message store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A transient external failure (network error, remote rate limit, 5xx).
    /// Dispatch retries these with capped exponential backoff.
    #[error("transient external error: {message}")]
    Transient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A permanent request failure (unsupported content, policy rejection).
    /// Never retried; the user receives the explanation directly.
    #[error("permanent request error: {message}")]
    Permanent { message: String },

    /// The local rate gate denied the dispatch before any handler was invoked.
    #[error("rate limited for scope {scope}")]
    RateLimited { scope: String },

    /// A handler attempt exceeded its bounded timeout.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Outbound transport failure (delivery command failed or rejected).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal invariant violations. Fatal to the single message being
    /// processed, never to the process.
    #[error("internal invariant violation: {0}")]
    Invariant(String),
}

impl BanterError {
    /// Whether the dispatcher should retry the failed attempt.
    ///
    /// Only transient external failures and attempt timeouts are retryable.
    /// Everything else either terminates the dispatch with a user-visible
    /// explanation or is handled by a dedicated path (rate gate, poll loop).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BanterError::Transient { .. } | BanterError::Timeout { .. }
        )
    }

    /// Shorthand for a transient error without an underlying source.
    pub fn transient(message: impl Into<String>) -> Self {
        BanterError::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a permanent request error.
    pub fn permanent(message: impl Into<String>) -> Self {
        BanterError::Permanent {
            message: message.into(),
        }
    }
}
