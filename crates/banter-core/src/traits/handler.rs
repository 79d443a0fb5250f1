// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content handler trait, the uniform interface behind which every
//! capability backend (chat, vision, document, audio, search, generation)
//! is swapped.

use async_trait::async_trait;

use crate::error::BanterError;
use crate::types::{ClassifiedContent, HandlerInput, HandlerReply};

/// A pluggable capability that turns classified content into a reply.
///
/// Handlers are free to escalate internally (a chat handler may run a web
/// search before composing its answer); the dispatcher only sees the final
/// `HandlerReply` or error. Errors must use the taxonomy in
/// [`BanterError`] so retry policy applies correctly.
#[async_trait]
pub trait ContentHandler: Send + Sync {
    /// Stable handler name, used in logs and usage attribution.
    fn name(&self) -> &str;

    /// Optional acknowledgement line emitted when this handler is invoked,
    /// before the terminal reply. Slow handlers use this to signal that
    /// work has started.
    fn acknowledgement(&self, _content: &ClassifiedContent) -> Option<String> {
        None
    }

    /// Process one classified message and produce a reply.
    async fn handle(&self, input: HandlerInput) -> Result<HandlerReply, BanterError>;
}
