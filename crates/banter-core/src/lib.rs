// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types and boundary traits for the Banter dispatch orchestrator.
//!
//! This crate defines the shared vocabulary of the system: the error
//! taxonomy the dispatcher's retry policy runs on, the message and
//! classification types, and the traits that isolate the core from its
//! external collaborators (message store, transport, content handlers).

pub mod error;
pub mod traits;
pub mod types;

pub use error::BanterError;
pub use traits::{ContentHandler, MessageSource, TransportSender};
pub use types::{
    AttachmentRef, ClassifiedContent, ContentKind, ConversationContext, ConversationKey,
    DispatchEvent, HandlerInput, HandlerReply, HistoryEntry, HistoryRole, InboundMessage,
    MessageService, OutboundReply, SessionHandle, UsageEvent, UsageFeature,
};
