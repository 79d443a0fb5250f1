// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Banter crates.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Normalized counterpart address identifying a single ongoing exchange.
///
/// Phone numbers collapse to digits with an optional leading `+`; email
/// addresses fold to lowercase. Equivalent representations of the same
/// address therefore map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Normalize a raw sender address into a conversation key.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        let phoneish = trimmed.chars().any(|c| c.is_ascii_digit())
            && trimmed
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'));

        if phoneish {
            let mut out = String::with_capacity(trimmed.len());
            if trimmed.starts_with('+') {
                out.push('+');
            }
            out.extend(trimmed.chars().filter(char::is_ascii_digit));
            Self(out)
        } else {
            Self(trimmed.to_ascii_lowercase())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery service a message arrived on. Replies go out on the same service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum MessageService {
    #[strum(serialize = "iMessage")]
    IMessage,
    #[strum(serialize = "SMS")]
    Sms,
}

/// Reference to an attachment row from the message store.
///
/// `stored_path` is whatever the store recorded, which may be `~`-prefixed
/// or stale. `resolved_path` is filled in once the reader has located the
/// file on disk; classification only trusts the resolved path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub stored_path: Option<String>,
    pub transfer_name: Option<String>,
    pub mime_type: Option<String>,
    pub resolved_path: Option<PathBuf>,
}

/// An inbound message read from the external store. Immutable once read;
/// identity is `row_id`, used for watermark deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable monotonic identifier from the store (ROWID).
    pub row_id: i64,
    /// Store-assigned globally unique identifier, if present.
    pub guid: String,
    /// Normalized counterpart address.
    pub conversation: ConversationKey,
    /// Sender address as recorded by the store.
    pub sender: String,
    /// The owned address this message was received on.
    pub recipient: String,
    pub body: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub sent_at: DateTime<Utc>,
    /// Self-sent echoes carry this flag and must never be dispatched.
    pub is_from_me: bool,
    pub service: MessageService,
}

/// Content kind a classified message routes to. Used for handler selection
/// and structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum ContentKind {
    Chat,
    ImageGeneration,
    Vision,
    Document,
    Audio,
    Mixed,
}

/// Tagged classification result. The dispatcher matches exhaustively over
/// these variants, so adding a content kind is a compile-checked change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassifiedContent {
    /// Plain conversational text.
    PlainText { text: String },
    /// A generation request extracted from trigger phrasing.
    ImageGeneration { prompt: String },
    /// An image attachment, with any accompanying text as instruction context.
    Image {
        path: PathBuf,
        caption: Option<String>,
    },
    /// A document attachment. `supported: false` marks a format the system
    /// recognizes but cannot process; it yields a capability notice instead
    /// of a handler call.
    Document {
        path: PathBuf,
        caption: Option<String>,
        supported: bool,
    },
    /// An audio attachment to transcribe and answer.
    Audio {
        path: PathBuf,
        caption: Option<String>,
    },
    /// Multiple attachments of differing kinds in one message. Parts are
    /// processed in order and their replies joined into one response.
    Mixed { parts: Vec<ClassifiedContent> },
}

impl ClassifiedContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            ClassifiedContent::PlainText { .. } => ContentKind::Chat,
            ClassifiedContent::ImageGeneration { .. } => ContentKind::ImageGeneration,
            ClassifiedContent::Image { .. } => ContentKind::Vision,
            ClassifiedContent::Document { .. } => ContentKind::Document,
            ClassifiedContent::Audio { .. } => ContentKind::Audio,
            ClassifiedContent::Mixed { .. } => ContentKind::Mixed,
        }
    }
}

/// Opaque reference to externally maintained AI conversation state.
/// Created lazily by a handler on first real use for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle(pub String);

/// Role of a history entry within a conversation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// One entry in a conversation's bounded history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Conversation state handed to a handler alongside the classified content.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    /// Rolling history window, oldest first.
    pub history: Vec<HistoryEntry>,
    /// AI-session handle, if one has been established for this key.
    pub session: Option<SessionHandle>,
    /// Follow-up context merged by the dispatcher. When set, the handler
    /// should prefer this over the raw message text.
    pub merged_query: Option<String>,
}

/// Input to a content handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerInput {
    pub conversation: ConversationKey,
    pub content: ClassifiedContent,
    pub context: ConversationContext,
}

/// Feature a usage record is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum UsageFeature {
    Chat,
    Vision,
    Document,
    Transcription,
    ImageGeneration,
    Search,
}

/// Token or unit consumption reported by a handler for one external call.
/// Cost derivation happens at the ledger, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub provider: String,
    pub model: String,
    pub feature: UsageFeature,
    pub input_units: u64,
    pub output_units: u64,
}

/// Result of a successful handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerReply {
    pub text: String,
    pub attachments: Vec<PathBuf>,
    /// A newly created session handle, if the handler established one.
    pub session: Option<SessionHandle>,
    pub usage: Vec<UsageEvent>,
}

/// An outbound reply addressed back through the transport that received
/// the inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundReply {
    pub conversation: ConversationKey,
    pub recipient: String,
    pub service: MessageService,
    pub text: String,
    pub attachments: Vec<PathBuf>,
}

/// Two-phase dispatcher output. An optional acknowledgement is emitted when
/// a handler is invoked; a terminal reply always follows. The transport
/// decides how to render each phase.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Acknowledgement(OutboundReply),
    Reply(OutboundReply),
}

impl DispatchEvent {
    pub fn reply(&self) -> &OutboundReply {
        match self {
            DispatchEvent::Acknowledgement(r) | DispatchEvent::Reply(r) => r,
        }
    }
}
