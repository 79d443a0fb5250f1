// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content handler implementations backed by the OpenAI API.
//!
//! One handler per classified kind. Each turns its payload into a chat,
//! vision, transcription, or generation call and reports unit counts back
//! to the dispatcher for the usage ledger. The chat handler escalates to
//! a web search on its own when the query looks time-sensitive; the
//! dispatcher only sees the final reply.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::{debug, info};

use banter_core::types::{
    ClassifiedContent, ConversationContext, HandlerInput, HandlerReply, SessionHandle,
    UsageEvent, UsageFeature,
};
use banter_core::{BanterError, ContentHandler};
use banter_search::{format_snippets, wants_web_search, SearchClient};

use crate::client::OpenAiClient;

const SYSTEM_PROMPT: &str = "You are a helpful assistant replying inside a text-message \
conversation. Keep replies concise and conversational; avoid markdown formatting.";

/// Largest slice of a text document inlined into a prompt.
const DOCUMENT_INLINE_LIMIT: usize = 8_000;

const PROVIDER: &str = "openai";

fn usage_event(model: &str, feature: UsageFeature, input: u64, output: u64) -> UsageEvent {
    UsageEvent {
        provider: PROVIDER.to_string(),
        model: model.to_string(),
        feature,
        input_units: input,
        output_units: output,
    }
}

/// System message plus the conversation's rolling history window.
fn base_messages(context: &ConversationContext) -> Vec<Value> {
    let mut messages = vec![json!({"role": "system", "content": SYSTEM_PROMPT})];
    for entry in &context.history {
        messages.push(json!({
            "role": entry.role.to_string(),
            "content": entry.content,
        }));
    }
    messages
}

/// Keep the existing session handle or mint one on first real use.
fn ensure_session(context: &ConversationContext) -> SessionHandle {
    context
        .session
        .clone()
        .unwrap_or_else(|| SessionHandle(uuid::Uuid::new_v4().to_string()))
}

fn mismatched(handler: &str) -> BanterError {
    BanterError::Invariant(format!("{handler} handler received mismatched content"))
}

/// Cut `text` to at most `limit` bytes without splitting a character.
fn truncate_to_boundary(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Conversational text replies, with internal web-search escalation.
pub struct ChatHandler {
    client: Arc<OpenAiClient>,
    model: String,
    max_tokens: u32,
    search: Option<Arc<SearchClient>>,
}

impl ChatHandler {
    pub fn new(
        client: Arc<OpenAiClient>,
        model: String,
        max_tokens: u32,
        search: Option<Arc<SearchClient>>,
    ) -> Self {
        Self {
            client,
            model,
            max_tokens,
            search,
        }
    }
}

#[async_trait]
impl ContentHandler for ChatHandler {
    fn name(&self) -> &str {
        "chat"
    }

    async fn handle(&self, input: HandlerInput) -> Result<HandlerReply, BanterError> {
        let ClassifiedContent::PlainText { text } = &input.content else {
            return Err(mismatched("chat"));
        };
        // The dispatcher merges follow-up context into the query; prefer it.
        let query = input
            .context
            .merged_query
            .clone()
            .unwrap_or_else(|| text.clone());

        if query.trim().is_empty() {
            return Ok(HandlerReply {
                text: "I didn't catch anything in that message. What can I help with?"
                    .to_string(),
                attachments: Vec::new(),
                session: Some(ensure_session(&input.context)),
                usage: Vec::new(),
            });
        }

        let mut usage = Vec::new();
        let mut messages = base_messages(&input.context);

        if let Some(search) = &self.search {
            if wants_web_search(&query) {
                debug!(conversation = %input.conversation, "escalating to web search");
                let results = search.search(&query).await?;
                if !results.is_empty() {
                    messages.push(json!({
                        "role": "system",
                        "content": format!(
                            "Current web results relevant to the user's question:\n{}",
                            format_snippets(&results)
                        ),
                    }));
                    usage.push(UsageEvent {
                        provider: "google".to_string(),
                        model: "custom-search".to_string(),
                        feature: UsageFeature::Search,
                        input_units: 1,
                        output_units: 0,
                    });
                }
            }
        }

        messages.push(json!({"role": "user", "content": query}));
        let outcome = self.client.chat(&self.model, messages, self.max_tokens).await?;
        usage.push(usage_event(
            &self.model,
            UsageFeature::Chat,
            outcome.prompt_tokens,
            outcome.completion_tokens,
        ));

        Ok(HandlerReply {
            text: outcome.text,
            attachments: Vec::new(),
            session: Some(ensure_session(&input.context)),
            usage,
        })
    }
}

fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

/// Image understanding through the vision-capable chat endpoint.
pub struct VisionHandler {
    client: Arc<OpenAiClient>,
    model: String,
    max_tokens: u32,
}

impl VisionHandler {
    pub fn new(client: Arc<OpenAiClient>, model: String, max_tokens: u32) -> Self {
        Self {
            client,
            model,
            max_tokens,
        }
    }
}

#[async_trait]
impl ContentHandler for VisionHandler {
    fn name(&self) -> &str {
        "vision"
    }

    async fn handle(&self, input: HandlerInput) -> Result<HandlerReply, BanterError> {
        let ClassifiedContent::Image { path, caption } = &input.content else {
            return Err(mismatched("vision"));
        };

        let bytes = tokio::fs::read(path).await.map_err(|e| BanterError::Permanent {
            message: format!("image file unreadable: {e}"),
        })?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let data_url = format!("data:{};base64,{encoded}", image_mime(path));

        let instruction = caption
            .clone()
            .unwrap_or_else(|| "What's in this image?".to_string());

        let mut messages = base_messages(&input.context);
        messages.push(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": instruction},
                {"type": "image_url", "image_url": {"url": data_url}},
            ],
        }));

        let outcome = self.client.chat(&self.model, messages, self.max_tokens).await?;
        Ok(HandlerReply {
            text: outcome.text,
            attachments: Vec::new(),
            session: Some(ensure_session(&input.context)),
            usage: vec![usage_event(
                &self.model,
                UsageFeature::Vision,
                outcome.prompt_tokens,
                outcome.completion_tokens,
            )],
        })
    }
}

/// Document questions. Format parsing is an external concern; plain-text
/// formats are inlined, binary formats are referenced by name so the
/// model can still act on the caption and conversation context.
pub struct DocumentHandler {
    client: Arc<OpenAiClient>,
    model: String,
    max_tokens: u32,
}

impl DocumentHandler {
    pub fn new(client: Arc<OpenAiClient>, model: String, max_tokens: u32) -> Self {
        Self {
            client,
            model,
            max_tokens,
        }
    }

    async fn document_context(path: &Path) -> String {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document");
        let is_plain = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("csv")
        );
        if is_plain {
            if let Ok(content) = tokio::fs::read_to_string(path).await {
                let snippet = truncate_to_boundary(&content, DOCUMENT_INLINE_LIMIT);
                return format!("The user sent a document named {name}. Contents:\n{snippet}");
            }
        }
        format!("The user sent a document named {name}.")
    }
}

#[async_trait]
impl ContentHandler for DocumentHandler {
    fn name(&self) -> &str {
        "document"
    }

    async fn handle(&self, input: HandlerInput) -> Result<HandlerReply, BanterError> {
        let ClassifiedContent::Document { path, caption, .. } = &input.content else {
            return Err(mismatched("document"));
        };

        let instruction = input
            .context
            .merged_query
            .clone()
            .or_else(|| caption.clone())
            .unwrap_or_else(|| "Summarize this document.".to_string());

        let mut messages = base_messages(&input.context);
        messages.push(json!({
            "role": "system",
            "content": Self::document_context(path).await,
        }));
        messages.push(json!({"role": "user", "content": instruction}));

        let outcome = self.client.chat(&self.model, messages, self.max_tokens).await?;
        Ok(HandlerReply {
            text: outcome.text,
            attachments: Vec::new(),
            session: Some(ensure_session(&input.context)),
            usage: vec![usage_event(
                &self.model,
                UsageFeature::Document,
                outcome.prompt_tokens,
                outcome.completion_tokens,
            )],
        })
    }
}

/// Voice messages: transcribe, then answer the transcript.
pub struct AudioHandler {
    client: Arc<OpenAiClient>,
    transcription_model: String,
    chat_model: String,
    max_tokens: u32,
}

impl AudioHandler {
    pub fn new(
        client: Arc<OpenAiClient>,
        transcription_model: String,
        chat_model: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            transcription_model,
            chat_model,
            max_tokens,
        }
    }
}

#[async_trait]
impl ContentHandler for AudioHandler {
    fn name(&self) -> &str {
        "audio"
    }

    async fn handle(&self, input: HandlerInput) -> Result<HandlerReply, BanterError> {
        let ClassifiedContent::Audio { path, caption } = &input.content else {
            return Err(mismatched("audio"));
        };

        let transcript = self
            .client
            .transcribe(&self.transcription_model, path)
            .await?;
        // Billing unit for transcription is the minute, rounded up.
        let minutes = (transcript.duration_secs / 60.0).ceil().max(1.0) as u64;
        let mut usage = vec![usage_event(
            &self.transcription_model,
            UsageFeature::Transcription,
            minutes,
            0,
        )];

        if transcript.text.is_empty() {
            return Ok(HandlerReply {
                text: "I couldn't make out any speech in that voice message.".to_string(),
                attachments: Vec::new(),
                session: Some(ensure_session(&input.context)),
                usage,
            });
        }
        info!(chars = transcript.text.len(), "voice message transcribed");

        let query = match caption {
            Some(c) => format!("{c}\n\nTranscript of my voice message: {}", transcript.text),
            None => transcript.text.clone(),
        };
        let mut messages = base_messages(&input.context);
        messages.push(json!({"role": "user", "content": query}));

        let outcome = self
            .client
            .chat(&self.chat_model, messages, self.max_tokens)
            .await?;
        usage.push(usage_event(
            &self.chat_model,
            UsageFeature::Chat,
            outcome.prompt_tokens,
            outcome.completion_tokens,
        ));

        Ok(HandlerReply {
            text: outcome.text,
            attachments: Vec::new(),
            session: Some(ensure_session(&input.context)),
            usage,
        })
    }
}

/// Image synthesis. The generated asset is downloaded locally so the
/// transport can attach a real file.
pub struct ImageGenHandler {
    client: Arc<OpenAiClient>,
    model: String,
}

impl ImageGenHandler {
    pub fn new(client: Arc<OpenAiClient>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl ContentHandler for ImageGenHandler {
    fn name(&self) -> &str {
        "image_generation"
    }

    fn acknowledgement(&self, _content: &ClassifiedContent) -> Option<String> {
        Some("Working on your image, this can take a moment...".to_string())
    }

    async fn handle(&self, input: HandlerInput) -> Result<HandlerReply, BanterError> {
        let ClassifiedContent::ImageGeneration { prompt } = &input.content else {
            return Err(mismatched("image_generation"));
        };

        let url = self.client.generate_image(&self.model, prompt).await?;
        let dest = std::env::temp_dir().join(format!("banter-gen-{}.png", uuid::Uuid::new_v4()));
        self.client.download(&url, &dest).await?;
        info!(path = %dest.display(), "generated image downloaded");

        Ok(HandlerReply {
            text: "Here you go!".to_string(),
            attachments: vec![dest],
            session: input.context.session.clone(),
            usage: vec![usage_event(&self.model, UsageFeature::ImageGeneration, 1, 0)],
        })
    }
}
