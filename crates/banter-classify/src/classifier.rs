// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic classification of inbound messages.
//!
//! Pure mapping from [`InboundMessage`] to [`ClassifiedContent`]: no I/O,
//! no side effects, so every routing decision is unit-testable without an
//! external service. Attachments route by extension; bare text routes by
//! generation trigger phrasing, otherwise plain chat.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use banter_core::types::{AttachmentRef, ClassifiedContent, InboundMessage};

/// Image extensions the vision handler accepts.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic"];

/// Audio extensions the transcription handler accepts.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "aac", "caf", "amr"];

/// Document extensions the document handler accepts.
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "xlsx", "xls", "rtf", "txt", "csv"];

/// Generation trigger: a verb phrase at the start of the message, an
/// optional article, then at least one word of subject matter.
static GENERATION_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(generate|create|draw|show me|imagine)(\s+(a|an|the))?\s+(?P<subject>.+)$")
        .expect("static pattern is valid")
});

/// A message that is mostly a link is a share, not a generation request.
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("static pattern is valid"));

/// Human-readable list of supported attachment formats, used in the
/// capability notice for unsupported types.
pub fn supported_formats_notice() -> String {
    format!(
        "I can read images ({}), documents ({}) and voice messages ({}).",
        IMAGE_EXTENSIONS.join(", "),
        DOCUMENT_EXTENSIONS.join(", "),
        AUDIO_EXTENSIONS.join(", ")
    )
}

/// Classify one inbound message.
///
/// Decision order: attachments win over text; a single attachment yields
/// its kind directly with any body text preserved as instruction context;
/// multiple attachments yield `Mixed` with the caption attached to the
/// first part. Without attachments, generation triggers are checked before
/// falling back to plain text.
pub fn classify(message: &InboundMessage) -> ClassifiedContent {
    let caption = message
        .body
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let attachments: Vec<&AttachmentRef> = message
        .attachments
        .iter()
        .filter(|a| a.resolved_path.is_some())
        .collect();

    match attachments.len() {
        0 => classify_text(caption.as_deref().unwrap_or_default()),
        1 => classify_attachment(attachments[0], caption),
        _ => {
            let parts = attachments
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    // Caption applies to the first part only.
                    let part_caption = if i == 0 { caption.clone() } else { None };
                    classify_attachment(a, part_caption)
                })
                .collect();
            ClassifiedContent::Mixed { parts }
        }
    }
}

fn classify_text(text: &str) -> ClassifiedContent {
    if let Some(prompt) = extract_generation_prompt(text) {
        debug!(prompt = %prompt, "classified as image generation");
        return ClassifiedContent::ImageGeneration { prompt };
    }
    ClassifiedContent::PlainText {
        text: text.to_string(),
    }
}

fn classify_attachment(
    attachment: &AttachmentRef,
    caption: Option<String>,
) -> ClassifiedContent {
    // classify() filtered out unresolved attachments already.
    let path: PathBuf = attachment.resolved_path.clone().unwrap_or_default();
    let ext = extension_of(&path);

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        ClassifiedContent::Image { path, caption }
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        ClassifiedContent::Audio { path, caption }
    } else if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        ClassifiedContent::Document {
            path,
            caption,
            supported: true,
        }
    } else {
        debug!(extension = %ext, "unsupported attachment type");
        ClassifiedContent::Document {
            path,
            caption,
            supported: false,
        }
    }
}

/// Extract a generation prompt from bare text, if the message is a
/// generation request.
///
/// Returns `None` for messages that are mostly a shared link even when
/// they happen to start with a trigger verb.
pub fn extract_generation_prompt(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || is_mostly_url(trimmed) {
        return None;
    }

    GENERATION_TRIGGER
        .captures(trimmed)
        .and_then(|caps| caps.name("subject"))
        .map(|m| m.as_str().trim().to_string())
        // A lone article after the verb carries no subject matter.
        .filter(|s| {
            !s.is_empty() && !matches!(s.to_ascii_lowercase().as_str(), "a" | "an" | "the")
        })
}

/// True when over half of the text is URL characters.
fn is_mostly_url(text: &str) -> bool {
    let url_len: usize = URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().len())
        .sum();
    url_len * 2 > text.len()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}
