// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-backed content handlers for the Banter dispatch orchestrator.

pub mod client;
pub mod handlers;

pub use client::{ChatOutcome, OpenAiClient, TranscriptOutcome};
pub use handlers::{
    AudioHandler, ChatHandler, DocumentHandler, ImageGenHandler, VisionHandler,
};
