// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic content classification for the Banter dispatch orchestrator.

pub mod classifier;

pub use classifier::{classify, extract_generation_prompt, supported_formats_notice};
