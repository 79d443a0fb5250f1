// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web search escalation for the Banter chat handler.
//!
//! The chat handler decides internally whether a query needs fresh web
//! results; this crate provides the detection heuristic and the search
//! client it uses.

pub mod client;
pub mod detection;

pub use client::{format_snippets, SearchClient, SearchResult};
pub use detection::wants_web_search;
