// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for the Banter dispatch orchestrator.
//!
//! Two databases live here: the external message store, opened read-only
//! and treated as an unreliable transport, and Banter's own state database
//! holding the watermark and per-conversation session state.

pub mod attachments;
pub mod messages;
pub mod migrations;
pub mod state;

pub use attachments::{expand_tilde, AttachmentResolver};
pub use messages::{apple_timestamp_to_utc, ChatDbReader};
pub use state::{StateDb, StoredSession};
