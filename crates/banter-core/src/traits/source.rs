// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message source trait for the external, append-only message store.

use async_trait::async_trait;

use crate::error::BanterError;
use crate::types::InboundMessage;

/// Read-only view of the external message store.
///
/// The poller owns the watermark; the source only answers "what is newer
/// than this id". Failures map to `BanterError::StoreUnavailable` so the
/// poll loop can back off and retry without losing messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch up to `limit` rows with id strictly greater than `after`,
    /// ordered ascending by id.
    async fn fetch_after(
        &self,
        after: i64,
        limit: u32,
    ) -> Result<Vec<InboundMessage>, BanterError>;

    /// The highest row id currently in the store. Used to initialize the
    /// watermark on first run so history is never replayed.
    async fn latest_row_id(&self) -> Result<i64, BanterError>;
}
