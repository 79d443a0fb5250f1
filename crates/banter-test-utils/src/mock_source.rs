// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock message source for deterministic testing.
//!
//! `MockSource` implements `MessageSource` over an in-memory row set, with
//! scriptable fetch failures so retry behavior can be exercised.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use banter_core::types::{ConversationKey, InboundMessage, MessageService};
use banter_core::{BanterError, MessageSource};

/// Build a plain-text inbound message with the given row id and sender.
pub fn message_with_row_id(row_id: i64, sender: &str, body: &str) -> InboundMessage {
    InboundMessage {
        row_id,
        guid: format!("mock-{}", uuid::Uuid::new_v4()),
        conversation: ConversationKey::normalize(sender),
        sender: sender.to_string(),
        recipient: "+15550000000".to_string(),
        body: Some(body.to_string()),
        attachments: Vec::new(),
        sent_at: chrono::Utc::now(),
        is_from_me: false,
        service: MessageService::IMessage,
    }
}

/// A mock message source backed by an in-memory row set.
///
/// Rows injected via `push_message()` are returned by `fetch_after()` in
/// row-id order, exactly as a real store query would. Errors pushed via
/// `fail_next_fetch()` are consumed one per call before any rows are
/// served again.
pub struct MockSource {
    rows: Arc<Mutex<Vec<InboundMessage>>>,
    failures: Arc<Mutex<VecDeque<BanterError>>>,
    fetch_calls: Arc<Mutex<u64>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            fetch_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Add a row to the store. Rows may be pushed at any time, including
    /// while a poll loop is running against this source.
    pub async fn push_message(&self, msg: InboundMessage) {
        let mut rows = self.rows.lock().await;
        rows.push(msg);
        rows.sort_by_key(|m| m.row_id);
    }

    /// Script the next `fetch_after()` call to fail with the given error.
    /// Multiple queued failures are consumed in order.
    pub async fn fail_next_fetch(&self, err: BanterError) {
        self.failures.lock().await.push_back(err);
    }

    /// Number of `fetch_after()` calls made so far, failures included.
    pub async fn fetch_call_count(&self) -> u64 {
        *self.fetch_calls.lock().await
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for MockSource {
    async fn fetch_after(
        &self,
        after: i64,
        limit: u32,
    ) -> Result<Vec<InboundMessage>, BanterError> {
        *self.fetch_calls.lock().await += 1;
        if let Some(err) = self.failures.lock().await.pop_front() {
            return Err(err);
        }
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|m| m.row_id > after)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn latest_row_id(&self) -> Result<i64, BanterError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().map(|m| m.row_id).max().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_after_respects_watermark_and_limit() {
        let source = MockSource::new();
        for id in 1..=5 {
            source
                .push_message(message_with_row_id(id, "+15551234567", "hi"))
                .await;
        }

        let rows = source.fetch_after(2, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_id, 3);
        assert_eq!(rows[1].row_id, 4);
    }

    #[tokio::test]
    async fn scripted_failure_is_consumed_once() {
        let source = MockSource::new();
        source
            .push_message(message_with_row_id(1, "+15551234567", "hi"))
            .await;
        source
            .fail_next_fetch(BanterError::StoreUnavailable {
                message: "db locked".to_string(),
                source: None,
            })
            .await;

        assert!(source.fetch_after(0, 10).await.is_err());
        let rows = source.fetch_after(0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(source.fetch_call_count().await, 2);
    }

    #[tokio::test]
    async fn latest_row_id_is_zero_when_empty() {
        let source = MockSource::new();
        assert_eq!(source.latest_row_id().await.unwrap(), 0);

        source
            .push_message(message_with_row_id(42, "+15551234567", "hi"))
            .await;
        assert_eq!(source.latest_row_id().await.unwrap(), 42);
    }
}
