// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation session state over the state database.
//!
//! Keeps a bounded FIFO history window per conversation key plus the
//! opaque AI session handle and the last topic for follow-up merging.
//! Callers are serialized per key by the dispatch workers, so reads and
//! writes here never race for the same conversation.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use banter_core::types::{ConversationKey, HistoryEntry, HistoryRole, SessionHandle};
use banter_core::BanterError;
use banter_store::{StateDb, StoredSession};

pub struct ConversationStore {
    db: Arc<StateDb>,
    window: usize,
}

impl ConversationStore {
    pub fn new(db: Arc<StateDb>, window: usize) -> Self {
        Self { db, window }
    }

    /// Load a conversation's session, or a fresh empty one if none exists.
    /// Nothing is persisted until the first exchange is recorded.
    pub async fn get_or_create(
        &self,
        key: &ConversationKey,
    ) -> Result<StoredSession, BanterError> {
        Ok(self.db.load_session(key).await?.unwrap_or_default())
    }

    /// Record one completed exchange: the user's message and the reply.
    ///
    /// Oldest entries are evicted first once the window is full. A session
    /// handle returned by the handler replaces the stored one; a `None`
    /// keeps whatever was there.
    pub async fn record_exchange(
        &self,
        key: &ConversationKey,
        user_text: &str,
        assistant_text: &str,
        session: Option<SessionHandle>,
        topic: Option<String>,
    ) -> Result<(), BanterError> {
        let mut stored = self.get_or_create(key).await?;
        let now = Utc::now();

        stored.history.push(HistoryEntry {
            role: HistoryRole::User,
            content: user_text.to_string(),
            at: now,
        });
        stored.history.push(HistoryEntry {
            role: HistoryRole::Assistant,
            content: assistant_text.to_string(),
            at: now,
        });
        while stored.history.len() > self.window {
            stored.history.remove(0);
        }

        if session.is_some() {
            stored.handle = session;
        }
        if topic.is_some() {
            stored.last_topic = topic;
        }
        stored.last_activity = Some(now);

        self.db.save_session(key, &stored).await
    }

    /// Drop all state for a conversation. The next message starts from a
    /// clean session with empty history.
    pub async fn reset(&self, key: &ConversationKey) -> Result<(), BanterError> {
        debug!(conversation = %key, "conversation reset");
        self.db.delete_session(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ConversationKey {
        ConversationKey::normalize("+15551234567")
    }

    async fn store(window: usize) -> ConversationStore {
        let db = Arc::new(StateDb::open_in_memory().await.unwrap());
        ConversationStore::new(db, window)
    }

    #[tokio::test]
    async fn get_or_create_returns_empty_session() {
        let store = store(10).await;
        let session = store.get_or_create(&key()).await.unwrap();
        assert!(session.history.is_empty());
        assert!(session.handle.is_none());
    }

    #[tokio::test]
    async fn exchanges_accumulate_in_order() {
        let store = store(10).await;
        let key = key();
        store
            .record_exchange(&key, "hello", "hi there", None, None)
            .await
            .unwrap();
        store
            .record_exchange(&key, "how are you", "doing well", None, None)
            .await
            .unwrap();

        let session = store.get_or_create(&key).await.unwrap();
        assert_eq!(session.history.len(), 4);
        assert_eq!(session.history[0].content, "hello");
        assert_eq!(session.history[0].role, HistoryRole::User);
        assert_eq!(session.history[3].content, "doing well");
        assert_eq!(session.history[3].role, HistoryRole::Assistant);
    }

    #[tokio::test]
    async fn window_evicts_oldest_first() {
        let store = store(4).await;
        let key = key();
        for i in 0..4 {
            store
                .record_exchange(&key, &format!("q{i}"), &format!("a{i}"), None, None)
                .await
                .unwrap();
        }

        let session = store.get_or_create(&key).await.unwrap();
        assert_eq!(session.history.len(), 4);
        assert_eq!(session.history[0].content, "q2");
        assert_eq!(session.history[3].content, "a3");
    }

    #[tokio::test]
    async fn session_handle_persists_until_replaced() {
        let store = store(10).await;
        let key = key();
        store
            .record_exchange(
                &key,
                "hi",
                "hello",
                Some(SessionHandle("thread-1".to_string())),
                None,
            )
            .await
            .unwrap();
        store
            .record_exchange(&key, "more", "sure", None, None)
            .await
            .unwrap();

        let session = store.get_or_create(&key).await.unwrap();
        assert_eq!(session.handle, Some(SessionHandle("thread-1".to_string())));
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let store = store(10).await;
        let key = key();
        store
            .record_exchange(
                &key,
                "hi",
                "hello",
                Some(SessionHandle("thread-1".to_string())),
                Some("weather".to_string()),
            )
            .await
            .unwrap();
        store.reset(&key).await.unwrap();

        let session = store.get_or_create(&key).await.unwrap();
        assert!(session.history.is_empty());
        assert!(session.handle.is_none());
        assert!(session.last_topic.is_none());
    }
}
