// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only reader for the external message database.
//!
//! The store is an uncontrolled, append-only SQLite database owned by the
//! messaging application. It is opened read-only; every failure maps to
//! `StoreUnavailable` so the poll loop backs off and retries instead of
//! treating a locked database as a bug.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OpenFlags;
use tokio_rusqlite::Connection;
use tracing::debug;

use banter_core::types::{AttachmentRef, ConversationKey, InboundMessage, MessageService};
use banter_core::{BanterError, MessageSource};

use crate::attachments::{expand_tilde, AttachmentResolver};

/// Seconds between the unix epoch and the Apple epoch (2001-01-01 UTC).
const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

/// Convert a raw store timestamp to UTC.
///
/// Modern rows carry nanoseconds since the Apple epoch; rows written by
/// old OS versions carry whole seconds. Values too small to be nanosecond
/// counts are treated as seconds.
pub fn apple_timestamp_to_utc(raw: i64) -> DateTime<Utc> {
    let (secs, nanos) = if raw > 1_000_000_000_000 {
        (raw / 1_000_000_000, (raw % 1_000_000_000) as u32)
    } else {
        (raw, 0)
    };
    DateTime::from_timestamp(secs + APPLE_EPOCH_OFFSET, nanos).unwrap_or_else(Utc::now)
}

fn store_err(message: &str, e: impl std::error::Error + Send + Sync + 'static) -> BanterError {
    BanterError::StoreUnavailable {
        message: message.to_string(),
        source: Some(Box::new(e)),
    }
}

struct RawRow {
    row_id: i64,
    guid: String,
    sender: String,
    recipient: String,
    body: Option<String>,
    service: String,
    date: i64,
    attachments: Vec<(Option<String>, Option<String>, Option<String>)>,
}

/// Read-only view over the external message database.
pub struct ChatDbReader {
    conn: Connection,
    resolver: AttachmentResolver,
}

impl ChatDbReader {
    /// Open the message database read-only.
    pub async fn open(chat_db_path: &str, attachments_root: &str) -> Result<Self, BanterError> {
        let path = expand_tilde(chat_db_path);
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&path, flags)
            .await
            .map_err(|e| store_err("failed to open message database", e))?;
        debug!(path = %path.display(), "message database opened read-only");
        Ok(Self {
            conn,
            resolver: AttachmentResolver::new(expand_tilde(attachments_root)),
        })
    }

    fn build_message(&self, raw: RawRow) -> InboundMessage {
        let attachments = raw
            .attachments
            .into_iter()
            .map(|(stored_path, transfer_name, mime_type)| {
                let resolved_path = self
                    .resolver
                    .resolve(stored_path.as_deref(), transfer_name.as_deref());
                AttachmentRef {
                    stored_path,
                    transfer_name,
                    mime_type,
                    resolved_path,
                }
            })
            .collect();

        let service = if raw.service == "iMessage" {
            MessageService::IMessage
        } else {
            MessageService::Sms
        };

        InboundMessage {
            row_id: raw.row_id,
            guid: raw.guid,
            conversation: ConversationKey::normalize(&raw.sender),
            sender: raw.sender,
            recipient: raw.recipient,
            body: raw.body,
            attachments,
            sent_at: apple_timestamp_to_utc(raw.date),
            is_from_me: false,
            service,
        }
    }
}

#[async_trait]
impl MessageSource for ChatDbReader {
    async fn fetch_after(
        &self,
        after: i64,
        limit: u32,
    ) -> Result<Vec<InboundMessage>, BanterError> {
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<RawRow>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT m.ROWID, m.guid, COALESCE(h.id, ''),
                            COALESCE(m.destination_caller_id, ''),
                            m.text, COALESCE(m.service, 'iMessage'), m.date
                     FROM message m
                     LEFT JOIN handle h ON m.handle_id = h.ROWID
                     WHERE m.is_from_me = 0 AND m.ROWID > ?1
                     ORDER BY m.ROWID ASC
                     LIMIT ?2",
                )?;
                let mut raw_rows = Vec::new();
                let mapped = stmt.query_map(rusqlite::params![after, limit], |row| {
                    Ok(RawRow {
                        row_id: row.get(0)?,
                        guid: row.get(1)?,
                        sender: row.get(2)?,
                        recipient: row.get(3)?,
                        body: row.get(4)?,
                        service: row.get(5)?,
                        date: row.get(6)?,
                        attachments: Vec::new(),
                    })
                })?;
                for row in mapped {
                    raw_rows.push(row?);
                }

                let mut att_stmt = conn.prepare(
                    "SELECT a.filename, a.transfer_name, a.mime_type
                     FROM message_attachment_join maj
                     JOIN attachment a ON maj.attachment_id = a.ROWID
                     WHERE maj.message_id = ?1",
                )?;
                for raw in &mut raw_rows {
                    let atts = att_stmt.query_map(rusqlite::params![raw.row_id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?;
                    for att in atts {
                        raw.attachments.push(att?);
                    }
                }

                Ok(raw_rows)
            })
            .await
            .map_err(|e| store_err("message query failed", e))?;

        Ok(rows.into_iter().map(|raw| self.build_message(raw)).collect())
    }

    async fn latest_row_id(&self) -> Result<i64, BanterError> {
        self.conn
            .call(|conn| -> Result<i64, rusqlite::Error> {
                let id: i64 =
                    conn.query_row("SELECT COALESCE(MAX(ROWID), 0) FROM message", [], |row| {
                        row.get(0)
                    })?;
                Ok(id)
            })
            .await
            .map_err(|e| store_err("max row id query failed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SCHEMA: &str = "
        CREATE TABLE message (
            ROWID INTEGER PRIMARY KEY,
            guid TEXT NOT NULL,
            text TEXT,
            handle_id INTEGER,
            service TEXT,
            destination_caller_id TEXT,
            date INTEGER NOT NULL,
            is_from_me INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE handle (
            ROWID INTEGER PRIMARY KEY,
            id TEXT NOT NULL
        );
        CREATE TABLE attachment (
            ROWID INTEGER PRIMARY KEY,
            filename TEXT,
            transfer_name TEXT,
            mime_type TEXT
        );
        CREATE TABLE message_attachment_join (
            message_id INTEGER NOT NULL,
            attachment_id INTEGER NOT NULL
        );
    ";

    async fn fixture_db(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("chat.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(TEST_SCHEMA).unwrap();
        conn.execute_batch(
            "INSERT INTO handle (ROWID, id) VALUES (1, '+1 (555) 123-4567');
             INSERT INTO message (ROWID, guid, text, handle_id, service, destination_caller_id, date, is_from_me)
             VALUES (10, 'g-10', 'hello there', 1, 'iMessage', 'me@example.com', 700000000000000000, 0),
                    (11, 'g-11', 'outbound echo', 1, 'iMessage', 'me@example.com', 700000001000000000, 1),
                    (12, 'g-12', NULL, 1, 'SMS', 'me@example.com', 700000002000000000, 0);
             INSERT INTO attachment (ROWID, filename, transfer_name, mime_type)
             VALUES (5, '/does/not/exist/photo.png', 'photo.png', 'image/png');
             INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (12, 5);",
        )
        .unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn fetch_after_skips_outbound_and_orders_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_db(&dir).await;
        let reader = ChatDbReader::open(&path, dir.path().to_str().unwrap())
            .await
            .unwrap();

        let messages = reader.fetch_after(0, 50).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].row_id, 10);
        assert_eq!(messages[1].row_id, 12);
        assert!(messages.iter().all(|m| !m.is_from_me));
    }

    #[tokio::test]
    async fn fetch_after_respects_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_db(&dir).await;
        let reader = ChatDbReader::open(&path, dir.path().to_str().unwrap())
            .await
            .unwrap();

        let messages = reader.fetch_after(10, 50).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].row_id, 12);
    }

    #[tokio::test]
    async fn sender_is_normalized_into_conversation_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_db(&dir).await;
        let reader = ChatDbReader::open(&path, dir.path().to_str().unwrap())
            .await
            .unwrap();

        let messages = reader.fetch_after(0, 50).await.unwrap();
        assert_eq!(messages[0].conversation.as_str(), "+15551234567");
        assert_eq!(messages[0].sender, "+1 (555) 123-4567");
    }

    #[tokio::test]
    async fn attachments_and_service_are_carried() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_db(&dir).await;
        let reader = ChatDbReader::open(&path, dir.path().to_str().unwrap())
            .await
            .unwrap();

        let messages = reader.fetch_after(10, 50).await.unwrap();
        let sms = &messages[0];
        assert_eq!(sms.service, MessageService::Sms);
        assert_eq!(sms.attachments.len(), 1);
        assert_eq!(sms.attachments[0].mime_type.as_deref(), Some("image/png"));
        // File does not exist anywhere under the root.
        assert!(sms.attachments[0].resolved_path.is_none());
    }

    #[tokio::test]
    async fn latest_row_id_reports_max() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_db(&dir).await;
        let reader = ChatDbReader::open(&path, dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(reader.latest_row_id().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn missing_database_is_store_unavailable() {
        let result = ChatDbReader::open("/nonexistent/dir/chat.db", "/tmp").await;
        assert!(matches!(
            result,
            Err(BanterError::StoreUnavailable { .. })
        ));
    }

    #[test]
    fn apple_nanosecond_timestamps_convert() {
        // 700000000000000000 ns after 2001-01-01 = 2023-03-07T16:26:40Z.
        let t = apple_timestamp_to_utc(700_000_000_000_000_000);
        assert_eq!(t.timestamp(), 700_000_000 + APPLE_EPOCH_OFFSET);
    }

    #[test]
    fn apple_second_timestamps_convert() {
        let t = apple_timestamp_to_utc(700_000_000);
        assert_eq!(t.timestamp(), 700_000_000 + APPLE_EPOCH_OFFSET);
    }
}
