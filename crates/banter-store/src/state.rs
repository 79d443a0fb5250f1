// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Banter's own state database: watermark persistence and conversation
//! session storage.
//!
//! All access is serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional connections for writes.

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use tracing::debug;

use banter_core::types::{ConversationKey, HistoryEntry, SessionHandle};
use banter_core::BanterError;

use crate::migrations::run_migrations;

/// Map a database error into the storage error variant. Accepts both the
/// bare `rusqlite::Error` the connection constructors return and the
/// wrapped error `call` returns.
pub(crate) fn map_tr_err(e: impl std::error::Error + Send + Sync + 'static) -> BanterError {
    BanterError::Storage {
        source: Box::new(e),
    }
}

/// Persisted state of one conversation.
#[derive(Debug, Clone, Default)]
pub struct StoredSession {
    pub handle: Option<SessionHandle>,
    /// Rolling history window, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Topic terms extracted from the last exchange, for follow-up merging.
    pub last_topic: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Handle to the state database.
pub struct StateDb {
    conn: Connection,
}

impl StateDb {
    /// Open (or create) the state database at `path` and run migrations.
    pub async fn open(path: &str) -> Result<Self, BanterError> {
        let conn = Connection::open(path).await.map_err(map_tr_err)?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            run_migrations(conn)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        debug!(path = %path, "state database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory state database. Used by tests.
    pub async fn open_in_memory() -> Result<Self, BanterError> {
        let conn = Connection::open_in_memory().await.map_err(map_tr_err)?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            run_migrations(conn)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        Ok(Self { conn })
    }

    /// The underlying connection, for sibling crates that persist their own
    /// tables in the same database.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Load the persisted watermark, if one has ever been stored.
    pub async fn load_watermark(&self) -> Result<Option<i64>, BanterError> {
        self.conn
            .call(|conn| -> Result<Option<i64>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT row_id FROM watermark WHERE id = 1")?;
                let mut rows = stmt.query([])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get::<_, i64>(0)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Persist the watermark. Upserts the single row.
    pub async fn store_watermark(&self, row_id: i64) -> Result<(), BanterError> {
        let updated_at = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO watermark (id, row_id, updated_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET row_id = ?1, updated_at = ?2",
                    rusqlite::params![row_id, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Load a conversation's session state.
    pub async fn load_session(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<StoredSession>, BanterError> {
        let key = key.as_str().to_string();
        self.conn
            .call(
                move |conn| -> Result<
                    Option<(Option<String>, String, Option<String>, String)>,
                    rusqlite::Error,
                > {
                let mut stmt = conn.prepare(
                    "SELECT session_handle, history, last_topic, last_activity
                     FROM conversation_sessions WHERE key = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![key])?;
                match rows.next()? {
                    Some(row) => {
                        let handle: Option<String> = row.get(0)?;
                        let history_json: String = row.get(1)?;
                        let last_topic: Option<String> = row.get(2)?;
                        let last_activity: String = row.get(3)?;
                        Ok(Some((handle, history_json, last_topic, last_activity)))
                    }
                    None => Ok(None),
                }
            },
            )
            .await
            .map_err(map_tr_err)?
            .map(|(handle, history_json, last_topic, last_activity)| {
                let history: Vec<HistoryEntry> =
                    serde_json::from_str(&history_json).map_err(|e| BanterError::Storage {
                        source: Box::new(e),
                    })?;
                let last_activity = DateTime::parse_from_rfc3339(&last_activity)
                    .ok()
                    .map(|t| t.with_timezone(&Utc));
                Ok(StoredSession {
                    handle: handle.map(SessionHandle),
                    history,
                    last_topic,
                    last_activity,
                })
            })
            .transpose()
    }

    /// Save a conversation's session state, replacing any existing row.
    pub async fn save_session(
        &self,
        key: &ConversationKey,
        session: &StoredSession,
    ) -> Result<(), BanterError> {
        let key = key.as_str().to_string();
        let handle = session.handle.as_ref().map(|h| h.0.clone());
        let history_json =
            serde_json::to_string(&session.history).map_err(|e| BanterError::Storage {
                source: Box::new(e),
            })?;
        let last_topic = session.last_topic.clone();
        let last_activity = session
            .last_activity
            .unwrap_or_else(Utc::now)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO conversation_sessions
                         (key, session_handle, history, last_topic, last_activity)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(key) DO UPDATE SET
                         session_handle = ?2, history = ?3, last_topic = ?4, last_activity = ?5",
                    rusqlite::params![key, handle, history_json, last_topic, last_activity],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Delete a conversation's session state. Used by explicit reset.
    pub async fn delete_session(&self, key: &ConversationKey) -> Result<(), BanterError> {
        let key = key.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "DELETE FROM conversation_sessions WHERE key = ?1",
                    rusqlite::params![key],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL before shutdown.
    pub async fn close(&self) -> Result<(), BanterError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("state database WAL checkpoint complete");
        Ok(())
    }
}
