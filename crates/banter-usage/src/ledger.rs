// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only usage ledger backed by SQLite.
//!
//! Every external call a handler reports is recorded with its unit counts
//! and estimated cost. Records are never mutated after write; rollup
//! beyond the daily and monthly totals used by the CLI is an external
//! concern.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use banter_core::types::UsageEvent;
use banter_core::BanterError;

use crate::pricing::calculate_cost;

/// Convert a database error into BanterError::Storage. Accepts both the
/// bare `rusqlite::Error` from the connection constructors and the wrapped
/// error `call` returns.
fn map_tr_err(e: impl std::error::Error + Send + Sync + 'static) -> BanterError {
    BanterError::Storage {
        source: Box::new(e),
    }
}

/// A single ledger record representing one external call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique record identifier (UUID v4).
    pub id: String,
    pub provider: String,
    pub model: String,
    pub feature: String,
    pub input_units: u64,
    pub output_units: u64,
    /// Estimated cost in USD.
    pub cost_usd: f64,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

impl UsageRecord {
    /// Build a record from a handler-reported usage event, deriving cost
    /// from the pricing table.
    pub fn from_event(event: &UsageEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            provider: event.provider.clone(),
            model: event.model.clone(),
            feature: event.feature.to_string(),
            input_units: event.input_units,
            output_units: event.output_units,
            cost_usd: calculate_cost(&event.model, event.input_units, event.output_units),
            created_at: Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        }
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS usage_ledger (
        id TEXT PRIMARY KEY,
        provider TEXT NOT NULL,
        model TEXT NOT NULL,
        feature TEXT NOT NULL,
        input_units INTEGER NOT NULL,
        output_units INTEGER NOT NULL,
        cost_usd REAL NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_usage_created_at ON usage_ledger (created_at);
";

/// Persistent usage ledger.
///
/// All operations go through the single tokio-rusqlite background thread.
/// Appends are safe for concurrent callers by construction.
pub struct UsageLedger {
    conn: tokio_rusqlite::Connection,
}

impl UsageLedger {
    /// Open a ledger at the given database path, creating the table if
    /// needed. Sharing the path with the state database is fine; the
    /// ledger keeps its own connection.
    pub async fn open(path: &str) -> Result<Self, BanterError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_tr_err)?;
        Self::ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Open an in-memory ledger. Used by tests.
    pub async fn open_in_memory() -> Result<Self, BanterError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(map_tr_err)?;
        Self::ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    async fn ensure_schema(conn: &tokio_rusqlite::Connection) -> Result<(), BanterError> {
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
    }

    /// Append one record. Never updates existing rows.
    pub async fn record(&self, record: &UsageRecord) -> Result<(), BanterError> {
        let r = record.clone();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO usage_ledger
                         (id, provider, model, feature, input_units, output_units,
                          cost_usd, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        r.id,
                        r.provider,
                        r.model,
                        r.feature,
                        r.input_units,
                        r.output_units,
                        r.cost_usd,
                        r.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        info!(
            model = %record.model,
            feature = %record.feature,
            input_units = record.input_units,
            output_units = record.output_units,
            cost_usd = record.cost_usd,
            "usage recorded"
        );
        Ok(())
    }

    /// Total cost in USD for the current UTC day.
    pub async fn daily_total(&self) -> Result<f64, BanterError> {
        let prefix = Utc::now().format("%Y-%m-%d").to_string();
        self.total_with_prefix(prefix).await
    }

    /// Total cost in USD for the current UTC month.
    pub async fn monthly_total(&self) -> Result<f64, BanterError> {
        let prefix = Utc::now().format("%Y-%m").to_string();
        self.total_with_prefix(prefix).await
    }

    /// Number of records in the ledger.
    pub async fn record_count(&self) -> Result<i64, BanterError> {
        self.conn
            .call(|conn| -> Result<i64, rusqlite::Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM usage_ledger", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn total_with_prefix(&self, prefix: String) -> Result<f64, BanterError> {
        self.conn
            .call(move |conn| -> Result<f64, rusqlite::Error> {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM usage_ledger
                     WHERE created_at LIKE ?1 || '%'",
                    rusqlite::params![prefix],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::types::UsageFeature;

    fn event(model: &str, feature: UsageFeature, input: u64, output: u64) -> UsageEvent {
        UsageEvent {
            provider: "openai".to_string(),
            model: model.to_string(),
            feature,
            input_units: input,
            output_units: output,
        }
    }

    #[tokio::test]
    async fn records_append_and_count() {
        let ledger = UsageLedger::open_in_memory().await.unwrap();
        assert_eq!(ledger.record_count().await.unwrap(), 0);

        let record = UsageRecord::from_event(&event("gpt-4o-mini", UsageFeature::Chat, 100, 50));
        ledger.record(&record).await.unwrap();
        assert_eq!(ledger.record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn daily_total_sums_todays_records() {
        let ledger = UsageLedger::open_in_memory().await.unwrap();

        let a = UsageRecord::from_event(&event("dall-e-3", UsageFeature::ImageGeneration, 1, 0));
        let b = UsageRecord::from_event(&event("dall-e-3", UsageFeature::ImageGeneration, 1, 0));
        ledger.record(&a).await.unwrap();
        ledger.record(&b).await.unwrap();

        let total = ledger.daily_total().await.unwrap();
        assert!((total - 0.08).abs() < 1e-9);
        let monthly = ledger.monthly_total().await.unwrap();
        assert!((monthly - 0.08).abs() < 1e-9);
    }

    #[tokio::test]
    async fn from_event_derives_cost() {
        let record = UsageRecord::from_event(&event("gpt-4o", UsageFeature::Vision, 1000, 500));
        let expected = (1000.0 / 1e6) * 5.0 + (500.0 / 1e6) * 15.0;
        assert!((record.cost_usd - expected).abs() < 1e-12);
        assert_eq!(record.feature, "vision");
    }

    #[tokio::test]
    async fn ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path_str = path.to_str().unwrap().to_string();

        {
            let ledger = UsageLedger::open(&path_str).await.unwrap();
            let record =
                UsageRecord::from_event(&event("whisper-1", UsageFeature::Transcription, 2, 0));
            ledger.record(&record).await.unwrap();
        }

        let ledger = UsageLedger::open(&path_str).await.unwrap();
        assert_eq!(ledger.record_count().await.unwrap(), 1);
    }
}
