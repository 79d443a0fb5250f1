// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `banter reset` and `banter usage` command implementations.

use banter_config::model::BanterConfig;
use banter_core::types::ConversationKey;
use banter_core::BanterError;
use banter_store::{expand_tilde, StateDb};
use banter_usage::UsageLedger;

/// Clear one conversation's session and history.
pub async fn run_reset(config: &BanterConfig, key: &str) -> Result<(), BanterError> {
    let key = ConversationKey::normalize(key);
    let state_path = expand_tilde(&config.store.state_db_path);
    let state = StateDb::open(&state_path.to_string_lossy()).await?;
    state.delete_session(&key).await?;
    state.close().await?;
    println!("banter: conversation {key} reset");
    Ok(())
}

/// Print usage ledger totals.
pub async fn run_usage(config: &BanterConfig) -> Result<(), BanterError> {
    let state_path = expand_tilde(&config.store.state_db_path);
    let ledger = UsageLedger::open(&state_path.to_string_lossy()).await?;

    let records = ledger.record_count().await?;
    let today = ledger.daily_total().await?;
    let month = ledger.monthly_total().await?;

    println!("usage ledger: {records} records");
    println!("  today:      ${today:.4}");
    println!("  this month: ${month:.4}");
    Ok(())
}
