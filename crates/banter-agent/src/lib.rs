// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Poll loop and dispatch orchestration for the Banter agent.
//!
//! The [`AgentLoop`] is the central coordinator that:
//! - Polls the external message store past a persistent watermark
//! - Filters out self-echoes and messages for unowned addresses
//! - Hands accepted messages to the per-conversation dispatch workers
//! - Persists the watermark periodically and on shutdown
//! - Backs off when the store is unavailable, never treating it as fatal

pub mod dispatch;
pub mod followup;
pub mod sessions;
pub mod shutdown;

pub use dispatch::{DispatchState, Dispatcher, HandlerRegistry};
pub use sessions::ConversationStore;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use banter_config::model::PollerConfig;
use banter_core::types::ConversationKey;
use banter_core::{BanterError, MessageSource};
use banter_store::StateDb;

/// Ceiling for the poll backoff when the store keeps failing.
const MAX_POLL_BACKOFF: Duration = Duration::from_secs(60);

/// The main poll loop. Owns the watermark: it advances in memory as soon
/// as the dispatcher accepts (or the filter drops) a row, and hits disk
/// on a flush interval plus once at shutdown. A crash between flushes
/// re-reads some rows; it never skips any.
pub struct AgentLoop {
    source: Arc<dyn MessageSource>,
    dispatcher: Arc<Dispatcher>,
    state: Arc<StateDb>,
    config: PollerConfig,
    owned: Vec<ConversationKey>,
}

impl AgentLoop {
    pub fn new(
        source: Arc<dyn MessageSource>,
        dispatcher: Arc<Dispatcher>,
        state: Arc<StateDb>,
        config: PollerConfig,
    ) -> Self {
        let owned = config
            .owned_addresses
            .iter()
            .map(|a| ConversationKey::normalize(a))
            .collect();
        Self {
            source,
            dispatcher,
            state,
            config,
            owned,
        }
    }

    /// Run until the cancellation token fires. On shutdown the watermark
    /// is flushed and dispatch workers are drained before returning.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), BanterError> {
        let mut watermark = self.init_watermark().await?;
        info!(watermark, "poll loop running");

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let flush_interval = Duration::from_secs(self.config.flush_interval_secs.max(1));
        let mut last_flushed = watermark;
        let mut last_flush = Instant::now();
        let mut consecutive_failures = 0u32;

        loop {
            let delay = if consecutive_failures > 0 {
                backoff_interval(interval, consecutive_failures)
            } else {
                interval
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping poll loop");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self
                .source
                .fetch_after(watermark, self.config.batch_limit)
                .await
            {
                Ok(rows) => {
                    consecutive_failures = 0;
                    for msg in rows {
                        let row_id = msg.row_id;
                        if self.should_dispatch(&msg) {
                            self.dispatcher.dispatch(msg);
                        }
                        // Dropped rows advance the watermark too, or the
                        // same self-echo would be refetched forever.
                        watermark = watermark.max(row_id);
                    }
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(
                        error = %e,
                        consecutive_failures,
                        "store poll failed, backing off"
                    );
                }
            }

            if watermark != last_flushed && last_flush.elapsed() >= flush_interval {
                match self.state.store_watermark(watermark).await {
                    Ok(()) => {
                        debug!(watermark, "watermark flushed");
                        last_flushed = watermark;
                    }
                    Err(e) => warn!(error = %e, "watermark flush failed"),
                }
                last_flush = Instant::now();
            }
        }

        if watermark != last_flushed {
            if let Err(e) = self.state.store_watermark(watermark).await {
                error!(error = %e, "final watermark flush failed");
            }
        }
        self.dispatcher.drain().await;
        info!(watermark, "poll loop stopped");
        Ok(())
    }

    /// Load the persisted watermark, or initialize it to the newest row so
    /// a first run never replays message history.
    async fn init_watermark(&self) -> Result<i64, BanterError> {
        if let Some(watermark) = self.state.load_watermark().await? {
            return Ok(watermark);
        }
        let latest = self.source.latest_row_id().await?;
        self.state.store_watermark(latest).await?;
        info!(watermark = latest, "first run, watermark initialized to store head");
        Ok(latest)
    }

    fn should_dispatch(&self, msg: &banter_core::types::InboundMessage) -> bool {
        if msg.is_from_me {
            debug!(row_id = msg.row_id, "dropping self-echo");
            return false;
        }
        if !self.owned.is_empty() {
            let recipient = ConversationKey::normalize(&msg.recipient);
            if !self.owned.contains(&recipient) {
                debug!(
                    row_id = msg.row_id,
                    recipient = msg.recipient.as_str(),
                    "dropping message for unowned address"
                );
                return false;
            }
        }
        true
    }
}

fn backoff_interval(interval: Duration, failures: u32) -> Duration {
    let shift = failures.min(6);
    (interval * 2u32.saturating_pow(shift)).min(MAX_POLL_BACKOFF)
}
