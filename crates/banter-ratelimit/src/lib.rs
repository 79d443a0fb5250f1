// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-bucket rate limiting, per sender plus one global bucket.
//!
//! Refill is continuous and proportional to elapsed time since the last
//! refill, capped at bucket capacity. Buckets are never reset to full on
//! a period boundary, which avoids thundering-herd bursts right after a
//! window rollover.
//!
//! The limiter is a hard gate: when it denies, the dispatcher must
//! short-circuit with a throttling notice and must not invoke a handler.

use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

use banter_config::model::RateLimitConfig;
use banter_core::types::ConversationKey;

/// Outcome of an acquire attempt. Both scopes must allow before any
/// tokens are consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Denied; `scope` names the exhausted bucket ("global" or the sender key).
    Denied { scope: String },
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Add tokens proportional to elapsed time, capped at capacity.
    fn refill(&mut self, capacity: f64, per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * per_sec).min(capacity);
        self.last_refill = now;
    }
}

/// Token-bucket gate with one global bucket and one bucket per sender.
pub struct RateLimiter {
    config: RateLimitConfig,
    global: Mutex<Bucket>,
    senders: DashMap<ConversationKey, Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let now = Instant::now();
        let global = Mutex::new(Bucket::full(f64::from(config.global_capacity), now));
        Self {
            config,
            global,
            senders: DashMap::new(),
        }
    }

    /// Try to take `cost` tokens from both the sender bucket and the
    /// global bucket. Tokens are only consumed when both allow.
    pub fn acquire(&self, sender: &ConversationKey, cost: f64) -> RateDecision {
        self.acquire_at(sender, cost, Instant::now())
    }

    /// `acquire` with an explicit clock reading. Exposed for deterministic
    /// tests.
    pub fn acquire_at(&self, sender: &ConversationKey, cost: f64, now: Instant) -> RateDecision {
        if !self.config.enabled {
            return RateDecision::Allowed;
        }

        let sender_capacity = f64::from(self.config.sender_capacity);
        let sender_per_sec = self.config.sender_refill_per_min / 60.0;
        let global_capacity = f64::from(self.config.global_capacity);
        let global_per_sec = self.config.global_refill_per_min / 60.0;

        let entry = self
            .senders
            .entry(sender.clone())
            .or_insert_with(|| Mutex::new(Bucket::full(sender_capacity, now)));

        let Ok(mut sender_bucket) = entry.lock() else {
            return RateDecision::Denied {
                scope: sender.to_string(),
            };
        };
        sender_bucket.refill(sender_capacity, sender_per_sec, now);
        if sender_bucket.tokens < cost {
            debug!(scope = %sender, tokens = sender_bucket.tokens, "rate gate denied");
            return RateDecision::Denied {
                scope: sender.to_string(),
            };
        }

        let Ok(mut global_bucket) = self.global.lock() else {
            return RateDecision::Denied {
                scope: "global".to_string(),
            };
        };
        global_bucket.refill(global_capacity, global_per_sec, now);
        if global_bucket.tokens < cost {
            debug!(tokens = global_bucket.tokens, "global rate gate denied");
            return RateDecision::Denied {
                scope: "global".to_string(),
            };
        }

        sender_bucket.tokens -= cost;
        global_bucket.tokens -= cost;
        RateDecision::Allowed
    }
}
