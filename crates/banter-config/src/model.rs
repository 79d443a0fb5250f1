// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Banter dispatch orchestrator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Banter configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BanterConfig {
    /// Process identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Poll loop settings.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Message store and state database paths.
    #[serde(default)]
    pub store: StoreConfig,

    /// Dispatch worker, retry, and timeout settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Conversation history and reset settings.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Rate limiter settings.
    #[serde(default)]
    pub ratelimit: RateLimitConfig,

    /// Follow-up detection heuristic settings.
    #[serde(default)]
    pub followup: FollowupConfig,

    /// OpenAI-backed handler settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Web search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Per-capability enable flags.
    #[serde(default)]
    pub features: FeatureFlags,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "banter".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Poll loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PollerConfig {
    /// Seconds between store queries.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,

    /// Maximum rows fetched per query.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,

    /// Seconds between watermark persistence flushes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Addresses this account owns. Messages received on any other address
    /// are dropped. Empty means accept all recipients.
    #[serde(default)]
    pub owned_addresses: Vec<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            batch_limit: default_batch_limit(),
            flush_interval_secs: default_flush_interval_secs(),
            owned_addresses: Vec::new(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_batch_limit() -> u32 {
    50
}

fn default_flush_interval_secs() -> u64 {
    30
}

/// Message store and state database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path to the external message database (read-only).
    #[serde(default = "default_chat_db_path")]
    pub chat_db_path: String,

    /// Root directory where the store keeps attachment files.
    #[serde(default = "default_attachments_root")]
    pub attachments_root: String,

    /// Path to Banter's own state database (watermark, sessions, ledger).
    #[serde(default = "default_state_db_path")]
    pub state_db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chat_db_path: default_chat_db_path(),
            attachments_root: default_attachments_root(),
            state_db_path: default_state_db_path(),
        }
    }
}

fn default_chat_db_path() -> String {
    "~/Library/Messages/chat.db".to_string()
}

fn default_attachments_root() -> String {
    "~/Library/Messages/Attachments".to_string()
}

fn default_state_db_path() -> String {
    "banter.db".to_string()
}

/// Dispatch worker pool, retry, and timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Maximum handler invocations running concurrently across all keys.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Per-attempt handler timeout in seconds.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,

    /// Maximum attempts per message, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds before the second attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Multiplier applied to the backoff delay per failed attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            handler_timeout_secs: default_handler_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_handler_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

/// Conversation history and reset configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationConfig {
    /// Number of history entries kept per conversation, oldest evicted first.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Phrases (case-insensitive, exact after trimming) that reset a
    /// conversation's session and history.
    #[serde(default = "default_reset_phrases")]
    pub reset_phrases: Vec<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            reset_phrases: default_reset_phrases(),
        }
    }
}

fn default_history_window() -> usize {
    10
}

fn default_reset_phrases() -> Vec<String> {
    vec![
        "start over".to_string(),
        "reset".to_string(),
        "new conversation".to_string(),
    ]
}

/// Rate limiter configuration. Disabled means `acquire` always succeeds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Global bucket capacity in requests.
    #[serde(default = "default_global_capacity")]
    pub global_capacity: u32,

    /// Global refill rate in requests per minute.
    #[serde(default = "default_global_refill_per_min")]
    pub global_refill_per_min: f64,

    /// Per-sender bucket capacity in requests.
    #[serde(default = "default_sender_capacity")]
    pub sender_capacity: u32,

    /// Per-sender refill rate in requests per minute.
    #[serde(default = "default_sender_refill_per_min")]
    pub sender_refill_per_min: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_capacity: default_global_capacity(),
            global_refill_per_min: default_global_refill_per_min(),
            sender_capacity: default_sender_capacity(),
            sender_refill_per_min: default_sender_refill_per_min(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_global_capacity() -> u32 {
    50
}

fn default_global_refill_per_min() -> f64 {
    50.0
}

fn default_sender_capacity() -> u32 {
    10
}

fn default_sender_refill_per_min() -> f64 {
    10.0
}

/// Follow-up detection heuristic configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FollowupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Queries longer than this many words are never follow-ups.
    #[serde(default = "default_followup_max_words")]
    pub max_words: usize,

    /// Seconds since the previous exchange within which a short query can
    /// be treated as a follow-up.
    #[serde(default = "default_followup_recency_secs")]
    pub recency_secs: u64,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_words: default_followup_max_words(),
            recency_secs: default_followup_recency_secs(),
        }
    }
}

fn default_followup_max_words() -> usize {
    5
}

fn default_followup_recency_secs() -> u64 {
    600
}

/// OpenAI-backed handler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key. Usually supplied via `BANTER_OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Maximum completion tokens per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            vision_model: default_vision_model(),
            transcription_model: default_transcription_model(),
            image_model: default_image_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

/// Web search configuration (Google Custom Search).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Custom search engine identifier.
    #[serde(default)]
    pub engine_id: Option<String>,

    /// Seconds a cached search result stays fresh.
    #[serde(default = "default_search_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            engine_id: None,
            cache_ttl_secs: default_search_cache_ttl_secs(),
        }
    }
}

fn default_search_cache_ttl_secs() -> u64 {
    3600
}

/// Per-capability enable flags. A disabled capability classifies normally
/// but dispatch responds with a capability notice instead of calling out.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub vision: bool,

    #[serde(default = "default_true")]
    pub documents: bool,

    #[serde(default = "default_true")]
    pub audio: bool,

    #[serde(default = "default_true")]
    pub image_generation: bool,

    #[serde(default)]
    pub search: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            vision: true,
            documents: true,
            audio: true,
            image_generation: true,
            search: false,
        }
    }
}
