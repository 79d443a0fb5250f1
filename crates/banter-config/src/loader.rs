// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./banter.toml` > `~/.config/banter/banter.toml` > `/etc/banter/banter.toml`
//! with environment variable overrides via `BANTER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::BanterConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/banter/banter.toml` (system-wide)
/// 3. `~/.config/banter/banter.toml` (user XDG config)
/// 4. `./banter.toml` (local directory)
/// 5. `BANTER_*` environment variables
pub fn load_config() -> Result<BanterConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BanterConfig::default()))
        .merge(Toml::file("/etc/banter/banter.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("banter/banter.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("banter.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<BanterConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BanterConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BanterConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BanterConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `BANTER_OPENAI_API_KEY` must map to
/// `openai.api_key`, not `openai.api.key`.
fn env_provider() -> Env {
    Env::prefixed("BANTER_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: BANTER_OPENAI_API_KEY -> "openai_api_key"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("poller_", "poller.", 1)
            .replacen("store_", "store.", 1)
            .replacen("dispatch_", "dispatch.", 1)
            .replacen("conversation_", "conversation.", 1)
            .replacen("ratelimit_", "ratelimit.", 1)
            .replacen("followup_", "followup.", 1)
            .replacen("openai_", "openai.", 1)
            .replacen("search_", "search.", 1)
            .replacen("features_", "features.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_str_applies_overrides() {
        let config = load_config_from_str(
            r#"
            [poller]
            interval_secs = 2
            owned_addresses = ["+15551234567"]

            [conversation]
            history_window = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.poller.interval_secs, 2);
        assert_eq!(config.poller.owned_addresses.len(), 1);
        assert_eq!(config.conversation.history_window, 4);
        // Untouched sections keep defaults.
        assert_eq!(config.dispatch.max_attempts, 5);
    }

    #[test]
    fn load_from_str_rejects_unknown_keys() {
        let result = load_config_from_str(
            r#"
            [poller]
            intervall_secs = 2
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_config_is_valid() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.agent.name, "banter");
    }
}
