// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and positive retry bounds.

use crate::diagnostic::ConfigError;
use crate::model::BanterConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BanterConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.store.chat_db_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "store.chat_db_path must not be empty".to_string(),
        });
    }

    if config.store.state_db_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "store.state_db_path must not be empty".to_string(),
        });
    }

    if config.poller.interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "poller.interval_secs must be at least 1".to_string(),
        });
    }

    if config.poller.batch_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "poller.batch_limit must be at least 1".to_string(),
        });
    }

    if config.dispatch.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.max_attempts must be at least 1".to_string(),
        });
    }

    if config.dispatch.worker_concurrency == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.worker_concurrency must be at least 1".to_string(),
        });
    }

    if config.dispatch.backoff_factor < 1.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "dispatch.backoff_factor must be at least 1.0, got {}",
                config.dispatch.backoff_factor
            ),
        });
    }

    if config.conversation.history_window == 0 {
        errors.push(ConfigError::Validation {
            message: "conversation.history_window must be at least 1".to_string(),
        });
    }

    if config.ratelimit.enabled {
        if config.ratelimit.global_capacity == 0 {
            errors.push(ConfigError::Validation {
                message: "ratelimit.global_capacity must be at least 1 when enabled".to_string(),
            });
        }
        if config.ratelimit.sender_capacity == 0 {
            errors.push(ConfigError::Validation {
                message: "ratelimit.sender_capacity must be at least 1 when enabled".to_string(),
            });
        }
        if config.ratelimit.global_refill_per_min <= 0.0 {
            errors.push(ConfigError::Validation {
                message: format!(
                    "ratelimit.global_refill_per_min must be positive, got {}",
                    config.ratelimit.global_refill_per_min
                ),
            });
        }
        if config.ratelimit.sender_refill_per_min <= 0.0 {
            errors.push(ConfigError::Validation {
                message: format!(
                    "ratelimit.sender_refill_per_min must be positive, got {}",
                    config.ratelimit.sender_refill_per_min
                ),
            });
        }
    }

    if config.followup.enabled && config.followup.max_words == 0 {
        errors.push(ConfigError::Validation {
            message: "followup.max_words must be at least 1 when enabled".to_string(),
        });
    }

    if config.search.enabled {
        if config.search.api_key.as_deref().unwrap_or("").trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "search.api_key is required when search is enabled".to_string(),
            });
        }
        if config
            .search
            .engine_id
            .as_deref()
            .unwrap_or("")
            .trim()
            .is_empty()
        {
            errors.push(ConfigError::Validation {
                message: "search.engine_id is required when search is enabled".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = BanterConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_interval_rejected() {
        let mut config = BanterConfig::default();
        config.poller.interval_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("interval_secs")));
    }

    #[test]
    fn search_enabled_requires_credentials() {
        let mut config = BanterConfig::default();
        config.search.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = BanterConfig::default();
        config.poller.interval_secs = 0;
        config.dispatch.max_attempts = 0;
        config.conversation.history_window = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
