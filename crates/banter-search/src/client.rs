// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Custom Search client with an in-process TTL cache.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use banter_core::BanterError;

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const MAX_RESULTS: usize = 5;

/// One search hit.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

/// Web search client. Responses are cached per normalized query for the
/// configured TTL so repeated questions do not burn quota.
pub struct SearchClient {
    http: reqwest::Client,
    api_key: String,
    engine_id: String,
    ttl: Duration,
    cache: DashMap<String, (Instant, Vec<SearchResult>)>,
}

impl SearchClient {
    pub fn new(api_key: String, engine_id: String, cache_ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            engine_id,
            ttl: cache_ttl,
            cache: DashMap::new(),
        }
    }

    /// Run a search, serving from cache when fresh.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, BanterError> {
        let cache_key = query.trim().to_lowercase();

        if let Some(entry) = self.cache.get(&cache_key) {
            let (cached_at, results) = entry.value();
            if cached_at.elapsed() < self.ttl {
                debug!(query = %cache_key, "search cache hit");
                return Ok(results.clone());
            }
        }

        let response = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", "5"),
            ])
            .send()
            .await
            .map_err(|e| BanterError::Transient {
                message: "search request failed".to_string(),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(BanterError::transient(format!(
                "search provider returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(BanterError::permanent(format!(
                "search request rejected with {status}"
            )));
        }

        let parsed: SearchResponse =
            response.json().await.map_err(|e| BanterError::Transient {
                message: "search response decode failed".to_string(),
                source: Some(Box::new(e)),
            })?;

        let mut results = parsed.items;
        results.truncate(MAX_RESULTS);
        if results.is_empty() {
            warn!(query = %cache_key, "search returned no results");
        }

        self.cache
            .insert(cache_key, (Instant::now(), results.clone()));
        Ok(results)
    }
}

/// Format search hits as context lines for a chat prompt.
pub fn format_snippets(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("- {} ({}): {}", r.title, r.link, r.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}
