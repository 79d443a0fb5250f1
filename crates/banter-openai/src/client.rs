// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thin OpenAI API client used by the content handlers.
//!
//! Maps HTTP failures onto the dispatcher's error taxonomy: 429 and 5xx
//! are transient, content-policy rejections and other 4xx are permanent.

use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use banter_core::BanterError;

/// Outcome of a chat completion call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Outcome of a transcription call.
#[derive(Debug, Clone)]
pub struct TranscriptOutcome {
    pub text: String,
    /// Audio length in seconds, as reported by the provider.
    pub duration_secs: f64,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn map_status(status: reqwest::StatusCode, body: &str) -> Option<BanterError> {
        if status.is_success() {
            return None;
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Some(BanterError::transient(format!(
                "provider returned {status}"
            )));
        }
        if body.contains("content_policy") || body.contains("safety system") {
            return Some(BanterError::permanent(
                "the request was declined by the provider's content policy",
            ));
        }
        Some(BanterError::permanent(format!(
            "provider rejected the request with {status}"
        )))
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, BanterError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BanterError::Transient {
                message: format!("request to {path} failed"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| BanterError::Transient {
            message: "response body read failed".to_string(),
            source: Some(Box::new(e)),
        })?;

        if let Some(err) = Self::map_status(status, &text) {
            return Err(err);
        }

        serde_json::from_str(&text).map_err(|e| BanterError::Transient {
            message: "response decode failed".to_string(),
            source: Some(Box::new(e)),
        })
    }

    /// Run a chat completion. `messages` are raw message objects so the
    /// vision handler can pass image content parts.
    pub async fn chat(
        &self,
        model: &str,
        messages: Vec<Value>,
        max_tokens: u32,
    ) -> Result<ChatOutcome, BanterError> {
        let body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        let response = self.post_json("/chat/completions", body).await?;

        let text = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(BanterError::transient("provider returned an empty completion"));
        }

        let usage: Usage =
            serde_json::from_value(response["usage"].clone()).unwrap_or(Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
            });
        debug!(model = %model, prompt_tokens = usage.prompt_tokens, "chat completion ok");

        Ok(ChatOutcome {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }

    /// Transcribe an audio file via multipart upload.
    pub async fn transcribe(
        &self,
        model: &str,
        path: &Path,
    ) -> Result<TranscriptOutcome, BanterError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| BanterError::Permanent {
            message: format!("audio file unreadable: {e}"),
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .text("response_format", "verbose_json")
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BanterError::Transient {
                message: "transcription request failed".to_string(),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| BanterError::Transient {
            message: "response body read failed".to_string(),
            source: Some(Box::new(e)),
        })?;
        if let Some(err) = Self::map_status(status, &text) {
            return Err(err);
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| BanterError::Transient {
            message: "transcription decode failed".to_string(),
            source: Some(Box::new(e)),
        })?;

        Ok(TranscriptOutcome {
            text: parsed["text"].as_str().unwrap_or_default().trim().to_string(),
            duration_secs: parsed["duration"].as_f64().unwrap_or(0.0),
        })
    }

    /// Generate one image and return its URL.
    pub async fn generate_image(&self, model: &str, prompt: &str) -> Result<String, BanterError> {
        let body = json!({
            "model": model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
        });
        let response = self.post_json("/images/generations", body).await?;

        response["data"][0]["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BanterError::transient("image response carried no url"))
    }

    /// Download a generated asset to a local file.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<(), BanterError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BanterError::Transient {
                message: "asset download failed".to_string(),
                source: Some(Box::new(e)),
            })?;
        if !response.status().is_success() {
            return Err(BanterError::transient(format!(
                "asset download returned {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(|e| BanterError::Transient {
            message: "asset body read failed".to_string(),
            source: Some(Box::new(e)),
        })?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| BanterError::Transient {
                message: format!("asset write failed: {e}"),
                source: None,
            })
    }
}
