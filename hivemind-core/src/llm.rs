//! LLM vendor client for the semantic gates
//!
//! Used by dedup Stage 3 (semantic duplicate confirmation), the conflict
//! resolver, and distillation cluster summarization. Every call carries a hard
//! timeout; every caller treats failure as a permissive skip — the LLM gates
//! degrade, they never block.

use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::Settings;
use crate::error::{Error, Result};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic messages API client with a bounded per-call timeout
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl LlmClient {
    /// Build a client from settings; `None` when no API key is configured
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        if !settings.llm_enabled() {
            return None;
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.llm_timeout_secs))
            .build()
            .ok()?;
        Some(Self {
            http,
            api_key: settings.anthropic_api_key.clone(),
            model: settings.llm_model.clone(),
        })
    }

    /// Send a single-turn prompt and return the model's text response
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("LLM request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Dependency(format!("LLM API returned {status}")));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Dependency(format!("LLM response decode failed: {e}")))?;

        data["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Dependency("LLM response missing content text".to_string()))
    }
}

/// Parse a strict-JSON LLM reply, tolerating markdown code fencing
///
/// Returns `None` on any parse failure; callers log and fall back to their
/// permissive default.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Option<T> {
    // Strip leading/trailing markdown fences the model sometimes adds
    let fence_re = Regex::new(r"(?m)^```(?:json)?\s*|\s*```$").ok()?;
    let cleaned = fence_re.replace_all(raw.trim(), "");

    match serde_json::from_str(cleaned.trim()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("failed to parse LLM JSON reply: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        is_duplicate: bool,
        confidence: f32,
    }

    #[test]
    fn parses_bare_json() {
        let v: Verdict = parse_json_reply(r#"{"is_duplicate": true, "confidence": 0.9}"#).unwrap();
        assert!(v.is_duplicate);
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"is_duplicate\": false, \"confidence\": 0.2}\n```";
        let v: Verdict = parse_json_reply(raw).unwrap();
        assert!(!v.is_duplicate);
        assert!((v.confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn malformed_reply_returns_none() {
        assert!(parse_json_reply::<Verdict>("the items look the same to me").is_none());
    }

    #[test]
    fn no_client_without_api_key() {
        let settings = Settings::default();
        assert!(LlmClient::from_settings(&settings).is_none());
    }
}
