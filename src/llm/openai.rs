//! OpenAI-compatible `/chat/completions` client.

use super::{ChatCompletion, ChatRequest};
use crate::error::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

/// Blocking client for any endpoint that speaks the OpenAI chat API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Creates a client for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ChatCompletion for OpenAiClient {
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .map_err(|e| Error::http(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response.text()?;
        trace!("HTTP {} ({} bytes)", status, body.len());

        if !status.is_success() {
            return Err(Error::api(Some(status.as_u16()), error_message(&body)));
        }

        parse_completion(&body)
    }
}

/// Message of an error body, or the raw body when it is not JSON.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Extracts the first choice's message content.
fn parse_completion(body: &str) -> Result<String> {
    let v: Value = serde_json::from_str(body)?;

    if let Some(err) = v.get("error") {
        let message = err["message"].as_str().unwrap_or("Unknown error");
        return Err(Error::api(None, message));
    }

    v["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::api(None, "Response contained no message content"))
}
