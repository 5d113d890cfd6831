//! OpenAI-compatible chat completions as a [`Generator`].

use async_trait::async_trait;
use docket_core::{GenerateError, Generator};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Map a failed HTTP response onto [`GenerateError`].
///
/// Quota problems are 429 or an `insufficient_quota` error code; an unknown or
/// unavailable model is 404, 503 or `model_not_found`.
#[must_use]
pub fn classify_failure(status: StatusCode, body: &str) -> GenerateError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let field = |name: &str| {
        error
            .and_then(|e| e.get(name))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    let code = field("code");
    let kind = field("type");
    let message = match field("message") {
        m if m.is_empty() => body.trim().to_string(),
        m => m,
    };
    let has = |needle: &str| code == needle || kind == needle || body.contains(needle);

    if status == StatusCode::TOO_MANY_REQUESTS || has("insufficient_quota") {
        GenerateError::QuotaExceeded
    } else if status == StatusCode::NOT_FOUND
        || status == StatusCode::SERVICE_UNAVAILABLE
        || has("model_not_found")
    {
        GenerateError::ModelUnavailable(format!("HTTP {status}: {message}"))
    } else {
        GenerateError::Other(format!("HTTP {status}: {message}"))
    }
}

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiGenerator {
    /// `timeout` bounds each HTTP request; callers may add their own deadline.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerateError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerateError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerateError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature,
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerateError::Timeout
            } else {
                GenerateError::Other(format!("POST {url}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Other(format!("invalid completion response: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerateError::Other("completion had no choices".to_string()))?;

        debug!("Completion from {}: {} chars", self.model, content.len());
        Ok(content)
    }
}
