//! Remote embeddings over an OpenAI-compatible HTTP API.
//!
//! Sends `POST {base_url}/embeddings` with `{"model", "input": [...]}` and
//! reads back `data[].embedding`, ordered by `data[].index`.

use async_trait::async_trait;
use docket_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::l2_normalize;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingsUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsUsage {
    #[serde(default)]
    prompt_tokens: usize,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    /// `base_url` includes the version prefix, e.g. `https://api.openai.com/v1`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EmbedError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            dimension,
        })
    }

    async fn request(&self, texts: &[&str]) -> Result<EmbeddingsResponse, EmbedError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut req = self.client.post(&url).json(&EmbeddingsRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| EmbedError::Request(format!("POST {url}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Request(format!("HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| EmbedError::Request(format!("invalid embeddings response: {e}")))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut outputs = Vec::with_capacity(texts.len());
        for batch in texts.chunks(config.batch_size.max(1)) {
            let mut response = self.request(batch).await?;
            if response.data.len() != batch.len() {
                return Err(EmbedError::Inference(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.data.len()
                )));
            }
            response.data.sort_by_key(|d| d.index);

            let tokens = response.usage.map_or(0, |u| u.prompt_tokens);
            debug!("Embedded {} texts remotely ({} tokens)", batch.len(), tokens);

            for data in response.data {
                if data.embedding.len() != self.dimension {
                    return Err(EmbedError::Inference(format!(
                        "model {} returned dimension {}, configured {}",
                        self.model,
                        data.embedding.len(),
                        self.dimension
                    )));
                }
                let mut embedding = data.embedding;
                if config.normalize {
                    l2_normalize(&mut embedding);
                }
                outputs.push(EmbeddingOutput {
                    embedding,
                    token_count: tokens / batch.len(),
                });
            }
        }
        Ok(outputs)
    }
}
