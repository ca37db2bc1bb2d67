//! Embedding provider abstraction.
//!
//! The embedding model itself is an external collaborator — this module only
//! fixes the HTTP call contract: batch a set of chunk texts, get back one
//! dense vector per text, in order. [`DisabledProvider`] is used when no
//! provider is configured; [`OpenAIProvider`] calls the OpenAI-compatible
//! `/v1/embeddings` endpoint with batching and exponential-backoff retry.
//!
//! # Retry strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry.
//! - HTTP 4xx (client error, not 429) → fail immediately.
//! - Network errors → retry.
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5), up to `max_retries`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;

    /// Embed a batch of texts with a per-call timeout. Returns one vector per input text,
    /// in the same order.
    async fn embed_batch(&self, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>>;
}

pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {other}"),
    }
}

pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    timeout: Duration,
    text: &str,
) -> Result<Vec<f32>> {
    let batch = provider.embed_batch(&[text.to_string()], timeout).await?;
    batch
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
}

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String], _timeout: Duration) -> Result<Vec<Vec<f32>>> {
        bail!("embedding provider is disabled")
    }
}

pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("embedding.model must be set when provider is 'openai'")?;
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .context("OPENAI_API_KEY is not set")?;
        let dims = config.model.as_ref().map(|_| default_dims_for(&model));

        Ok(Self {
            model,
            dims: dims.unwrap_or(1536),
            api_key,
            max_retries: config.max_retries,
            client: reqwest::Client::new(),
        })
    }
}

fn default_dims_for(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut attempt = 0u32;
        loop {
            let result = self.client
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&self.api_key)
                .json(&EmbeddingRequest {
                    model: &self.model,
                    input: texts,
                })
                .timeout(timeout)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: EmbeddingResponse = response
                            .json()
                            .await
                            .context("failed to parse embeddings response")?;
                        let mut ordered: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
                        for datum in body.data {
                            if datum.index < ordered.len() {
                                ordered[datum.index] = Some(datum.embedding);
                            }
                        }
                        let vectors: Result<Vec<Vec<f32>>> = ordered
                            .into_iter()
                            .map(|v| v.context("embeddings response missing an index"))
                            .collect();
                        return vectors;
                    }

                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt >= self.max_retries {
                        let text = response.text().await.unwrap_or_default();
                        bail!("embedding provider returned {status}: {text}");
                    }
                }
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(err).context("embedding request failed after retries");
                    }
                }
            }

            let backoff = Duration::from_secs(1 << attempt.min(5));
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_provider_always_errs() {
        let provider = DisabledProvider;
        let err = provider
            .embed_batch(&["hi".to_string()], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }
}
