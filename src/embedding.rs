//! Embedding clients for the four supported providers, plus vector
//! utilities for the SQLite-backed store.
//!
//! - **[`OllamaEmbeddings`]** — local open-source model via an Ollama server.
//! - **[`OpenAiEmbeddings`]** — OpenAI embeddings API with batching, retry, and backoff.
//! - **[`GeminiEmbeddings`]** — Google Generative Language batch-embed API.
//! - **[`GroqEmbeddings`]** — OpenAI-compatible gateway with per-call
//!   backoff-with-jitter retry (the only provider with built-in retry; the
//!   others rely on registry-level fallback).
//!
//! Vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for BLOB storage
//! - [`blob_to_vec`] — decode a BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy (OpenAI)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ProvidersConfig;
use crate::providers::{backoff_with_jitter, ProviderKind};

/// Interface all embedding backends implement. Resolution and failover are
/// handled by the [`crate::providers::ProviderRegistry`].
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    fn kind(&self) -> ProviderKind;
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_texts(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Build the embedding client for one provider kind. Credential checks
/// happen here; the connectivity probe is the registry's job.
pub fn build_client(kind: ProviderKind, config: &ProvidersConfig) -> Result<Box<dyn EmbeddingClient>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    match kind {
        ProviderKind::Ollama => Ok(Box::new(OllamaEmbeddings {
            base_url: config.ollama.base_url.clone(),
            model: config.ollama.embed_model.clone(),
            http,
        })),
        ProviderKind::OpenAi => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
            Ok(Box::new(OpenAiEmbeddings {
                model: config.openai.embed_model.clone(),
                max_retries: config.openai.max_retries,
                api_key,
                http,
            }))
        }
        ProviderKind::Gemini => {
            let api_key = std::env::var("GEMINI_API_KEY")
                .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;
            Ok(Box::new(GeminiEmbeddings {
                model: config.gemini.embed_model.clone(),
                api_key,
                http,
            }))
        }
        ProviderKind::Groq => {
            let api_key = std::env::var("GROQ_API_KEY")
                .map_err(|_| anyhow::anyhow!("GROQ_API_KEY environment variable not set"))?;
            Ok(Box::new(GroqEmbeddings {
                base_url: config.groq.base_url.clone(),
                model: config.groq.embed_model.clone(),
                max_attempts: config.groq.max_attempts,
                base_delay_ms: config.groq.base_delay_ms,
                max_delay_ms: config.groq.max_delay_ms,
                api_key,
                http,
            }))
        }
    }
}

// ============ Ollama (local) ============

/// Local open-source embedding model served by Ollama.
pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    http: reqwest::Client,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddings {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama embed error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let data = json
            .get("embeddings")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings"))?;

        Ok(data.iter().map(json_floats).collect())
    }
}

// ============ OpenAI ============

/// OpenAI embeddings API client.
pub struct OpenAiEmbeddings {
    model: String,
    max_retries: u32,
    api_key: String,
    http: reqwest::Client,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddings {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_openai_embeddings(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

/// Parse an OpenAI-shaped embeddings response (`data[].embedding`).
fn parse_openai_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;
        embeddings.push(json_floats(embedding));
    }
    Ok(embeddings)
}

// ============ Gemini ============

/// Google Generative Language embeddings client.
pub struct GeminiEmbeddings {
    model: String,
    api_key: String,
    http: reqwest::Client,
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddings {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents?key={}",
            self.model, self.api_key
        );

        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let data = json
            .get("embeddings")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings"))?;

        Ok(data
            .iter()
            .map(|e| json_floats(e.get("values").unwrap_or(&serde_json::Value::Null)))
            .collect())
    }
}

// ============ Groq (OpenAI-compatible gateway) ============

/// Gateway client speaking the OpenAI wire shape, with exponential backoff
/// plus jitter on every call.
pub struct GroqEmbeddings {
    base_url: String,
    model: String,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    api_key: String,
    http: reqwest::Client,
}

#[async_trait]
impl EmbeddingClient for GroqEmbeddings {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff_with_jitter(
                    attempt,
                    self.base_delay_ms,
                    self.max_delay_ms,
                ))
                .await;
            }

            let resp = self
                .http
                .post(format!("{}/v1/embeddings", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await?;
                    return parse_openai_embeddings(&json);
                }
                Ok(response) => {
                    let status = response.status();
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("Groq API error {}: {}", status, body_text));
                }
                Err(e) => last_err = Some(e.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

fn json_floats(value: &serde_json::Value) -> Vec<f32> {
    value
        .as_array()
        .map(|a| a.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
        .unwrap_or_default()
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two embedding vectors, in `[-1.0, 1.0]`.
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
