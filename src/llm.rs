//! Chat-completion clients for the four supported providers.
//!
//! All backends implement [`ChatClient`]: one system prompt, one user turn,
//! one text answer. Streaming is intentionally not supported; answers are
//! post-validated and redacted as a whole before delivery.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ProvidersConfig;
use crate::providers::{backoff_with_jitter, ProviderKind};

/// Interface all chat backends implement.
#[async_trait]
pub trait ChatClient: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn model_name(&self) -> &str;
    /// Run one completion: system instructions plus a single user message.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Build the chat client for one provider kind.
pub fn build_client(kind: ProviderKind, config: &ProvidersConfig) -> Result<Box<dyn ChatClient>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    match kind {
        ProviderKind::Ollama => Ok(Box::new(OllamaChat {
            base_url: config.ollama.base_url.clone(),
            model: config.ollama.chat_model.clone(),
            http,
        })),
        ProviderKind::OpenAi => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
            Ok(Box::new(OpenAiChat {
                model: config.openai.chat_model.clone(),
                api_key,
                http,
            }))
        }
        ProviderKind::Gemini => {
            let api_key = std::env::var("GEMINI_API_KEY")
                .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;
            Ok(Box::new(GeminiChat {
                model: config.gemini.chat_model.clone(),
                api_key,
                http,
            }))
        }
        ProviderKind::Groq => {
            let api_key = std::env::var("GROQ_API_KEY")
                .map_err(|_| anyhow::anyhow!("GROQ_API_KEY environment variable not set"))?;
            Ok(Box::new(GroqChat {
                base_url: config.groq.base_url.clone(),
                model: config.groq.chat_model.clone(),
                max_attempts: config.groq.max_attempts,
                base_delay_ms: config.groq.base_delay_ms,
                max_delay_ms: config.groq.max_delay_ms,
                api_key,
                http,
            }))
        }
    }
}

/// Local model served by Ollama.
pub struct OllamaChat {
    base_url: String,
    model: String,
    http: reqwest::Client,
}

#[async_trait]
impl ChatClient for OllamaChat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "stream": false,
        });

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama chat error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message content"))
    }
}

/// OpenAI chat-completions client.
pub struct OpenAiChat {
    model: String,
    api_key: String,
    http: reqwest::Client,
}

#[async_trait]
impl ChatClient for OpenAiChat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = chat_completion_body(&self.model, system, user);

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_completion(&json)
    }
}

/// Google Generative Language chat client.
pub struct GeminiChat {
    model: String,
    api_key: String,
    http: reqwest::Client,
}

#[async_trait]
impl ChatClient for GeminiChat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": [
                { "role": "user", "parts": [{ "text": user }] },
            ],
        });

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let response = self.http.post(url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidate text"))
    }
}

/// Gateway client speaking the OpenAI wire shape, retrying each call with
/// exponential backoff plus jitter.
pub struct GroqChat {
    base_url: String,
    model: String,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    api_key: String,
    http: reqwest::Client,
}

#[async_trait]
impl ChatClient for GroqChat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = chat_completion_body(&self.model, system, user);
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
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await?;
                    return parse_chat_completion(&json);
                }
                Ok(response) => {
                    let status = response.status();
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("Groq API error {}: {}", status, body_text));
                }
                Err(e) => last_err = Some(e.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Chat completion failed after retries")))
    }
}

fn chat_completion_body(model: &str, system: &str, user: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ],
    })
}

/// Parse an OpenAI-shaped chat response (`choices[0].message.content`).
fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message content"))
}
