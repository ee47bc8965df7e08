//! Provider selection and failover.
//!
//! The registry turns preference flags into a deterministic candidate order,
//! probes candidates in that order, and hands out a [`ProviderSession`] —
//! an immutable pairing of one embedding client and one chat client. When a
//! provider dies mid-flight (quota, outage), callers ask the registry for a
//! replacement session instead of mutating the old one.

use anyhow::{bail, Result};
use std::future::Future;
use std::time::Duration;

use crate::config::ProvidersConfig;
use crate::embedding::{self, EmbeddingClient};
use crate::llm::{self, ChatClient};

/// The four supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Gemini,
    Groq,
}

impl ProviderKind {
    /// Default priority order when no preference flag is set.
    pub const DEFAULT_ORDER: [ProviderKind; 4] = [
        ProviderKind::Ollama,
        ProviderKind::OpenAi,
        ProviderKind::Gemini,
        ProviderKind::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Groq => "groq",
        }
    }

    pub fn parse(s: &str) -> Option<ProviderKind> {
        match s {
            "ollama" => Some(ProviderKind::Ollama),
            "openai" => Some(ProviderKind::OpenAi),
            "gemini" => Some(ProviderKind::Gemini),
            "groq" => Some(ProviderKind::Groq),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved embedding/chat pairing. A session is never mutated; failover
/// produces a fresh session from the registry.
pub struct ProviderSession {
    pub embeddings: Box<dyn EmbeddingClient>,
    pub chat: Box<dyn ChatClient>,
}

impl ProviderSession {
    pub fn embedding_identity(&self) -> String {
        format!(
            "{}:{}",
            self.embeddings.kind().as_str(),
            self.embeddings.model_name()
        )
    }
}

/// Availability info for one provider, as reported by `forca providers`.
pub struct ProviderStatus {
    pub kind: ProviderKind,
    pub available: bool,
    pub detail: String,
}

/// Builds clients in preference order and probes their availability.
pub struct ProviderRegistry {
    config: ProvidersConfig,
}

impl ProviderRegistry {
    pub fn new(config: ProvidersConfig) -> Self {
        Self { config }
    }

    /// Candidate order: preferred providers first (in flag order), then the
    /// remaining ones in default order. Duplicates never appear.
    pub fn candidate_order(&self) -> Vec<ProviderKind> {
        let mut order = Vec::with_capacity(4);
        let preferences = [
            (self.config.prefer_local, ProviderKind::Ollama),
            (self.config.prefer_openai, ProviderKind::OpenAi),
            (self.config.prefer_gemini, ProviderKind::Gemini),
            (self.config.prefer_groq, ProviderKind::Groq),
        ];
        for (preferred, kind) in preferences {
            if preferred {
                order.push(kind);
            }
        }
        for kind in ProviderKind::DEFAULT_ORDER {
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        order
    }

    /// Check whether one provider is usable right now. Local providers need a
    /// reachable server; cloud providers need credentials in the environment.
    pub async fn probe(&self, kind: ProviderKind) -> Result<()> {
        match kind {
            ProviderKind::Ollama => {
                let http = reqwest::Client::builder()
                    .timeout(Duration::from_secs(self.config.timeout_secs))
                    .build()?;
                let url = format!("{}/api/tags", self.config.ollama.base_url);
                let response = http.get(&url).send().await?;
                if !response.status().is_success() {
                    bail!("Ollama server returned {}", response.status());
                }
                Ok(())
            }
            ProviderKind::OpenAi => require_env("OPENAI_API_KEY"),
            ProviderKind::Gemini => require_env("GEMINI_API_KEY"),
            ProviderKind::Groq => require_env("GROQ_API_KEY"),
        }
    }

    /// Resolve the first available embedding client in candidate order.
    pub async fn resolve_embeddings(&self) -> Result<Box<dyn EmbeddingClient>> {
        select_first(self.candidate_order(), |kind| self.try_embeddings(kind)).await
    }

    /// Resolve the first available chat client in candidate order.
    pub async fn resolve_chat(&self) -> Result<Box<dyn ChatClient>> {
        select_first(self.candidate_order(), |kind| self.try_chat(kind)).await
    }

    /// Resolve a full session (embeddings and chat may come from different
    /// providers if the first candidate serves only one role).
    pub async fn resolve_session(&self) -> Result<ProviderSession> {
        Ok(ProviderSession {
            embeddings: self.resolve_embeddings().await?,
            chat: self.resolve_chat().await?,
        })
    }

    /// Next embedding client after `failed`, preserving candidate order.
    pub async fn fallback_embeddings(
        &self,
        failed: ProviderKind,
    ) -> Result<Box<dyn EmbeddingClient>> {
        let remaining = self.candidates_after(failed);
        if remaining.is_empty() {
            bail!("No embedding provider left after {}", failed);
        }
        select_first(remaining, |kind| self.try_embeddings(kind)).await
    }

    /// Next chat client after `failed`, preserving candidate order.
    pub async fn fallback_chat(&self, failed: ProviderKind) -> Result<Box<dyn ChatClient>> {
        let remaining = self.candidates_after(failed);
        if remaining.is_empty() {
            bail!("No chat provider left after {}", failed);
        }
        select_first(remaining, |kind| self.try_chat(kind)).await
    }

    /// Status of every provider in candidate order.
    pub async fn status(&self) -> Vec<ProviderStatus> {
        let mut out = Vec::with_capacity(4);
        for kind in self.candidate_order() {
            let (available, detail) = match self.probe(kind).await {
                Ok(()) => (true, "available".to_string()),
                Err(e) => (false, e.to_string()),
            };
            out.push(ProviderStatus {
                kind,
                available,
                detail,
            });
        }
        out
    }

    fn candidates_after(&self, failed: ProviderKind) -> Vec<ProviderKind> {
        self.candidate_order()
            .into_iter()
            .skip_while(|&k| k != failed)
            .skip(1)
            .collect()
    }

    async fn try_embeddings(&self, kind: ProviderKind) -> Result<Box<dyn EmbeddingClient>> {
        self.probe(kind).await?;
        embedding::build_client(kind, &self.config)
    }

    async fn try_chat(&self, kind: ProviderKind) -> Result<Box<dyn ChatClient>> {
        self.probe(kind).await?;
        llm::build_client(kind, &self.config)
    }
}

/// Walk candidates in order, returning the first successful attempt. Each
/// failure is surfaced as a warning so operators can see why a fallback
/// engaged.
pub(crate) async fn select_first<T, F, Fut>(
    order: Vec<ProviderKind>,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(ProviderKind) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for kind in order {
        match attempt(kind).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                eprintln!("Warning: provider {} unavailable: {}", kind, e);
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) => Err(e.context("No provider available")),
        None => bail!("No provider candidates configured"),
    }
}

/// Exponential backoff with jitter: `base * 2^(attempt-1)` capped at
/// `max_ms`, plus up to 25% random jitter to avoid thundering herds.
pub(crate) fn backoff_with_jitter(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    use rand::Rng;

    let exp = base_ms.saturating_mul(1u64 << (attempt - 1).min(16));
    let capped = exp.min(max_ms);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4);
    Duration::from_millis(capped + jitter)
}

fn require_env(name: &str) -> Result<()> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(()),
        _ => bail!("{} environment variable not set", name),
    }
}
