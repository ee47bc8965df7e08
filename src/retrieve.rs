//! Query-time retrieval: alias expansion, vector search, and MMR.
//!
//! Queries are expanded with domain synonyms before embedding so that short
//! student phrasings ("amplitude") still land near the formal vocabulary
//! used in the course materials. Search runs either plain cosine similarity
//! or maximal marginal relevance over a wider candidate pool.
//!
//! Embedding quota errors trigger a one-shot failover: the registry supplies
//! the next provider in the chain and the query is retried once. The caller
//! receives the replacement client so later queries skip the dead provider.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, EmbeddingClient};
use crate::providers::ProviderRegistry;
use crate::store::{ScoredChunk, VectorStore};

/// Domain term → comma-separated synonym expansion.
pub struct AliasTable {
    aliases: BTreeMap<String, String>,
}

impl AliasTable {
    /// Built-in expansions for the fitness-education vocabulary.
    pub fn with_defaults() -> Self {
        let mut aliases = BTreeMap::new();
        for (term, expansion) in [
            ("amplitude", "amplitude de movimento, ROM, range of motion"),
            ("rm", "repetição máxima, 1RM, carga máxima"),
            ("hiit", "treino intervalado de alta intensidade"),
            ("core", "musculatura do core, estabilização do tronco"),
            ("cardio", "treino cardiovascular, exercício aeróbico"),
            ("alongamento", "alongamento, flexibilidade, mobilidade"),
            ("overtraining", "sobretreinamento, excesso de treino"),
            ("hipertrofia", "hipertrofia muscular, ganho de massa muscular"),
            ("periodização", "periodização do treinamento, ciclos de treino"),
            ("anilha", "anilha, peso livre"),
        ] {
            aliases.insert(term.to_string(), expansion.to_string());
        }
        Self { aliases }
    }

    /// Defaults overlaid with entries from an optional JSON file
    /// (`{"term": "synonym, synonym"}`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut table = Self::with_defaults();
        if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read aliases file: {}", path.display()))?;
            let custom: BTreeMap<String, String> =
                serde_json::from_str(&content).context("Invalid aliases file (expected a JSON object of strings)")?;
            for (term, expansion) in custom {
                table.aliases.insert(term.to_lowercase(), expansion);
            }
        }
        Ok(table)
    }

    /// Append synonym expansions for any alias appearing as a whole word in
    /// the query. The original wording always stays first.
    pub fn expand(&self, query: &str) -> String {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut expansions = Vec::new();
        for (term, expansion) in &self.aliases {
            if words.contains(&term.as_str()) {
                expansions.push(expansion.as_str());
            }
        }

        if expansions.is_empty() {
            query.to_string()
        } else {
            format!("{} ({})", query, expansions.join("; "))
        }
    }
}

/// True for the provider errors that mean "this account is out of capacity"
/// rather than a transient fault.
pub fn is_quota_error(err: &anyhow::Error) -> bool {
    let text = format!("{:#}", err).to_lowercase();
    text.contains("429") || text.contains("quota") || text.contains("insufficient_quota")
}

/// Greedy MMR selection over scored candidates that carry their embeddings.
/// Returns indices into `candidates` in selection order.
pub fn mmr_select(candidates: &[ScoredChunk], k: usize, lambda: f64) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f64::MIN;

        for (pos, &idx) in remaining.iter().enumerate() {
            let relevance = candidates[idx].similarity as f64;
            let redundancy = selected
                .iter()
                .filter_map(|&s| {
                    match (&candidates[idx].embedding, &candidates[s].embedding) {
                        (Some(a), Some(b)) => Some(cosine_similarity(a, b) as f64),
                        _ => None,
                    }
                })
                .fold(0.0f64, f64::max);

            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.swap_remove(best_pos));
    }

    selected
}

pub struct Retriever<'a> {
    store: &'a VectorStore,
    config: &'a RetrievalConfig,
    aliases: &'a AliasTable,
}

/// Result of one retrieval, including a replacement embedding client when a
/// quota failover happened mid-query.
pub struct Retrieval {
    pub hits: Vec<ScoredChunk>,
    pub expanded_query: String,
    pub replacement: Option<Box<dyn EmbeddingClient>>,
}

impl<'a> Retriever<'a> {
    pub fn new(
        store: &'a VectorStore,
        config: &'a RetrievalConfig,
        aliases: &'a AliasTable,
    ) -> Self {
        Self {
            store,
            config,
            aliases,
        }
    }

    /// Retrieve the top chunks for a question. On a quota error the next
    /// provider in the chain is tried exactly once.
    pub async fn retrieve(
        &self,
        embeddings: &dyn EmbeddingClient,
        registry: &ProviderRegistry,
        collection: &str,
        question: &str,
    ) -> Result<Retrieval> {
        let expanded = self.aliases.expand(question);

        let (query_vec, replacement) = match embeddings.embed_query(&expanded).await {
            Ok(v) => (v, None),
            Err(e) if is_quota_error(&e) => {
                eprintln!(
                    "Warning: embedding provider {} hit a quota limit, failing over",
                    embeddings.kind()
                );
                let fallback = registry.fallback_embeddings(embeddings.kind()).await?;
                let vec = fallback.embed_query(&expanded).await?;
                (vec, Some(fallback))
            }
            Err(e) => return Err(e),
        };

        let hits = self.search(collection, &query_vec).await?;
        Ok(Retrieval {
            hits,
            expanded_query: expanded,
            replacement,
        })
    }

    async fn search(&self, collection: &str, query_vec: &[f32]) -> Result<Vec<ScoredChunk>> {
        if self.config.search_type == "mmr" {
            let candidates = self
                .store
                .similarity_search(collection, query_vec, self.config.fetch_k, true)
                .await?;
            let order = mmr_select(&candidates, self.config.k, self.config.mmr_lambda);

            let mut by_index: Vec<Option<ScoredChunk>> =
                candidates.into_iter().map(Some).collect();
            Ok(order
                .into_iter()
                .filter_map(|i| by_index[i].take())
                .collect())
        } else {
            self.store
                .similarity_search(collection, query_vec, self.config.k, false)
                .await
        }
    }
}
