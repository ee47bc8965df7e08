use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub materials: MaterialsConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding the persistent vector store database.
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "forca_knowledge".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaterialsConfig {
    /// Root directory scanned for course materials (PDFs and spreadsheets).
    pub dir: PathBuf,
    /// Filename stem prefix that marks a spreadsheet as the course catalog.
    #[serde(default = "default_catalog_prefix")]
    pub catalog_prefix: String,
    /// Optional JSON file mapping domain terms to synonym expansions.
    #[serde(default)]
    pub aliases_file: Option<PathBuf>,
    #[serde(default = "default_knowledge_base_id")]
    pub knowledge_base_id: String,
}

fn default_catalog_prefix() -> String {
    "estrutura".to_string()
}

fn default_knowledge_base_id() -> String {
    "dna_forca".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Hard cap on chunks per embedding request.
    #[serde(default = "default_batch_chunk_cap")]
    pub batch_chunk_cap: usize,
    /// Estimated-token ceiling per embedding request.
    #[serde(default = "default_batch_token_budget")]
    pub batch_token_budget: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_chunk_cap: default_batch_chunk_cap(),
            batch_token_budget: default_batch_token_budget(),
        }
    }
}

fn default_batch_chunk_cap() -> usize {
    64
}
fn default_batch_token_budget() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// `similarity` or `mmr`.
    #[serde(default = "default_search_type")]
    pub search_type: String,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Candidate pool size for MMR.
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    /// Relevance/diversity trade-off for MMR (1.0 = pure relevance).
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f64,
    /// How many ranked chunks survive into the prompt context.
    #[serde(default = "default_max_context_chunks")]
    pub max_context_chunks: usize,
    /// Context shorter than this yields the insufficient-information reply.
    #[serde(default = "default_min_context_chars")]
    pub min_context_chars: usize,
    /// Question/context word-overlap ratio below this yields the
    /// not-relevant reply. Heuristic, pending empirical validation.
    #[serde(default = "default_relevance_gate")]
    pub relevance_gate: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_type: default_search_type(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            mmr_lambda: default_mmr_lambda(),
            max_context_chunks: default_max_context_chunks(),
            min_context_chars: default_min_context_chars(),
            relevance_gate: default_relevance_gate(),
        }
    }
}

fn default_search_type() -> String {
    "similarity".to_string()
}
fn default_k() -> usize {
    8
}
fn default_fetch_k() -> usize {
    30
}
fn default_mmr_lambda() -> f64 {
    0.5
}
fn default_max_context_chunks() -> usize {
    5
}
fn default_min_context_chars() -> usize {
    100
}
fn default_relevance_gate() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,
    #[serde(default = "default_educational_weight")]
    pub educational_weight: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            relevance_weight: default_relevance_weight(),
            educational_weight: default_educational_weight(),
        }
    }
}

fn default_relevance_weight() -> f64 {
    0.85
}
fn default_educational_weight() -> f64 {
    0.15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub prefer_local: bool,
    #[serde(default)]
    pub prefer_openai: bool,
    #[serde(default)]
    pub prefer_gemini: bool,
    #[serde(default)]
    pub prefer_groq: bool,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub groq: GroqConfig,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            prefer_local: false,
            prefer_openai: false,
            prefer_gemini: false,
            prefer_groq: false,
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
            gemini: GeminiConfig::default(),
            groq: GroqConfig::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_ollama_chat_model")]
    pub chat_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            embed_model: default_ollama_embed_model(),
            chat_model: default_ollama_chat_model(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_ollama_chat_model() -> String {
    "llama3.1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_openai_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            embed_model: default_openai_embed_model(),
            chat_model: default_openai_chat_model(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_openai_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_openai_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_gemini_chat_model")]
    pub chat_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            embed_model: default_gemini_embed_model(),
            chat_model: default_gemini_chat_model(),
        }
    }
}

fn default_gemini_embed_model() -> String {
    "text-embedding-004".to_string()
}
fn default_gemini_chat_model() -> String {
    "gemini-1.5-flash".to_string()
}

/// The OpenAI-compatible gateway vendor. The only provider with built-in
/// per-call retry (exponential backoff with jitter); the others rely on
/// registry-level fallback.
#[derive(Debug, Deserialize, Clone)]
pub struct GroqConfig {
    #[serde(default = "default_groq_url")]
    pub base_url: String,
    #[serde(default = "default_groq_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_groq_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_groq_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_groq_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_groq_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            base_url: default_groq_url(),
            embed_model: default_groq_embed_model(),
            chat_model: default_groq_chat_model(),
            max_attempts: default_groq_attempts(),
            base_delay_ms: default_groq_base_delay_ms(),
            max_delay_ms: default_groq_max_delay_ms(),
        }
    }
}

fn default_groq_url() -> String {
    "https://api.groq.com/openai".to_string()
}
fn default_groq_embed_model() -> String {
    "nomic-embed-text-v1.5".to_string()
}
fn default_groq_chat_model() -> String {
    "llama-3.1-70b-versatile".to_string()
}
fn default_groq_attempts() -> u32 {
    3
}
fn default_groq_base_delay_ms() -> u64 {
    500
}
fn default_groq_max_delay_ms() -> u64 {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardrailsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.fetch_k < config.retrieval.k {
        anyhow::bail!("retrieval.fetch_k must be >= retrieval.k");
    }
    match config.retrieval.search_type.as_str() {
        "similarity" | "mmr" => {}
        other => anyhow::bail!(
            "Unknown retrieval.search_type: '{}'. Must be similarity or mmr.",
            other
        ),
    }
    if !(0.0..=1.0).contains(&config.retrieval.mmr_lambda) {
        anyhow::bail!("retrieval.mmr_lambda must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.retrieval.relevance_gate) {
        anyhow::bail!("retrieval.relevance_gate must be in [0.0, 1.0]");
    }

    if config.indexing.batch_chunk_cap == 0 || config.indexing.batch_token_budget == 0 {
        anyhow::bail!("indexing batch limits must be > 0");
    }

    let weight_sum = config.ranking.relevance_weight + config.ranking.educational_weight;
    if (weight_sum - 1.0).abs() > 1e-6 {
        anyhow::bail!("ranking weights must sum to 1.0 (got {})", weight_sum);
    }

    Ok(config)
}
