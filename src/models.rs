//! Core data models used throughout the Força RAG pipeline.
//!
//! These types represent the documents, chunks, and answer sources that flow
//! through ingestion, indexing, retrieval, and answer composition.

use chrono::{DateTime, Utc};

/// Content kind of an ingested material file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Pdf,
    Spreadsheet,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Pdf => "pdf",
            ContentType::Spreadsheet => "spreadsheet",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "spreadsheet" => ContentType::Spreadsheet,
            _ => ContentType::Pdf,
        }
    }

    /// Label used in rendered citations ("(PDF)", "(Planilha)").
    pub fn citation_label(&self) -> &'static str {
        match self {
            ContentType::Pdf => "PDF",
            ContentType::Spreadsheet => "Planilha",
        }
    }
}

/// Typed metadata attached to a document at ingestion and inherited by its
/// chunks. Replaces the original's open string-keyed metadata map: the
/// `content_type` and `knowledge_base_id` fields are always present by
/// construction, so downstream filtering never has to backfill them.
#[derive(Debug, Clone)]
pub struct DocMeta {
    pub source_path: String,
    pub content_type: ContentType,
    pub knowledge_base_id: String,
    /// Page number within the source file, when the extractor can tell.
    pub page: Option<u32>,
    pub course_code: Option<String>,
    pub module: Option<u32>,
    pub lesson: Option<u32>,
    pub lesson_name: Option<String>,
    pub summary: Option<String>,
    pub difficulty: Option<String>,
    pub key_concepts: Vec<String>,
    /// Set when the ingestion guardrail redacted anything from the body.
    pub sanitized: bool,
    pub processed_at: DateTime<Utc>,
}

impl DocMeta {
    pub fn new(source_path: &str, content_type: ContentType, knowledge_base_id: &str) -> Self {
        Self {
            source_path: source_path.to_string(),
            content_type,
            knowledge_base_id: knowledge_base_id.to_string(),
            page: None,
            course_code: None,
            module: None,
            lesson: None,
            lesson_name: None,
            summary: None,
            difficulty: None,
            key_concepts: Vec::new(),
            sanitized: false,
            processed_at: Utc::now(),
        }
    }
}

/// Ingestion unit: normalized text plus typed metadata. Consumed by the
/// indexer and discarded after splitting — the chunk is the persisted unit.
#[derive(Debug, Clone)]
pub struct Document {
    pub body: String,
    pub meta: DocMeta,
}

/// Persisted unit: a bounded substring of a document's body. The id is
/// stable, derived from the source path and chunk position, so reprocessing
/// an unchanged corpus produces the same ids.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub meta: DocMeta,
}

/// One retrieved chunk's presentation record, created per query and never
/// persisted. Ordering within a response is significant (best first).
#[derive(Debug, Clone)]
pub struct Source {
    pub title: String,
    pub source_path: String,
    pub page: Option<u32>,
    /// Full chunk text; this is what reaches the model context.
    pub text: String,
    /// Short display form of `text` for rendered source listings.
    pub excerpt: String,
    pub content_type: ContentType,
    pub module: Option<u32>,
    pub lesson: Option<u32>,
    pub lesson_name: Option<String>,
    pub difficulty: Option<String>,
    pub key_concepts: Vec<String>,
    pub summary: Option<String>,
    /// Retrieval similarity, as reported by the store.
    pub relevance_score: f64,
    /// Heuristic score computed at ranking time.
    pub educational_value: f64,
}

/// Final answer returned to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    pub answer: String,
    pub sources: Vec<Source>,
}
