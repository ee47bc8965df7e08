//! Material ingestion: discovery, extraction, enrichment, and indexing.
//!
//! The materials directory is walked for PDFs and spreadsheets. Catalog
//! spreadsheets (stem starting with the configured prefix) load first and
//! enrich every other document with module/lesson metadata. Each document
//! passes the safety gate before indexing: flagged content is redacted (and
//! marked as such), critical-risk content is dropped with a warning.
//!
//! A failing file never aborts the run; it is reported and skipped.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::catalog::Catalog;
use crate::chunk::{batch_chunks, chunk_document};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::extract::{extract_pdf_pages, extract_xlsx_text, ExtractError};
use crate::guardrails::{self, RiskLevel};
use crate::models::{Chunk, ContentType, DocMeta, Document};
use crate::store::VectorStore;

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_ok: usize,
    pub files_failed: usize,
    pub documents: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped: usize,
    /// Per-file warnings, in discovery order.
    pub messages: Vec<String>,
}

fn material_globs() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ["*.pdf", "*.PDF", "*.xlsx", "*.XLSX"] {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Walk the materials directory. Returns catalog spreadsheets and regular
/// material files separately, both sorted for deterministic processing.
pub fn discover_files(dir: &Path, catalog_prefix: &str) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    if !dir.is_dir() {
        bail!("Materials directory not found: {}", dir.display());
    }

    let globs = material_globs()?;
    let mut catalogs = Vec::new();
    let mut materials = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !globs.is_match(&name) {
            continue;
        }

        let stem_lower = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let is_xlsx = name.to_lowercase().ends_with(".xlsx");

        if is_xlsx && stem_lower.starts_with(&catalog_prefix.to_lowercase()) {
            catalogs.push(entry.into_path());
        } else {
            materials.push(entry.into_path());
        }
    }

    catalogs.sort();
    materials.sort();
    Ok((catalogs, materials))
}

pub struct Ingestor<'a> {
    config: &'a Config,
    catalog: Catalog,
}

impl<'a> Ingestor<'a> {
    /// Build the ingestor, loading the course catalog when one exists.
    pub fn new(config: &'a Config) -> Result<Self> {
        let (catalog_files, _) =
            discover_files(&config.materials.dir, &config.materials.catalog_prefix)?;

        let mut catalog = Catalog::default();
        for path in &catalog_files {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
            match Catalog::from_xlsx(&bytes) {
                Ok(parsed) if !parsed.is_empty() => {
                    println!(
                        "Loaded catalog {} ({} lessons)",
                        path.display(),
                        parsed.len()
                    );
                    catalog = parsed;
                    break;
                }
                Ok(_) => eprintln!("Warning: catalog {} has no rows", path.display()),
                Err(e) => eprintln!("Warning: skipping catalog {}: {}", path.display(), e),
            }
        }

        Ok(Self { config, catalog })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Load every material file into documents. Failures are collected as
    /// messages, not errors.
    pub fn load_all(&self) -> Result<(Vec<Document>, Vec<String>)> {
        let (_, materials) =
            discover_files(&self.config.materials.dir, &self.config.materials.catalog_prefix)?;

        let mut documents = Vec::new();
        let mut messages = Vec::new();
        for path in &materials {
            match self.load_file(path) {
                Ok(mut docs) => documents.append(&mut docs),
                Err(e) => {
                    let msg = format!("Skipped {}: {:#}", path.display(), e);
                    eprintln!("Warning: {}", msg);
                    messages.push(msg);
                }
            }
        }
        Ok((documents, messages))
    }

    /// Load one material file into documents: one per PDF page (when page
    /// breaks are detectable), one per spreadsheet.
    pub fn load_file(&self, path: &Path) -> Result<Vec<Document>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let source_path = self.relative_source_path(path);
        let kb = &self.config.materials.knowledge_base_id;

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut documents = match extension.as_str() {
            "pdf" => extract_pdf_pages(&bytes)?
                .into_iter()
                .map(|page| {
                    let mut meta = DocMeta::new(&source_path, ContentType::Pdf, kb);
                    meta.page = page.page;
                    Document {
                        body: page.text,
                        meta,
                    }
                })
                .collect(),
            "xlsx" => {
                let text = extract_xlsx_text(&bytes)?;
                vec![Document {
                    body: text,
                    meta: DocMeta::new(&source_path, ContentType::Spreadsheet, kb),
                }]
            }
            other => return Err(ExtractError::UnsupportedExtension(other.to_string()).into()),
        };

        documents.retain(|d| !d.body.trim().is_empty());
        for doc in &mut documents {
            self.catalog.enrich(doc);
        }

        if self.config.guardrails.enabled {
            documents = apply_safety_gate(documents);
        }

        Ok(documents)
    }

    /// Relative source paths of every discovered material file, whether or
    /// not it loads cleanly.
    pub fn discovered_sources(&self) -> Result<Vec<String>> {
        let (_, materials) =
            discover_files(&self.config.materials.dir, &self.config.materials.catalog_prefix)?;
        Ok(materials
            .iter()
            .map(|p| self.relative_source_path(p))
            .collect())
    }

    fn relative_source_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.config.materials.dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Redact flagged material before it can reach the index. Critical-risk
/// segments (credentials, card numbers) are dropped entirely.
fn apply_safety_gate(documents: Vec<Document>) -> Vec<Document> {
    let mut kept = Vec::with_capacity(documents.len());
    for mut doc in documents {
        let analysis = guardrails::analyze_content(&doc.body);
        if analysis.is_safe {
            kept.push(doc);
            continue;
        }
        if analysis.risk_level >= RiskLevel::Critical {
            eprintln!(
                "Warning: dropping {} (page {:?}): critical-risk content ({} findings)",
                doc.meta.source_path,
                doc.meta.page,
                analysis.flagged.len()
            );
            continue;
        }
        doc.body = guardrails::sanitize_content(&doc.body);
        doc.meta.sanitized = true;
        kept.push(doc);
    }
    kept
}

/// Chunk, embed, and store a set of documents.
///
/// Unless `force` is set, chunks whose stable id and content hash already
/// match the store are skipped, so re-ingesting an unchanged corpus embeds
/// nothing. If a source regenerates into a different id set (it shrank, or
/// its page layout changed), its stored rows are deleted and the source is
/// rebuilt whole, so stale chunks never survive a re-ingest. With `force`,
/// the collection is cleared and rebuilt, which also releases its
/// embedding-model binding.
pub async fn index_documents(
    store: &VectorStore,
    collection: &str,
    embeddings: &dyn EmbeddingClient,
    config: &Config,
    documents: &[Document],
    force: bool,
    report: &mut IngestReport,
) -> Result<()> {
    if force {
        store.clear_collection(collection).await?;
    }

    let identity = format!("{}:{}", embeddings.kind(), embeddings.model_name());
    store.bind_embedding_identity(collection, &identity).await?;

    let mut by_source: BTreeMap<String, Vec<Chunk>> = BTreeMap::new();
    for doc in documents {
        let chunks = chunk_document(
            doc,
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        );
        by_source
            .entry(doc.meta.source_path.clone())
            .or_default()
            .extend(chunks);
        report.documents += 1;
    }

    let mut pending = Vec::new();
    for (source, chunks) in by_source {
        if force {
            pending.extend(chunks);
            continue;
        }

        let stored = store.source_hashes(collection, &source).await?;
        let regenerated: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        if stored.keys().any(|id| !regenerated.contains(id.as_str())) {
            store.delete_source(collection, &source).await?;
            pending.extend(chunks);
            continue;
        }

        for chunk in chunks {
            let unchanged = stored.get(&chunk.id).map(String::as_str) == Some(chunk.hash.as_str());
            if unchanged {
                report.chunks_skipped += 1;
            } else {
                pending.push(chunk);
            }
        }
    }

    let batches = batch_chunks(
        pending,
        config.indexing.batch_token_budget,
        config.indexing.batch_chunk_cap,
    );

    for batch in batches {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embeddings
            .embed_texts(&texts)
            .await
            .context("Embedding batch failed")?;
        store.add_chunks(collection, &batch, &vectors).await?;
        report.chunks_indexed += batch.len();
    }

    Ok(())
}

/// Drop stored chunks whose source file is no longer present in the
/// materials directory. `keep` is the set of currently discovered sources.
pub async fn prune_missing_sources(
    store: &VectorStore,
    collection: &str,
    keep: &[String],
    report: &mut IngestReport,
) -> Result<()> {
    for source in store.list_sources(collection).await? {
        if keep.iter().any(|k| k == &source) {
            continue;
        }
        let removed = store.delete_source(collection, &source).await?;
        let msg = format!("Removed {} stale chunks for deleted source {}", removed, source);
        println!("{}", msg);
        report.messages.push(msg);
    }
    Ok(())
}
