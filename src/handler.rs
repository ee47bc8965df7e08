//! Top-level orchestration: one handler owns the store, the provider
//! session, and the pipeline stages, and exposes the operations the CLI
//! runs (ingest, ask, stats, providers).

use anyhow::{bail, Result};
use std::path::Path;

use crate::compose::{AnswerComposer, NO_RESULTS_REPLY};
use crate::config::Config;
use crate::ingest::{index_documents, prune_missing_sources, IngestReport, Ingestor};
use crate::models::Response;
use crate::providers::{ProviderRegistry, ProviderSession, ProviderStatus};
use crate::retrieve::{AliasTable, Retriever};
use crate::store::{CollectionInfo, VectorStore};

/// Snapshot reported by `forca stats`.
pub struct SystemStats {
    pub active_collection: String,
    pub embedding_identity: String,
    pub chat_model: String,
    pub collections: Vec<CollectionInfo>,
}

pub struct RagHandler {
    config: Config,
    store: VectorStore,
    registry: ProviderRegistry,
    aliases: AliasTable,
    session: ProviderSession,
}

impl RagHandler {
    /// Open the store and resolve the first available provider session.
    pub async fn new(config: Config) -> Result<Self> {
        let store = VectorStore::open(&config.store.path).await?;
        let registry = ProviderRegistry::new(config.providers.clone());
        let session = registry.resolve_session().await?;
        let aliases = AliasTable::load(config.materials.aliases_file.as_deref())?;

        println!(
            "Providers: embeddings {} ({}), chat {} ({})",
            session.embeddings.kind(),
            session.embeddings.model_name(),
            session.chat.kind(),
            session.chat.model_name()
        );

        Ok(Self {
            config,
            store,
            registry,
            aliases,
            session,
        })
    }

    /// Ingest and index the whole materials directory. Sources whose file
    /// disappeared since the last run are pruned from the collection.
    pub async fn process_documents(&mut self, force: bool) -> Result<IngestReport> {
        let ingestor = Ingestor::new(&self.config)?;
        let (documents, messages) = ingestor.load_all()?;
        let keep = ingestor.discovered_sources()?;
        let mut report = self.index(documents, messages, force).await?;
        prune_missing_sources(&self.store, &self.config.store.collection, &keep, &mut report)
            .await?;
        Ok(report)
    }

    /// Ingest and index a single material file.
    pub async fn ingest_file(&mut self, path: &Path, force: bool) -> Result<IngestReport> {
        let ingestor = Ingestor::new(&self.config)?;
        let documents = ingestor.load_file(path)?;
        if documents.is_empty() {
            bail!("No usable content in {}", path.display());
        }

        // Single-file ingestion replaces that source's chunks, never the
        // whole collection.
        if force {
            let collection = &self.config.store.collection;
            for source in documents.iter().map(|d| d.meta.source_path.clone()) {
                self.store.delete_source(collection, &source).await?;
            }
        }
        self.index(documents, Vec::new(), false).await
    }

    async fn index(
        &mut self,
        documents: Vec<crate::models::Document>,
        messages: Vec<String>,
        force: bool,
    ) -> Result<IngestReport> {
        let mut report = IngestReport {
            files_failed: messages.len(),
            messages,
            ..Default::default()
        };
        report.files_ok = {
            let mut sources: Vec<&str> =
                documents.iter().map(|d| d.meta.source_path.as_str()).collect();
            sources.sort_unstable();
            sources.dedup();
            sources.len()
        };

        index_documents(
            &self.store,
            &self.config.store.collection,
            self.session.embeddings.as_ref(),
            &self.config,
            &documents,
            force,
            &mut report,
        )
        .await?;

        Ok(report)
    }

    /// Answer one student question from the indexed materials.
    pub async fn generate_response(
        &mut self,
        question: &str,
        student_level: Option<&str>,
    ) -> Result<Response> {
        let collection = self
            .store
            .resolve_collection(&self.config.store.collection)
            .await?;

        if self.store.count_chunks(&collection).await? == 0 {
            return Ok(Response {
                answer: NO_RESULTS_REPLY.to_string(),
                sources: Vec::new(),
            });
        }

        // Querying with a different embedding model than the one that built
        // the index would compare incompatible vectors.
        if let Some(stored) = self.store.embedding_identity(&collection).await? {
            let active = self.session.embedding_identity();
            if stored != active {
                bail!(
                    "Collection '{}' was indexed with embedding model '{}' but the active \
                     model is '{}'. Re-ingest with --force or switch providers.",
                    collection,
                    stored,
                    active
                );
            }
        }

        let retriever = Retriever::new(&self.store, &self.config.retrieval, &self.aliases);
        let retrieval = retriever
            .retrieve(
                self.session.embeddings.as_ref(),
                &self.registry,
                &collection,
                question,
            )
            .await?;
        if let Some(embeddings) = retrieval.replacement {
            self.session.embeddings = embeddings;
        }

        let composer = AnswerComposer::new(
            &self.config.retrieval,
            &self.config.ranking,
            &self.config.guardrails,
        );
        let composition = composer
            .compose(
                self.session.chat.as_ref(),
                &self.registry,
                question,
                retrieval.hits,
                student_level,
            )
            .await?;
        if let Some(chat) = composition.replacement {
            self.session.chat = chat;
        }

        Ok(composition.response)
    }

    pub async fn stats(&self) -> Result<SystemStats> {
        let active = self
            .store
            .resolve_collection(&self.config.store.collection)
            .await?;
        Ok(SystemStats {
            active_collection: active,
            embedding_identity: self.session.embedding_identity(),
            chat_model: format!(
                "{}:{}",
                self.session.chat.kind(),
                self.session.chat.model_name()
            ),
            collections: self.store.list_collections().await?,
        })
    }

    pub async fn provider_status(&self) -> Vec<ProviderStatus> {
        self.registry.status().await
    }
}
