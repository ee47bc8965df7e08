//! End-to-end pipeline tests over a temporary store: ingest spreadsheets,
//! index with a deterministic in-process embedder, retrieve, and compose
//! answers with a scripted chat model. No network access anywhere.

use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use forca_rag::compose::{AnswerComposer, NO_RESULTS_REPLY};
use forca_rag::config::{
    ChunkingConfig, Config, GuardrailsConfig, IndexingConfig, MaterialsConfig, ProvidersConfig,
    RankingConfig, RetrievalConfig, StoreConfig,
};
use forca_rag::embedding::EmbeddingClient;
use forca_rag::ingest::{index_documents, prune_missing_sources, IngestReport, Ingestor};
use forca_rag::llm::ChatClient;
use forca_rag::providers::{ProviderKind, ProviderRegistry};
use forca_rag::retrieve::{AliasTable, Retriever};
use forca_rag::store::VectorStore;

/// Deterministic embedder: a byte-bucket histogram, normalized. Identical
/// texts embed identically; texts sharing vocabulary land nearby.
struct HashEmbedder {
    batches: AtomicUsize,
}

impl HashEmbedder {
    fn new() -> Self {
        Self {
            batches: AtomicUsize::new(0),
        }
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut buckets = [0.0f32; 16];
        for word in text.to_lowercase().split_whitespace() {
            let mut h = 0usize;
            for b in word.bytes() {
                h = h.wrapping_mul(31).wrapping_add(b as usize);
            }
            buckets[h % 16] += 1.0;
        }
        let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut buckets {
                *v /= norm;
            }
        }
        buckets.to_vec()
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }
    fn model_name(&self) -> &str {
        "hash-test"
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

struct ScriptedChat {
    calls: AtomicUsize,
    reply: String,
}

impl ScriptedChat {
    fn new(reply: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(user.contains("Contexto"), "prompt must carry the context");
        Ok(self.reply.clone())
    }
}

fn make_xlsx(rows: &[&[&str]]) -> Vec<u8> {
    let mut sheet = String::from(
        r#"<?xml version="1.0"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for row in rows {
        sheet.push_str("<row>");
        for cell in *row {
            sheet.push_str(&format!("<c t=\"str\"><v>{}</v></c>", cell));
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut cursor);
    writer
        .start_file("xl/worksheets/sheet1.xml", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(sheet.as_bytes()).unwrap();
    writer.finish().unwrap();
    cursor.into_inner()
}

fn test_config(root: &Path) -> Config {
    Config {
        store: StoreConfig {
            path: root.join("data"),
            collection: "forca_knowledge".to_string(),
        },
        materials: MaterialsConfig {
            dir: root.join("materials"),
            catalog_prefix: "estrutura".to_string(),
            aliases_file: None,
            knowledge_base_id: "dna_forca".to_string(),
        },
        chunking: ChunkingConfig {
            chunk_size: 400,
            chunk_overlap: 80,
        },
        indexing: IndexingConfig::default(),
        retrieval: RetrievalConfig::default(),
        ranking: RankingConfig::default(),
        providers: ProvidersConfig::default(),
        guardrails: GuardrailsConfig::default(),
    }
}

fn write_file(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join("materials").join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn seed_materials(root: &Path) {
    write_file(
        root,
        "estrutura_curso.xlsx",
        &make_xlsx(&[
            &["Código", "Módulo", "Aula", "Nome da Aula", "Resumo"],
            &["AF03", "2", "5", "Hipertrofia", "Bases da hipertrofia muscular"],
            &["AF07", "3", "1", "Mobilidade", "Amplitude de movimento e mobilidade"],
        ]),
    );
    write_file(
        root,
        "AF03_hipertrofia.xlsx",
        &make_xlsx(&[
            &["Tema", "Conteúdo"],
            &[
                "hipertrofia",
                "A hipertrofia muscular depende de sobrecarga progressiva volume e recuperação",
            ],
            &[
                "séries",
                "Para hipertrofia recomenda-se treinar cada grupo muscular com volume semanal adequado",
            ],
        ]),
    );
    write_file(
        root,
        "AF07_mobilidade.xlsx",
        &make_xlsx(&[
            &["Tema", "Conteúdo"],
            &[
                "amplitude",
                "A amplitude de movimento completa no agachamento melhora a mobilidade do quadril",
            ],
        ]),
    );
}

async fn ingest_all(config: &Config, store: &VectorStore, embedder: &HashEmbedder) -> IngestReport {
    let ingestor = Ingestor::new(config).unwrap();
    let (documents, messages) = ingestor.load_all().unwrap();
    let mut report = IngestReport {
        files_failed: messages.len(),
        messages,
        ..Default::default()
    };
    index_documents(
        store,
        &config.store.collection,
        embedder,
        config,
        &documents,
        false,
        &mut report,
    )
    .await
    .unwrap();
    report
}

#[tokio::test]
async fn test_ingest_then_answer_with_citation() {
    let dir = TempDir::new().unwrap();
    seed_materials(dir.path());
    let config = test_config(dir.path());
    let store = VectorStore::open(&config.store.path).await.unwrap();
    let embedder = HashEmbedder::new();

    let report = ingest_all(&config, &store, &embedder).await;
    assert_eq!(report.files_failed, 0);
    assert!(report.chunks_indexed >= 2);

    let aliases = AliasTable::with_defaults();
    let retriever = Retriever::new(&store, &config.retrieval, &aliases);
    let registry = ProviderRegistry::new(config.providers.clone());

    let retrieval = retriever
        .retrieve(
            &embedder,
            &registry,
            &config.store.collection,
            "hipertrofia muscular depende de sobrecarga progressiva volume",
        )
        .await
        .unwrap();
    assert!(!retrieval.hits.is_empty());
    assert!(retrieval.hits[0].chunk.text.contains("hipertrofia"));
    assert_eq!(retrieval.hits[0].chunk.meta.module, Some(2));

    let chat = ScriptedChat::new(
        "A hipertrofia muscular é estimulada por sobrecarga progressiva, com volume e \
         recuperação adequados, conforme a aula de hipertrofia.",
    );
    let composer = AnswerComposer::new(&config.retrieval, &config.ranking, &config.guardrails);
    let composition = composer
        .compose(
            &chat,
            &registry,
            "hipertrofia muscular depende de sobrecarga progressiva volume",
            retrieval.hits,
            None,
        )
        .await
        .unwrap();

    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    let answer = &composition.response.answer;
    assert!(answer.contains("📚 Fontes:"));
    assert!(answer.contains("Módulo 2, Aula 5 — 'Hipertrofia' (Planilha)"));
}

#[tokio::test]
async fn test_reingest_unchanged_corpus_embeds_nothing() {
    let dir = TempDir::new().unwrap();
    seed_materials(dir.path());
    let config = test_config(dir.path());
    let store = VectorStore::open(&config.store.path).await.unwrap();

    let embedder = HashEmbedder::new();
    let first = ingest_all(&config, &store, &embedder).await;
    assert!(first.chunks_indexed > 0);
    assert_eq!(first.chunks_skipped, 0);
    let batches_after_first = embedder.batches.load(Ordering::SeqCst);
    let count_after_first = store.count_chunks(&config.store.collection).await.unwrap();

    let second = ingest_all(&config, &store, &embedder).await;
    assert_eq!(second.chunks_indexed, 0);
    assert_eq!(second.chunks_skipped, first.chunks_indexed);
    assert_eq!(embedder.batches.load(Ordering::SeqCst), batches_after_first);
    assert_eq!(
        store.count_chunks(&config.store.collection).await.unwrap(),
        count_after_first
    );
}

#[tokio::test]
async fn test_changed_source_reembeds_only_new_content() {
    let dir = TempDir::new().unwrap();
    seed_materials(dir.path());
    let config = test_config(dir.path());
    let store = VectorStore::open(&config.store.path).await.unwrap();

    let embedder = HashEmbedder::new();
    let first = ingest_all(&config, &store, &embedder).await;

    // Rewrite one material with different content.
    write_file(
        dir.path(),
        "AF07_mobilidade.xlsx",
        &make_xlsx(&[
            &["Tema", "Conteúdo"],
            &[
                "amplitude",
                "Conteúdo revisado sobre amplitude articular e rotina diária de mobilidade",
            ],
        ]),
    );

    let second = ingest_all(&config, &store, &embedder).await;
    assert!(second.chunks_indexed >= 1);
    assert!(second.chunks_indexed < first.chunks_indexed);
    assert!(second.chunks_skipped > 0);
}

#[tokio::test]
async fn test_shrunken_source_drops_stale_chunks() {
    let dir = TempDir::new().unwrap();
    seed_materials(dir.path());
    let config = test_config(dir.path());
    let store = VectorStore::open(&config.store.path).await.unwrap();
    let embedder = HashEmbedder::new();

    // A long source spanning several chunks.
    let long_rows: Vec<Vec<&str>> = (0..12)
        .map(|_| {
            vec![
                "treino",
                "O planejamento de treino de força combina intensidade volume e frequência \
                 semanal ajustados ao nível do aluno e ao objetivo da fase",
            ]
        })
        .collect();
    let long_refs: Vec<&[&str]> = long_rows.iter().map(|r| r.as_slice()).collect();
    write_file(dir.path(), "AF09_forca.xlsx", &make_xlsx(&long_refs));

    ingest_all(&config, &store, &embedder).await;
    let before = store
        .source_hashes(&config.store.collection, "AF09_forca.xlsx")
        .await
        .unwrap();
    assert!(before.len() > 1, "source should span multiple chunks");

    // Shrink the source to a single short chunk and re-ingest without force.
    write_file(
        dir.path(),
        "AF09_forca.xlsx",
        &make_xlsx(&[
            &["Tema", "Conteúdo"],
            &["treino", "Resumo curto do planejamento de treino de força"],
        ]),
    );
    ingest_all(&config, &store, &embedder).await;

    let after = store
        .source_hashes(&config.store.collection, "AF09_forca.xlsx")
        .await
        .unwrap();
    assert_eq!(after.len(), 1, "stale tail chunks must be removed");
}

#[tokio::test]
async fn test_deleted_source_is_pruned() {
    let dir = TempDir::new().unwrap();
    seed_materials(dir.path());
    let config = test_config(dir.path());
    let store = VectorStore::open(&config.store.path).await.unwrap();
    let embedder = HashEmbedder::new();
    ingest_all(&config, &store, &embedder).await;
    assert!(!store
        .source_hashes(&config.store.collection, "AF07_mobilidade.xlsx")
        .await
        .unwrap()
        .is_empty());

    std::fs::remove_file(dir.path().join("materials/AF07_mobilidade.xlsx")).unwrap();

    let ingestor = Ingestor::new(&config).unwrap();
    let keep = ingestor.discovered_sources().unwrap();
    let mut report = IngestReport::default();
    prune_missing_sources(&store, &config.store.collection, &keep, &mut report)
        .await
        .unwrap();

    assert!(store
        .source_hashes(&config.store.collection, "AF07_mobilidade.xlsx")
        .await
        .unwrap()
        .is_empty());
    assert!(!store
        .source_hashes(&config.store.collection, "AF03_hipertrofia.xlsx")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(report.messages.len(), 1);
}

#[tokio::test]
async fn test_empty_index_yields_no_results_reply() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let store = VectorStore::open(&config.store.path).await.unwrap();

    let embedder = HashEmbedder::new();
    let aliases = AliasTable::with_defaults();
    let retriever = Retriever::new(&store, &config.retrieval, &aliases);
    let registry = ProviderRegistry::new(config.providers.clone());

    let retrieval = retriever
        .retrieve(
            &embedder,
            &registry,
            &config.store.collection,
            "o que é periodização?",
        )
        .await
        .unwrap();
    assert!(retrieval.hits.is_empty());

    let chat = ScriptedChat::new("nunca chamado");
    let composer = AnswerComposer::new(&config.retrieval, &config.ranking, &config.guardrails);
    let composition = composer
        .compose(&chat, &registry, "o que é periodização?", retrieval.hits, None)
        .await
        .unwrap();

    assert_eq!(composition.response.answer, NO_RESULTS_REPLY);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_switching_embedder_fails_fast() {
    let dir = TempDir::new().unwrap();
    seed_materials(dir.path());
    let config = test_config(dir.path());
    let store = VectorStore::open(&config.store.path).await.unwrap();

    let embedder = HashEmbedder::new();
    ingest_all(&config, &store, &embedder).await;

    let err = store
        .bind_embedding_identity(&config.store.collection, "openai:text-embedding-3-small")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("indexed with embedding model"));
}

#[tokio::test]
async fn test_alias_expansion_bridges_vocabulary() {
    let dir = TempDir::new().unwrap();
    seed_materials(dir.path());
    let config = test_config(dir.path());
    let store = VectorStore::open(&config.store.path).await.unwrap();
    let embedder = HashEmbedder::new();
    ingest_all(&config, &store, &embedder).await;

    let aliases = AliasTable::with_defaults();
    let registry = ProviderRegistry::new(config.providers.clone());
    let retriever = Retriever::new(&store, &config.retrieval, &aliases);

    let retrieval = retriever
        .retrieve(
            &embedder,
            &registry,
            &config.store.collection,
            "qual a amplitude ideal?",
        )
        .await
        .unwrap();
    assert!(retrieval.expanded_query.contains("amplitude de movimento"));
}
