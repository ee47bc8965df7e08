//! Answer composition: ranking, sufficiency gates, prompting, and
//! post-validation.
//!
//! Retrieved chunks are re-ranked by a weighted blend of retrieval
//! similarity and a heuristic educational value, then gated: when the
//! surviving context is too thin or clearly off-topic, a fixed Portuguese
//! reply goes out and the language model is never called. Generated answers
//! are validated, redacted, and stamped with source citations.

use anyhow::Result;

use crate::config::{GuardrailsConfig, RankingConfig, RetrievalConfig};
use crate::guardrails;
use crate::llm::ChatClient;
use crate::models::{Response, Source};
use crate::providers::ProviderRegistry;
use crate::store::ScoredChunk;

/// Fixed reply when the index returned nothing at all.
pub const NO_RESULTS_REPLY: &str = "Não encontrei informações sobre esse tema nos materiais do \
    curso. Tente reformular a pergunta ou verifique se o conteúdo já foi ingerido.";

/// Fixed reply when retrieval found something, but too little to answer from.
pub const INSUFFICIENT_CONTEXT_REPLY: &str = "Os materiais do curso contêm apenas menções breves \
    a esse tema, insuficientes para uma resposta completa. Tente uma pergunta mais específica \
    sobre o conteúdo das aulas.";

/// Fixed reply when the retrieved context does not actually match the question.
pub const NOT_RELEVANT_REPLY: &str = "Não encontrei conteúdo diretamente relacionado à sua \
    pergunta nos materiais do curso. Reformule usando os termos das aulas ou consulte a \
    estrutura do curso.";

/// Fixed reply when every chat provider failed.
pub const TECHNICAL_DIFFICULTY_REPLY: &str = "Estou com dificuldades técnicas para gerar a \
    resposta neste momento. Tente novamente em alguns instantes.";

const SYSTEM_PROMPT: &str = "Você é um assistente educacional do curso DNA da Força, \
    especializado em treinamento de força e educação física.\n\
    Regras:\n\
    - Responda SOMENTE com base no contexto fornecido abaixo. Não use conhecimento externo.\n\
    - Se o contexto não contém a resposta, diga claramente que não encontrou a informação \
    nos materiais do curso.\n\
    - Cite o módulo e a aula de onde a informação veio quando disponível.\n\
    - Responda em português, em tom didático e direto.";

/// Words shorter than this are ignored by the question/context overlap gate.
const OVERLAP_MIN_WORD_LEN: usize = 4;
/// Answers shorter than this get a rephrase suggestion appended.
const SHORT_ANSWER_CHARS: usize = 50;

/// Hedge phrases that signal generalization beyond the course material.
const HEDGE_MARKERS: [&str; 4] = [
    "estudos mostram",
    "pesquisas indicam",
    "é sempre",
    "geralmente se recomenda",
];

/// Outcome of one composition, including a replacement chat client when a
/// mid-answer failover happened.
pub struct Composition {
    pub response: Response,
    pub replacement: Option<Box<dyn ChatClient>>,
}

pub struct AnswerComposer<'a> {
    retrieval: &'a RetrievalConfig,
    ranking: &'a RankingConfig,
    guardrails: &'a GuardrailsConfig,
}

impl<'a> AnswerComposer<'a> {
    pub fn new(
        retrieval: &'a RetrievalConfig,
        ranking: &'a RankingConfig,
        guardrails: &'a GuardrailsConfig,
    ) -> Self {
        Self {
            retrieval,
            ranking,
            guardrails,
        }
    }

    /// Compose the final answer for a question from retrieved chunks.
    ///
    /// The gates run before any model call: an empty or insufficient context
    /// produces a fixed reply with zero chat invocations.
    pub async fn compose(
        &self,
        chat: &dyn ChatClient,
        registry: &ProviderRegistry,
        question: &str,
        hits: Vec<ScoredChunk>,
        student_level: Option<&str>,
    ) -> Result<Composition> {
        let sources = self.rank_sources(hits, student_level);

        if sources.is_empty() {
            return Ok(Composition {
                response: Response {
                    answer: NO_RESULTS_REPLY.to_string(),
                    sources,
                },
                replacement: None,
            });
        }

        // Gated replies carry no sources: citing material the answer did
        // not actually use would be misleading.
        let context = build_context(&sources);
        if context.chars().count() < self.retrieval.min_context_chars {
            return Ok(Composition {
                response: Response {
                    answer: INSUFFICIENT_CONTEXT_REPLY.to_string(),
                    sources: Vec::new(),
                },
                replacement: None,
            });
        }
        if question_overlap(question, &context) < self.retrieval.relevance_gate {
            return Ok(Composition {
                response: Response {
                    answer: NOT_RELEVANT_REPLY.to_string(),
                    sources: Vec::new(),
                },
                replacement: None,
            });
        }

        let user_prompt = format!(
            "Contexto dos materiais do curso:\n\n{}\n\nPergunta do aluno: {}",
            context, question
        );

        let (raw_answer, replacement) = match chat.complete(SYSTEM_PROMPT, &user_prompt).await {
            Ok(answer) => (answer, None),
            Err(e) => {
                eprintln!("Warning: chat provider {} failed: {}", chat.kind(), e);
                match registry.fallback_chat(chat.kind()).await {
                    Ok(fallback) => match fallback.complete(SYSTEM_PROMPT, &user_prompt).await {
                        Ok(answer) => (answer, Some(fallback)),
                        Err(e2) => {
                            eprintln!("Warning: fallback chat provider failed: {}", e2);
                            return Ok(Composition {
                                response: Response {
                                    answer: TECHNICAL_DIFFICULTY_REPLY.to_string(),
                                    sources,
                                },
                                replacement: Some(fallback),
                            });
                        }
                    },
                    Err(_) => {
                        return Ok(Composition {
                            response: Response {
                                answer: TECHNICAL_DIFFICULTY_REPLY.to_string(),
                                sources,
                            },
                            replacement: None,
                        });
                    }
                }
            }
        };

        let mut answer = validate_answer(raw_answer);
        if self.guardrails.enabled {
            let (sanitized, _) = guardrails::validate_and_sanitize_content(&answer, "resposta");
            answer = sanitized;
        }
        answer.push_str(&render_citations(&sources));

        Ok(Composition {
            response: Response { answer, sources },
            replacement,
        })
    }

    /// Convert scored chunks to presentation sources ranked by the weighted
    /// blend of similarity and educational value, keeping the top slice.
    pub fn rank_sources(&self, hits: Vec<ScoredChunk>, student_level: Option<&str>) -> Vec<Source> {
        let mut sources: Vec<Source> = hits
            .into_iter()
            .map(|hit| {
                let educational = educational_value(&hit, student_level);
                source_from_hit(hit, educational)
            })
            .collect();

        sources.sort_by(|a, b| {
            let score_a = self.combined_score(a);
            let score_b = self.combined_score(b);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sources.truncate(self.retrieval.max_context_chunks);
        sources
    }

    fn combined_score(&self, source: &Source) -> f64 {
        self.ranking.relevance_weight * source.relevance_score
            + self.ranking.educational_weight * source.educational_value
    }
}

/// Heuristic educational value of one chunk, in `[0.0, 1.0]`: richer
/// catalog metadata and a difficulty matching the student's level score
/// higher. Weights are initial estimates pending empirical validation.
pub fn educational_value(hit: &ScoredChunk, student_level: Option<&str>) -> f64 {
    let meta = &hit.chunk.meta;
    let mut value: f64 = 0.5;

    if let (Some(level), Some(difficulty)) = (student_level, meta.difficulty.as_deref()) {
        if level.eq_ignore_ascii_case(difficulty) {
            value += 0.3;
        }
    }
    if !meta.key_concepts.is_empty() {
        value += 0.1;
    }
    if meta.summary.is_some() {
        value += 0.1;
    }

    value.min(1.0)
}

fn source_from_hit(hit: ScoredChunk, educational_value: f64) -> Source {
    let meta = hit.chunk.meta;
    let title = meta
        .lesson_name
        .clone()
        .unwrap_or_else(|| file_stem(&meta.source_path));

    Source {
        title,
        source_path: meta.source_path,
        page: meta.page,
        excerpt: excerpt(&hit.chunk.text, 200),
        text: hit.chunk.text,
        content_type: meta.content_type,
        module: meta.module,
        lesson: meta.lesson,
        lesson_name: meta.lesson_name,
        difficulty: meta.difficulty,
        key_concepts: meta.key_concepts,
        summary: meta.summary,
        relevance_score: hit.similarity as f64,
        educational_value,
    }
}

fn file_stem(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// Model context: the full text of every surviving chunk. The per-chunk
/// budget is `max_context_chunks`; the short excerpt is display-only.
fn build_context(sources: &[Source]) -> String {
    sources
        .iter()
        .map(|s| format!("[{}]\n{}", s.title, s.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Share of the question's content words that appear in the context.
pub fn question_overlap(question: &str, context: &str) -> f64 {
    let context_lower = context.to_lowercase();
    let words: Vec<String> = question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= OVERLAP_MIN_WORD_LEN)
        .map(|w| w.to_string())
        .collect();

    if words.is_empty() {
        // Nothing to measure; let the answer through.
        return 1.0;
    }

    let matched = words.iter().filter(|w| context_lower.contains(w.as_str())).count();
    matched as f64 / words.len() as f64
}

/// Post-generation checks. Annotations only, never gates: flag
/// generalizations beyond the material, nudge the student when the model
/// produced almost nothing, and note the provenance when the answer never
/// referenced a module or lesson itself.
pub fn validate_answer(answer: String) -> String {
    let mut out = answer;
    let lowered = out.to_lowercase();

    if HEDGE_MARKERS.iter().any(|m| lowered.contains(m)) {
        out.push_str(
            "\n\n⚠️ Nota: parte desta resposta pode generalizar além do que os materiais do \
             curso afirmam. Confira a aula citada.",
        );
    } else if out.trim().chars().count() < SHORT_ANSWER_CHARS {
        out.push_str(
            "\n\nSe a resposta ficou incompleta, tente reformular a pergunta com mais detalhes.",
        );
    } else if !lowered.contains("módulo") && !lowered.contains("aula") && !lowered.contains("não encontr")
    {
        out.push_str("\n\nAs informações acima vêm dos materiais do curso listados nas fontes.");
    }

    out
}

/// Render one citation line: `Módulo X, Aula Y — 'Título' (PDF), p. N`,
/// degrading gracefully when catalog metadata is missing.
pub fn format_citation(source: &Source) -> String {
    let mut parts = Vec::new();
    if let Some(module) = source.module {
        parts.push(format!("Módulo {}", module));
    }
    if let Some(lesson) = source.lesson {
        parts.push(format!("Aula {}", lesson));
    }

    let label = source.content_type.citation_label();
    let mut line = if parts.is_empty() {
        format!("'{}' ({})", source.title, label)
    } else {
        format!("{} — '{}' ({})", parts.join(", "), source.title, label)
    };

    if let Some(page) = source.page {
        line.push_str(&format!(", p. {}", page));
    }
    line
}

fn render_citations(sources: &[Source]) -> String {
    let mut seen = std::collections::HashSet::new();
    let lines: Vec<String> = sources
        .iter()
        .map(format_citation)
        .filter(|line| seen.insert(line.clone()))
        .collect();

    let mut out = String::from("\n\n📚 Fontes:\n");
    for line in lines {
        out.push_str("- ");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GuardrailsConfig, RankingConfig, RetrievalConfig};
    use crate::models::{Chunk, ContentType, DocMeta};
    use crate::providers::{ProviderKind, ProviderRegistry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockChat {
        calls: AtomicUsize,
        reply: Result<String, String>,
    }

    impl MockChat {
        fn answering(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: Ok(reply.to_string()),
            }
        }

        fn failing(error: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: Err(error.to_string()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatClient for MockChat {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Groq
        }
        fn model_name(&self) -> &str {
            "mock"
        }
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    struct CapturingChat {
        prompt: std::sync::Mutex<Option<String>>,
    }

    impl CapturingChat {
        fn new() -> Self {
            Self {
                prompt: std::sync::Mutex::new(None),
            }
        }

        fn last_prompt(&self) -> String {
            self.prompt.lock().unwrap().clone().unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatClient for CapturingChat {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Groq
        }
        fn model_name(&self) -> &str {
            "capturing"
        }
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            *self.prompt.lock().unwrap() = Some(user.to_string());
            Ok("A resposta completa está descrita na aula citada do curso.".to_string())
        }
    }

    fn registry() -> ProviderRegistry {
        // Groq is last in the default order, so fallback_chat(Groq) finds
        // no candidates and fails fast without touching the network.
        ProviderRegistry::new(Default::default())
    }

    fn composer_configs() -> (RetrievalConfig, RankingConfig, GuardrailsConfig) {
        (
            RetrievalConfig::default(),
            RankingConfig::default(),
            GuardrailsConfig::default(),
        )
    }

    fn hit(id: &str, text: &str, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                chunk_index: 0,
                text: text.to_string(),
                hash: String::new(),
                meta: DocMeta::new("materials/AF03_hipertrofia.pdf", ContentType::Pdf, "kb"),
            },
            similarity,
            embedding: None,
        }
    }

    fn rich_hit(id: &str, text: &str, similarity: f32) -> ScoredChunk {
        let mut h = hit(id, text, similarity);
        h.chunk.meta.module = Some(2);
        h.chunk.meta.lesson = Some(5);
        h.chunk.meta.lesson_name = Some("Hipertrofia".to_string());
        h.chunk.meta.page = Some(12);
        h.chunk.meta.summary = Some("resumo".to_string());
        h.chunk.meta.key_concepts = vec!["sobrecarga".to_string()];
        h
    }

    const LONG_TEXT: &str = "A hipertrofia muscular depende de sobrecarga progressiva, \
        volume adequado de treino e recuperação suficiente entre as sessões de treinamento.";

    #[tokio::test]
    async fn test_empty_hits_fixed_reply_no_model_call() {
        let (r, k, g) = composer_configs();
        let composer = AnswerComposer::new(&r, &k, &g);
        let chat = MockChat::answering("nunca");

        let result = composer
            .compose(&chat, &registry(), "o que é hipertrofia?", vec![], None)
            .await
            .unwrap();

        assert_eq!(result.response.answer, NO_RESULTS_REPLY);
        assert!(result.response.sources.is_empty());
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn test_thin_context_gates_before_model() {
        let (r, k, g) = composer_configs();
        let composer = AnswerComposer::new(&r, &k, &g);
        let chat = MockChat::answering("nunca");

        let result = composer
            .compose(
                &chat,
                &registry(),
                "o que é hipertrofia?",
                vec![hit("a", "curto", 0.9)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.response.answer, INSUFFICIENT_CONTEXT_REPLY);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn test_off_topic_context_gates_before_model() {
        let (r, k, g) = composer_configs();
        let composer = AnswerComposer::new(&r, &k, &g);
        let chat = MockChat::answering("nunca");

        let off_topic = "Planilha de precificação de mensalidades e formas de pagamento \
            aceitas pela plataforma, incluindo boleto bancário e cartão de crédito.";
        let result = composer
            .compose(
                &chat,
                &registry(),
                "qual amplitude ideal no agachamento profundo?",
                vec![hit("a", off_topic, 0.4)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.response.answer, NOT_RELEVANT_REPLY);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn test_successful_answer_carries_citations() {
        let (r, k, g) = composer_configs();
        let composer = AnswerComposer::new(&r, &k, &g);
        let chat = MockChat::answering(
            "A hipertrofia muscular é o aumento do tamanho das fibras, estimulado por \
             sobrecarga progressiva no treinamento.",
        );

        let result = composer
            .compose(
                &chat,
                &registry(),
                "o que causa hipertrofia muscular no treinamento?",
                vec![rich_hit("a", LONG_TEXT, 0.9)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(chat.call_count(), 1);
        assert!(result.response.answer.contains("📚 Fontes:"));
        assert!(result
            .response
            .answer
            .contains("Módulo 2, Aula 5 — 'Hipertrofia' (PDF), p. 12"));
    }

    #[tokio::test]
    async fn test_prompt_carries_full_chunk_text() {
        let (r, k, g) = composer_configs();
        let composer = AnswerComposer::new(&r, &k, &g);
        let chat = CapturingChat::new();

        // A chunk near the default chunk_size, with a marker that sits well
        // past the display-excerpt cut.
        let mut body = String::from(
            "A hipertrofia muscular depende de sobrecarga progressiva e volume. ",
        );
        body.push_str(&"Cada sessão de treinamento acumula estímulo mecânico. ".repeat(4));
        body.push_str("PONTO_DE_REFERENCIA_TARDIO aparece apenas no fim do trecho. ");
        body.push_str(&"O descanso entre as sessões consolida a adaptação. ".repeat(10));
        assert!(body.find("PONTO_DE_REFERENCIA_TARDIO").unwrap() > 200);

        let result = composer
            .compose(
                &chat,
                &registry(),
                "o que causa hipertrofia muscular no treinamento?",
                vec![rich_hit("a", &body, 0.9)],
                None,
            )
            .await
            .unwrap();

        let prompt = chat.last_prompt();
        assert!(prompt.contains("PONTO_DE_REFERENCIA_TARDIO"));
        assert!(prompt.ends_with("o que causa hipertrofia muscular no treinamento?"));
        // The display excerpt stays short even though the prompt is not.
        let source = &result.response.sources[0];
        assert!(source.excerpt.chars().count() <= 201);
        assert!(source.text.contains("PONTO_DE_REFERENCIA_TARDIO"));
    }

    #[tokio::test]
    async fn test_all_chat_providers_down_yields_template() {
        let (r, k, g) = composer_configs();
        let composer = AnswerComposer::new(&r, &k, &g);
        let chat = MockChat::failing("connection refused");

        let result = composer
            .compose(
                &chat,
                &registry(),
                "o que causa hipertrofia muscular no treinamento?",
                vec![rich_hit("a", LONG_TEXT, 0.9)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(chat.call_count(), 1);
        assert_eq!(result.response.answer, TECHNICAL_DIFFICULTY_REPLY);
        // Sources still accompany the failure reply.
        assert_eq!(result.response.sources.len(), 1);
    }

    #[test]
    fn test_ranking_blends_relevance_and_educational_value() {
        let (r, k, g) = composer_configs();
        let composer = AnswerComposer::new(&r, &k, &g);

        // Slightly less similar but metadata-rich chunk with matching
        // difficulty: 0.85*0.80 + 0.15*1.0 = 0.830 beats
        // 0.85*0.82 + 0.15*0.5 = 0.772.
        let mut rich = rich_hit("rich", LONG_TEXT, 0.80);
        rich.chunk.meta.difficulty = Some("iniciante".to_string());
        let bare = hit("bare", LONG_TEXT, 0.82);

        let sources = composer.rank_sources(vec![bare, rich], Some("iniciante"));
        assert_eq!(sources[0].title, "Hipertrofia");
        assert!((sources[0].educational_value - 1.0).abs() < 1e-9);
        assert!((sources[1].educational_value - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ranking_truncates_to_max_context_chunks() {
        let (mut r, k, g) = composer_configs();
        r.max_context_chunks = 2;
        let composer = AnswerComposer::new(&r, &k, &g);

        let hits = (0..5)
            .map(|i| hit(&format!("c{}", i), LONG_TEXT, 0.9 - i as f32 * 0.1))
            .collect();
        let sources = composer.rank_sources(hits, None);
        assert_eq!(sources.len(), 2);
        assert!(sources[0].relevance_score >= sources[1].relevance_score);
    }

    #[test]
    fn test_educational_value_components() {
        let bare = hit("a", "x", 0.5);
        assert!((educational_value(&bare, None) - 0.5).abs() < 1e-9);

        let mut leveled = rich_hit("b", "x", 0.5);
        leveled.chunk.meta.difficulty = Some("Avancado".to_string());
        // summary + concepts + matching level (case-insensitive) = 1.0.
        assert!((educational_value(&leveled, Some("avancado")) - 1.0).abs() < 1e-9);
        // No stated level: the difficulty bonus does not apply.
        assert!((educational_value(&leveled, None) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_citation_degrades_without_catalog_metadata() {
        let source = AnswerComposer::new(
            &RetrievalConfig::default(),
            &RankingConfig::default(),
            &GuardrailsConfig::default(),
        )
        .rank_sources(vec![hit("a", LONG_TEXT, 0.9)], None)
        .remove(0);

        assert_eq!(format_citation(&source), "'AF03_hipertrofia' (PDF)");
    }

    #[test]
    fn test_citation_spreadsheet_label() {
        let mut h = rich_hit("a", LONG_TEXT, 0.9);
        h.chunk.meta.content_type = ContentType::Spreadsheet;
        h.chunk.meta.page = None;
        let source = AnswerComposer::new(
            &RetrievalConfig::default(),
            &RankingConfig::default(),
            &GuardrailsConfig::default(),
        )
        .rank_sources(vec![h], None)
        .remove(0);

        assert_eq!(
            format_citation(&source),
            "Módulo 2, Aula 5 — 'Hipertrofia' (Planilha)"
        );
    }

    #[test]
    fn test_validate_answer_flags_hedging() {
        let out = validate_answer(
            "Estudos mostram que mais volume é melhor para todos os praticantes.".to_string(),
        );
        assert!(out.contains("⚠️ Nota"));
    }

    #[test]
    fn test_validate_answer_nudges_short_replies() {
        let out = validate_answer("Sim.".to_string());
        assert!(out.contains("reformular a pergunta"));
    }

    #[test]
    fn test_validate_answer_leaves_good_answers_alone() {
        let answer = "A sobrecarga progressiva consiste em aumentar gradualmente a carga \
            ou o volume de treino, conforme descrito na aula."
            .to_string();
        assert_eq!(validate_answer(answer.clone()), answer);
    }

    #[test]
    fn test_question_overlap_ratio() {
        assert!(question_overlap("hipertrofia muscular", "a hipertrofia muscular depende") > 0.99);
        assert!(question_overlap("precificação boleto", "hipertrofia muscular") < 0.01);
        // Questions with only short words pass the gate.
        assert!((question_overlap("o que é?", "qualquer coisa") - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_answer_with_pii_gets_redacted() {
        let (r, k, g) = composer_configs();
        let composer = AnswerComposer::new(&r, &k, &g);
        let chat = MockChat::answering(
            "A hipertrofia depende de sobrecarga. Dúvidas com o instrutor no CPF 123.456.789-00.",
        );

        let result = composer
            .compose(
                &chat,
                &registry(),
                "o que causa hipertrofia muscular no treinamento?",
                vec![rich_hit("a", LONG_TEXT, 0.9)],
                None,
            )
            .await
            .unwrap();

        assert!(!result.response.answer.contains("123.456.789-00"));
        assert!(result.response.answer.contains("[DADO_PESSOAL_REMOVIDO]"));
    }
}
