//! Content-safety analysis and sanitization.
//!
//! Screens text for personal data (CPF, phone, email, card numbers, CEP),
//! leaked credentials, and violent or sexual content. Applied twice in the
//! pipeline: once per document at ingestion, and once per generated answer —
//! the model can echo sensitive substrings from retrieved context back into
//! an answer, so the ingestion-time filter alone is not enough.
//!
//! Detection is regex-based over Brazilian formats. Each matched span is
//! replaced by a category placeholder; the original substring never survives
//! sanitization.

use once_cell::sync::Lazy;
use regex::Regex;

/// Safety category of a flagged span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardCategory {
    PersonalData,
    Credentials,
    Violence,
    Sexual,
}

impl GuardCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardCategory::PersonalData => "personal_data",
            GuardCategory::Credentials => "credentials",
            GuardCategory::Violence => "violence",
            GuardCategory::Sexual => "sexual",
        }
    }

    /// Placeholder inserted in place of redacted text.
    fn placeholder(&self) -> &'static str {
        match self {
            GuardCategory::PersonalData => "[DADO_PESSOAL_REMOVIDO]",
            GuardCategory::Credentials => "[CREDENCIAL_REMOVIDA]",
            GuardCategory::Violence => "[CONTEUDO_REMOVIDO]",
            GuardCategory::Sexual => "[CONTEUDO_REMOVIDO]",
        }
    }
}

/// Risk level of the analyzed text as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Transient verdict on a text span. Computed per validation call, never
/// stored.
#[derive(Debug, Clone)]
pub struct GuardrailResult {
    pub is_safe: bool,
    pub category: Option<GuardCategory>,
    pub confidence: f32,
    pub flagged: Vec<String>,
    pub recommendations: Vec<String>,
    pub risk_level: RiskLevel,
}

impl GuardrailResult {
    fn safe() -> Self {
        Self {
            is_safe: true,
            category: None,
            confidence: 1.0,
            flagged: Vec::new(),
            recommendations: Vec::new(),
            risk_level: RiskLevel::Low,
        }
    }
}

struct CompiledPattern {
    category: GuardCategory,
    regex: Regex,
    description: &'static str,
    risk: RiskLevel,
    confidence: f32,
}

static PATTERNS: Lazy<Vec<CompiledPattern>> = Lazy::new(|| {
    vec![
        // CPF: 123.456.789-00, separators optional, bare 11 digits included
        CompiledPattern {
            category: GuardCategory::PersonalData,
            regex: Regex::new(r"\b\d{3}\.?\d{3}\.?\d{3}-?\d{2}\b").unwrap(),
            description: "CPF",
            risk: RiskLevel::High,
            confidence: 0.95,
        },
        // Credit/debit card: 16 digits, often with spaces or dashes
        CompiledPattern {
            category: GuardCategory::PersonalData,
            regex: Regex::new(r"\b(?:\d{4}[\s\-]?){3}\d{4}\b").unwrap(),
            description: "número de cartão",
            risk: RiskLevel::Critical,
            confidence: 0.9,
        },
        // Brazilian phone: optional +55, DDD, 8-9 digits
        CompiledPattern {
            category: GuardCategory::PersonalData,
            regex: Regex::new(r"(?:\+55\s?)?\(?\d{2}\)?\s?9?\d{4}-\d{4}\b").unwrap(),
            description: "telefone",
            risk: RiskLevel::Medium,
            confidence: 0.85,
        },
        // Email
        CompiledPattern {
            category: GuardCategory::PersonalData,
            regex: Regex::new(r"\b[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}\b").unwrap(),
            description: "email",
            risk: RiskLevel::Medium,
            confidence: 0.95,
        },
        // CEP (postal code as address marker)
        CompiledPattern {
            category: GuardCategory::PersonalData,
            regex: Regex::new(r"\b\d{5}-\d{3}\b").unwrap(),
            description: "CEP",
            risk: RiskLevel::Medium,
            confidence: 0.8,
        },
        // Credential assignments: senha=..., api_key: ...
        CompiledPattern {
            category: GuardCategory::Credentials,
            regex: Regex::new(r"(?i)\b(senha|password|api[_\-]?key|token|secret)\s*[:=]\s*\S+")
                .unwrap(),
            description: "credencial",
            risk: RiskLevel::Critical,
            confidence: 0.9,
        },
    ]
});

/// Keyword banks for non-PII categories. Word-boundary matched, lowercase.
static VIOLENCE_TERMS: &[&str] = &["agressão física", "espancar", "mutilação", "tortura"];
static SEXUAL_TERMS: &[&str] = &["conteúdo sexual explícito", "pornografia"];

/// Quick boolean check used by the ingestion gate.
pub fn is_content_safe(text: &str) -> bool {
    analyze_content(text).is_safe
}

/// Full analysis: flag spans, pick the dominant category, and aggregate a
/// risk level for the whole text.
pub fn analyze_content(text: &str) -> GuardrailResult {
    let mut flagged: Vec<String> = Vec::new();
    let mut category: Option<GuardCategory> = None;
    let mut risk = RiskLevel::Low;
    let mut confidence = 0.0f32;

    for pattern in PATTERNS.iter() {
        for m in pattern.regex.find_iter(text) {
            flagged.push(format!("{}: {}", pattern.description, m.as_str()));
            if pattern.risk >= risk {
                risk = pattern.risk;
                category = Some(pattern.category);
            }
            confidence = confidence.max(pattern.confidence);
        }
    }

    let lower = text.to_lowercase();
    for (terms, cat) in [
        (VIOLENCE_TERMS, GuardCategory::Violence),
        (SEXUAL_TERMS, GuardCategory::Sexual),
    ] {
        for term in terms {
            if lower.contains(term) {
                flagged.push(format!("{}: {}", cat.as_str(), term));
                if RiskLevel::Medium >= risk {
                    risk = RiskLevel::Medium;
                    category = Some(cat);
                }
                confidence = confidence.max(0.7);
            }
        }
    }

    if flagged.is_empty() {
        return GuardrailResult::safe();
    }

    // Several distinct personal-data hits in one text escalate the risk.
    if flagged.len() >= 3 && risk < RiskLevel::Critical {
        risk = RiskLevel::High;
    }

    let mut recommendations = vec!["Remover dados sensíveis antes de publicar.".to_string()];
    if risk >= RiskLevel::High {
        recommendations.push("Revisar o material de origem com a equipe responsável.".to_string());
    }

    GuardrailResult {
        is_safe: false,
        category,
        confidence,
        flagged,
        recommendations,
        risk_level: risk,
    }
}

/// Redact every flagged span. The returned text contains none of the
/// original matched substrings.
pub fn sanitize_content(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in PATTERNS.iter() {
        out = pattern
            .regex
            .replace_all(&out, pattern.category.placeholder())
            .into_owned();
    }
    out
}

/// Analyze, sanitize if needed, and append a visible warning banner.
/// `context` names where the text came from ("material", "resposta").
pub fn validate_and_sanitize_content(text: &str, context: &str) -> (String, GuardrailResult) {
    let result = analyze_content(text);
    if result.is_safe {
        return (text.to_string(), result);
    }

    let mut sanitized = sanitize_content(text);

    let categories: Vec<&str> = {
        let mut cs: Vec<&str> = result.category.iter().map(|c| c.as_str()).collect();
        cs.dedup();
        cs
    };

    sanitized.push_str(&format!(
        "\n\n⚠️ Aviso de segurança ({}): conteúdo sensível foi removido \
         automaticamente. Categorias: {}. Nível de risco: {}.",
        context,
        if categories.is_empty() {
            "conteúdo sensível".to_string()
        } else {
            categories.join(", ")
        },
        result.risk_level.as_str()
    ));

    (sanitized, result)
}
