//! Overlapping text chunker with natural-boundary splitting.
//!
//! Splits document body text into chunks of at most `chunk_size` characters,
//! each sharing `chunk_overlap` characters with its predecessor. Break points
//! prefer natural boundaries in priority order: paragraph, line, sentence,
//! space, and finally a hard character split.
//!
//! Each chunk receives a stable id derived from its source path, page, and
//! index, plus a SHA-256 hash of its text for staleness detection.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, DocMeta, Document};

/// Approximate chars-per-token ratio used when no tokenizer is available.
pub const CHARS_PER_TOKEN: usize = 4;

/// Separator priority for break-point selection.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Conservative token estimate for embedding-request budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / CHARS_PER_TOKEN + 1
}

/// Compute chunk byte spans over `text`. Every span starts on a char
/// boundary, the first span starts at 0, the last ends at `text.len()`, and
/// consecutive spans overlap by roughly `overlap` bytes — no character is
/// dropped.
pub fn split_spans(text: &str, chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let len = text.len();
    if len == 0 {
        return Vec::new();
    }
    if chunk_size == 0 || len <= chunk_size {
        return vec![(0, len)];
    }

    let mut spans = Vec::new();
    let mut start = 0usize;

    loop {
        let mut end = floor_char_boundary(text, (start + chunk_size).min(len));

        if end < len {
            // Prefer breaking on a natural boundary inside the back half of
            // the window, in separator priority order.
            let window = &text[start..end];
            let min_break = chunk_size / 2;
            for sep in SEPARATORS {
                if let Some(pos) = window.rfind(sep) {
                    if pos >= min_break {
                        end = start + pos + sep.len();
                        break;
                    }
                }
            }
        }

        spans.push((start, end));

        if end >= len {
            break;
        }

        let mut next = floor_char_boundary(text, end.saturating_sub(overlap));
        if next <= start {
            // Overlap would stall the walk; advance past the current chunk.
            next = end;
        }
        start = next;
    }

    spans
}

/// Split a document's body into chunks inheriting its metadata.
pub fn chunk_document(doc: &Document, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let spans = split_spans(&doc.body, chunk_size, overlap);

    if spans.is_empty() {
        return vec![make_chunk(&doc.meta, 0, doc.body.trim())];
    }

    spans
        .iter()
        .enumerate()
        .map(|(i, &(s, e))| make_chunk(&doc.meta, i as i64, &doc.body[s..e]))
        .collect()
}

/// Group chunks into embedding-request batches. A batch is flushed when
/// appending the next chunk would exceed the token budget, or when it reaches
/// the chunk-count cap — whichever triggers first. Token estimates are
/// approximate; embedding APIs reject oversized requests by token count, so
/// the budget errs conservative.
pub fn batch_chunks(chunks: Vec<Chunk>, token_budget: usize, chunk_cap: usize) -> Vec<Vec<Chunk>> {
    let mut batches = Vec::new();
    let mut current: Vec<Chunk> = Vec::new();
    let mut current_tokens = 0usize;

    for chunk in chunks {
        let tokens = estimate_tokens(&chunk.text);

        if !current.is_empty() && (current_tokens + tokens > token_budget || current.len() >= chunk_cap)
        {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }

        current_tokens += tokens;
        current.push(chunk);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

/// Stable chunk id: SHA-256 over source path, page, and position. The page
/// keeps ids distinct when one PDF yields a document per page.
pub fn chunk_id(source_path: &str, page: Option<u32>, index: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(b":");
    hasher.update(page.unwrap_or(0).to_le_bytes());
    hasher.update(b":");
    hasher.update(index.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(meta: &DocMeta, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(&meta.source_path, meta.page, index),
        chunk_index: index,
        text: text.to_string(),
        hash,
        meta: meta.clone(),
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
