//! Força RAG — retrieval-augmented answering over the DNA da Força course
//! materials.
//!
//! The pipeline ingests PDFs and spreadsheets from a materials directory,
//! enriches them with the course-catalog spreadsheet, splits them into
//! overlapping chunks, embeds them through the first available provider in
//! a four-provider fallback chain, and stores everything in a SQLite-backed
//! vector store. Questions are alias-expanded, retrieved by similarity or
//! MMR, re-ranked by educational value, gated for sufficiency, and answered
//! strictly from the retrieved context, with citations and PII redaction.

pub mod catalog;
pub mod chunk;
pub mod compose;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod guardrails;
pub mod handler;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod providers;
pub mod retrieve;
pub mod store;
