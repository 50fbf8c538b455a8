#![deny(missing_docs)]

//! Core library for the PDF question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Hosted chat-completion client.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Upload and query counters.
pub mod metrics;
/// PDF page extraction.
pub mod pdf;
/// Retrieval-augmented generation pipeline.
pub mod rag;
/// Bounded retries for hosted services.
pub mod retry;
