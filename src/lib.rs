//! Personal knowledge-base assistant.
//!
//! Documents (PDF, DOCX, plain text) are split into overlapping chunks,
//! embedded through an OpenAI-compatible service and kept in a local SQLite
//! vector store. Questions are answered by recalling the nearest chunks,
//! optionally reranking them, and streaming a cited answer from a chat model.

pub mod assistant;
pub mod chat_sessions;
pub mod config;
pub mod llm;
pub mod rag;
pub mod web_search;
