//! # docqa
//!
//! Document-grounded question answering over a shared corpus of office
//! documents.
//!
//! docqa walks a document tree, extracts text from PDFs, Word and PowerPoint
//! files, images, CSVs and spreadsheets, splits it into overlapping chunks,
//! embeds them, and keeps them in a durable SQLite vector index. Questions
//! are answered by retrieving the closest chunks (plus any files attached to
//! the request) and passing them to a chat model with the conversation.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌─────────────┐
//! │  uploads/ │──▶│ Extract+Chunk │──▶│ StoreAccess │──▶ index.sqlite
//! └───────────┘   └──────────────┘   └──────┬──────┘
//!        manifest (mtime per file) ◀────────┘
//!
//! question ─▶ contextualize ─▶ CompositeRetriever ─▶ ChatModel ─▶ answer
//!                               (store top-k + attachments)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa ingest ./uploads
//! docqa ask "What is the refund window?" --attach ./notes.txt
//! docqa store
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and `DOCQA_*` overrides |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | Per-format text extraction |
//! | [`chunk`] | Fixed-window chunking |
//! | [`manifest`] | Processed-file manifest |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`llm`] | Chat-completion provider |
//! | [`store`] | SQLite vector index |
//! | [`store_access`] | Fallback open chain and batched inserts |
//! | [`ingest`] | Incremental ingestion |
//! | [`retriever`] | Persisted + ephemeral retrieval |
//! | [`answer`] | Conversational answering |
//! | [`attachments`] | Request-scoped uploads |

pub mod answer;
pub mod attachments;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod manifest;
pub mod models;
mod openai;
pub mod retriever;
pub mod store;
pub mod store_access;
