//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Each stage returns its own error type so callers can apply the
//! continue-on-failure policy explicitly. Extraction errors skip a file and
//! token-budget errors shrink a batch. Store-open errors walk the fallback
//! chain. An ingestion run aborts only on [`IngestError`].

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn one file into text units. The file is skipped and retried
/// on the next run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("spreadsheet extraction failed: {0}")]
    Spreadsheet(String),
    #[error("OCR failed: {0}")]
    Ocr(String),
    #[error("SVG extraction failed: {0}")]
    Svg(String),
}

/// Failure reported by an embedding provider.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The request carried more tokens than the provider accepts in one call.
    /// Recovered locally by shrinking the batch.
    #[error("embedding request exceeds the provider token budget: {0}")]
    TokenBudget(String),
    #[error("embedding provider error: {0}")]
    Provider(String),
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("embedding provider misconfigured: {0}")]
    Config(String),
}

/// Failure to open, query, or populate the vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open vector store at {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("vector store query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("cache copy from {from} failed after {attempts} attempts: {source}")]
    CopyExhausted {
        from: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

/// Failure that aborts an ingestion run. Per-file problems never surface
/// here; they are logged and counted in the run report.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ingestion root does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("failed to persist manifest: {0}")]
    Manifest(std::io::Error),
}

/// Failure of a chat-completion call.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat model error: {0}")]
    Provider(String),
    #[error("chat model misconfigured: {0}")]
    Config(String),
}

/// Request-level failure of the answering pipeline.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ChatError),
}
