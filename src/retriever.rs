//! Retrieval seam between the vector store and the answering pipeline.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::DocumentChunk;

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<DocumentChunk>, StoreError>;
}

/// Blends persisted results with chunks that live only for one request.
///
/// The output is the persisted retriever's results followed by every
/// ephemeral chunk, in the order given. Nothing is re-ranked, deduplicated,
/// or dropped.
pub struct CompositeRetriever<'a> {
    persisted: &'a dyn Retriever,
    ephemeral: Vec<DocumentChunk>,
}

impl<'a> CompositeRetriever<'a> {
    pub fn new(persisted: &'a dyn Retriever, ephemeral: Vec<DocumentChunk>) -> Self {
        Self {
            persisted,
            ephemeral,
        }
    }
}

#[async_trait]
impl Retriever for CompositeRetriever<'_> {
    async fn retrieve(&self, query: &str) -> Result<Vec<DocumentChunk>, StoreError> {
        let mut chunks = self.persisted.retrieve(query).await?;
        chunks.extend(self.ephemeral.iter().cloned());
        Ok(chunks)
    }
}
