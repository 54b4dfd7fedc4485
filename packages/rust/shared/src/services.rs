//! Interfaces of the external collaborators the pipeline talks to.
//!
//! Concrete clients live in `evmanual-llm` and `evmanual-storage`; tests
//! swap in deterministic fakes. All implementations must be safe for
//! concurrent use by in-flight requests.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, ChunkMetadata, MetadataFilter};

/// A text-completion model: one prompt in, one completion out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a single completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model identifier, for logs.
    fn model_id(&self) -> &str;
}

/// A text-embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Similarity-search index over manual chunks.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Up to `k` chunks most similar to `query`, best first, restricted by `filter`.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Chunk>>;

    /// Metadata of every stored chunk (full scan).
    async fn all_metadata(&self) -> Result<Vec<ChunkMetadata>>;

    /// Counter that changes whenever the stored chunks change.
    async fn revision(&self) -> Result<u64>;
}
