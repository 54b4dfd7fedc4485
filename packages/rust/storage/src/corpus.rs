//! [`CorpusStore`] backed by the libSQL chunk table.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use evmanual_shared::{Chunk, ChunkMetadata, CorpusStore, Embedder, MetadataFilter, Result};
use tracing::{debug, instrument};

use crate::Storage;
use crate::codec::cosine_similarity;

/// Similarity search over stored chunks using a query embedder.
///
/// Candidates are filtered in SQL, scored by cosine similarity against the
/// query embedding and ranked best first. Equal scores keep native order.
pub struct LibsqlCorpus {
    storage: Storage,
    embedder: Arc<dyn Embedder>,
}

impl LibsqlCorpus {
    pub fn new(storage: Storage, embedder: Arc<dyn Embedder>) -> Self {
        Self { storage, embedder }
    }
}

#[async_trait]
impl CorpusStore for LibsqlCorpus {
    #[instrument(skip_all, fields(k = k, filtered = filter.is_some()))]
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Chunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.storage.load_chunks(filter).await?;
        if candidates.is_empty() {
            debug!("no candidate chunks");
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;

        let mut scored: Vec<(f32, Chunk)> = candidates
            .into_iter()
            .map(|stored| (cosine_similarity(&query_vector, &stored.embedding), stored.chunk))
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        debug!(returned = scored.len(), "similarity search complete");
        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }

    async fn all_metadata(&self) -> Result<Vec<ChunkMetadata>> {
        self.storage.all_metadata().await
    }

    async fn revision(&self) -> Result<u64> {
        self.storage.revision().await
    }
}
