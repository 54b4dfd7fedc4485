//! Section → document-name index built from a full metadata scan.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use evmanual_shared::{ChunkMetadata, CorpusStore, Result, Section};

/// Distinct document names per section.
///
/// Chunks whose section label is not in the vocabulary (including the
/// ingestion catch-all) are never indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentIndex {
    sections: BTreeMap<Section, BTreeSet<String>>,
    skipped: usize,
}

impl DocumentIndex {
    /// Build the index from chunk metadata.
    pub fn from_metadata<'a>(metadata: impl IntoIterator<Item = &'a ChunkMetadata>) -> Self {
        let mut index = Self::default();
        for meta in metadata {
            let document = meta.document.trim();
            match Section::parse(&meta.section) {
                Some(section) if !document.is_empty() => {
                    index
                        .sections
                        .entry(section)
                        .or_default()
                        .insert(document.to_string());
                }
                _ => index.skipped += 1,
            }
        }
        index
    }

    /// Scan the store and build the index.
    pub async fn build(store: &dyn CorpusStore) -> Result<Self> {
        let metadata = store.all_metadata().await?;
        let index = Self::from_metadata(&metadata);
        if index.skipped > 0 {
            warn!(
                skipped = index.skipped,
                "chunks with unknown section or empty document left out of the index"
            );
        }
        debug!(
            sections = index.sections.len(),
            chunks = metadata.len(),
            "document index built"
        );
        Ok(index)
    }

    /// Sorted candidate documents for `section`; empty when the section has no chunks.
    pub fn documents(&self, section: Section) -> Vec<String> {
        self.sections
            .get(&section)
            .map(|docs| docs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct documents in `section`.
    pub fn document_count(&self, section: Section) -> usize {
        self.sections.get(&section).map_or(0, BTreeSet::len)
    }

    /// Number of metadata rows that were not indexed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Process-wide [`DocumentIndex`] cache keyed by store revision.
#[derive(Debug, Default)]
pub struct DocumentIndexCache {
    slot: RwLock<Option<(u64, Arc<DocumentIndex>)>>,
}

impl DocumentIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The index for the store's current revision, rebuilding it when stale.
    pub async fn get(&self, store: &dyn CorpusStore) -> Result<Arc<DocumentIndex>> {
        let revision = store.revision().await?;
        if let Some(index) = self.cached(revision) {
            debug!(revision, "document index cache hit");
            return Ok(index);
        }

        let index = Arc::new(DocumentIndex::build(store).await?);
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some((revision, Arc::clone(&index)));
        }
        debug!(revision, "document index cached");
        Ok(index)
    }

    fn cached(&self, revision: u64) -> Option<Arc<DocumentIndex>> {
        let slot = self.slot.read().ok()?;
        match slot.as_ref() {
            Some((cached_revision, index)) if *cached_revision == revision => {
                Some(Arc::clone(index))
            }
            _ => None,
        }
    }
}
