//! Document-filtered chunk retrieval.

use tracing::{debug, info, instrument, warn};

use evmanual_shared::{Chunk, CorpusStore, MetadataFilter, Result};

/// Marker joining the query and the document name in the search text.
pub const DOCUMENT_MARKER: &str = "관련 문서:";

/// Search text biased toward the selected document.
pub fn augmented_query(query: &str, document: &str) -> String {
    format!("{query} {DOCUMENT_MARKER} {document}")
}

/// Up to `k` chunks of `document` most similar to `query`, best first.
///
/// An empty result is a normal outcome. Chunks the store returns for any
/// other document, or with a section label outside the vocabulary, are dropped.
#[instrument(skip_all, fields(document = %document, k = k))]
pub async fn retrieve(
    store: &dyn CorpusStore,
    query: &str,
    document: &str,
    k: usize,
) -> Result<Vec<Chunk>> {
    if k == 0 || document.trim().is_empty() {
        debug!("nothing to retrieve");
        return Ok(Vec::new());
    }

    let filter = MetadataFilter::document(document);
    let search_text = augmented_query(query, document);
    let found = store.similarity_search(&search_text, k, Some(&filter)).await?;

    let returned = found.len();
    let in_document: Vec<Chunk> = found.into_iter().filter(|c| filter.matches(c)).collect();
    if in_document.len() < returned {
        warn!(
            dropped = returned - in_document.len(),
            "store returned chunks outside the document filter"
        );
    }

    let matched = in_document.len();
    let mut chunks: Vec<Chunk> = in_document
        .into_iter()
        .filter(|c| c.section_label().is_some())
        .collect();
    if chunks.len() < matched {
        warn!(
            dropped = matched - chunks.len(),
            "store returned chunks with an unrecognized section"
        );
    }
    chunks.truncate(k);

    info!(chunks = chunks.len(), "retrieved");
    Ok(chunks)
}
