//! Deterministic fakes for pipeline tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;

use evmanual_shared::{
    Chunk, ChunkMetadata, CorpusStore, EvManualError, ImageRef, LanguageModel, MetadataFilter,
    Result,
};

use crate::router::Router;

pub(crate) fn chunk(section: &str, document: &str, text: &str, images: &[(&str, &str)]) -> Chunk {
    Chunk {
        id: format!("{document}:{text}"),
        text: text.into(),
        section: section.into(),
        document: document.into(),
        source: format!("data/pdfs/ev6 정비 지침서/{section}/{document}.pdf"),
        image_refs: images.iter().map(|(p, n)| ImageRef::new(*p, *n)).collect(),
    }
}

// ---------------------------------------------------------------------------
// MemoryCorpus
// ---------------------------------------------------------------------------

/// In-memory store returning filtered chunks in insertion order.
pub(crate) struct MemoryCorpus {
    chunks: Mutex<Vec<Chunk>>,
    revision: AtomicU64,
    metadata_scans: AtomicUsize,
    queries: Mutex<Vec<String>>,
    ignore_filter: bool,
    search_error: Option<fn() -> EvManualError>,
}

impl MemoryCorpus {
    pub(crate) fn new(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks: Mutex::new(chunks),
            revision: AtomicU64::new(1),
            metadata_scans: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            ignore_filter: false,
            search_error: None,
        }
    }

    /// A store that returns matches regardless of the filter.
    pub(crate) fn ignoring_filter(chunks: Vec<Chunk>) -> Self {
        Self {
            ignore_filter: true,
            ..Self::new(chunks)
        }
    }

    /// A store whose similarity search always fails with `error()`.
    pub(crate) fn failing_search(chunks: Vec<Chunk>, error: fn() -> EvManualError) -> Self {
        Self {
            search_error: Some(error),
            ..Self::new(chunks)
        }
    }

    pub(crate) fn push(&self, chunk: Chunk) {
        self.chunks.lock().unwrap().push(chunk);
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn metadata_scans(&self) -> usize {
        self.metadata_scans.load(Ordering::SeqCst)
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CorpusStore for MemoryCorpus {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Chunk>> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(error) = self.search_error {
            return Err(error());
        }
        let chunks = self.chunks.lock().unwrap();
        Ok(chunks
            .iter()
            .filter(|c| self.ignore_filter || filter.is_none_or(|f| f.matches(c)))
            .take(k)
            .cloned()
            .collect())
    }

    async fn all_metadata(&self) -> Result<Vec<ChunkMetadata>> {
        self.metadata_scans.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .map(|c| ChunkMetadata {
                section: c.section.clone(),
                document: c.document.clone(),
                source: c.source.clone(),
            })
            .collect())
    }

    async fn revision(&self) -> Result<u64> {
        Ok(self.revision.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

/// Language model replaying a fixed list of responses and recording prompts.
pub(crate) struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub(crate) fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EvManualError::Model("script exhausted".into())))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// FixedRouter
// ---------------------------------------------------------------------------

/// Router returning preset decisions and recording the candidates it saw.
pub(crate) struct FixedRouter {
    section: Result<String>,
    document: Result<String>,
    seen_candidates: Mutex<Vec<Vec<String>>>,
}

impl FixedRouter {
    pub(crate) fn new(section: &str, document: &str) -> Self {
        Self {
            section: Ok(section.into()),
            document: Ok(document.into()),
            seen_candidates: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_section(error: EvManualError) -> Self {
        Self {
            section: Err(error),
            document: Ok(String::new()),
            seen_candidates: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_document(section: &str, error: EvManualError) -> Self {
        Self {
            section: Ok(section.into()),
            document: Err(error),
            seen_candidates: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn seen_candidates(&self) -> Vec<Vec<String>> {
        self.seen_candidates.lock().unwrap().clone()
    }
}

fn replay(result: &Result<String>) -> Result<String> {
    match result {
        Ok(value) => Ok(value.clone()),
        Err(err) => Err(EvManualError::Network(err.to_string())),
    }
}

#[async_trait]
impl Router for FixedRouter {
    async fn classify_section(&self, _query: &str) -> Result<String> {
        replay(&self.section)
    }

    async fn select_document(
        &self,
        _query: &str,
        _section: &str,
        candidates: &[String],
    ) -> Result<String> {
        self.seen_candidates.lock().unwrap().push(candidates.to_vec());
        replay(&self.document)
    }
}
