//! Core domain types for manual retrieval and answering.

use serde::{Deserialize, Serialize};

use crate::section::Section;

// ---------------------------------------------------------------------------
// ImageRef
// ---------------------------------------------------------------------------

/// A diagram image extracted from the same document as a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Path to the image file, relative to the assets root.
    pub path: String,
    /// File name of the image (e.g. `drive_axle_page3_img0.png`).
    pub name: String,
}

impl ImageRef {
    /// Build an image reference from a path and a name.
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// One retrievable unit of manual text plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Store-assigned identifier.
    pub id: String,
    /// Cleaned passage content.
    pub text: String,
    /// Section label as stored (normalised by ingestion, not guaranteed valid).
    pub section: String,
    /// Human-readable document name.
    pub document: String,
    /// Original document path, used for provenance only.
    pub source: String,
    /// Images belonging to the same document, in extraction order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_refs: Vec<ImageRef>,
}

impl Chunk {
    /// The section of this chunk, if its label belongs to the vocabulary.
    pub fn section_label(&self) -> Option<Section> {
        Section::parse(&self.section)
    }
}

/// The metadata fields of a stored chunk (no text, no vector).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Section label as stored.
    pub section: String,
    /// Document name.
    pub document: String,
    /// Original document path.
    pub source: String,
}

// ---------------------------------------------------------------------------
// Metadata filter
// ---------------------------------------------------------------------------

/// Exact-match equality filter on the `document` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub document: String,
}

impl MetadataFilter {
    /// Filter on `document == value`.
    pub fn document(value: impl Into<String>) -> Self {
        Self {
            document: value.into(),
        }
    }

    /// Whether `chunk` passes this filter.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        chunk.document == self.document
    }
}

// ---------------------------------------------------------------------------
// AnswerResult
// ---------------------------------------------------------------------------

/// Final output of one pipeline invocation. Created fresh per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    /// Synthesized answer with the role marker stripped.
    pub answer: String,
    /// Whether the answer is the designated refusal.
    pub refused: bool,
    /// Section decision (raw value when it did not match the vocabulary).
    pub section: String,
    /// Document decision (raw value when it did not match any candidate).
    pub document: String,
    /// Chunks the answer was grounded on, in retrieval order.
    pub source_documents: Vec<Chunk>,
    /// Image paths, parallel to `image_names`.
    pub image_paths: Vec<String>,
    /// Image names, parallel to `image_paths`.
    pub image_names: Vec<String>,
}

impl AnswerResult {
    /// Iterate over `(path, name)` image pairs.
    pub fn images(&self) -> impl Iterator<Item = (&str, &str)> {
        self.image_paths
            .iter()
            .zip(self.image_names.iter())
            .map(|(path, name)| (path.as_str(), name.as_str()))
    }
}
