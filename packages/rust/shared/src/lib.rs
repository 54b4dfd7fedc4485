//! Shared types, error model, and configuration for the EV manual assistant.
//!
//! This crate is the foundation depended on by all other crates.
//! It provides:
//! - [`EvManualError`]: the unified error type
//! - Domain types ([`Chunk`], [`ImageRef`], [`AnswerResult`]) and the [`Section`] vocabulary
//! - Collaborator interfaces ([`LanguageModel`], [`Embedder`], [`CorpusStore`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod section;
pub mod services;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CorpusConfig, EmbeddingConfig, EmbeddingProvider, LlmConfig, PipelineConfig,
    RequestPolicy, RequestsConfig, RetrievalConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_api_key, validate_api_key,
};
pub use error::{EvManualError, GenerationFailure, Result, Stage};
pub use section::{CATCH_ALL_LABEL, SECTION_VOCABULARY_VERSION, Section, normalize_label};
pub use services::{CorpusStore, Embedder, LanguageModel};
pub use types::{AnswerResult, Chunk, ChunkMetadata, ImageRef, MetadataFilter};
