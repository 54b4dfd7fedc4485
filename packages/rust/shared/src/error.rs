//! Error types for the EV manual assistant.
//!
//! Library crates use [`EvManualError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// Top-level error type for all assistant operations.
#[derive(Debug, thiserror::Error)]
pub enum EvManualError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to a model service (connect, body, reset).
    #[error("network error: {0}")]
    Network(String),

    /// A model service answered with a non-success HTTP status.
    #[error("model service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// An external call did not finish within its configured timeout.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    /// A model service answered, but the payload was unusable.
    #[error("model response error: {0}")]
    Model(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A model call failed while answering a query.
    #[error(transparent)]
    Generation(Box<GenerationFailure>),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (empty query, bad vector blob, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Parsing error for persisted or external data.
    #[error("parse error: {message}")]
    Parse { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EvManualError>;

/// Pipeline stage that issued a failing model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Section classification (first routing call).
    Section,
    /// Document selection (second routing call).
    Document,
    /// Query embedding inside the filtered retriever.
    Retrieval,
    /// Grounded answer synthesis.
    Answer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Section => "section classification",
            Self::Document => "document selection",
            Self::Retrieval => "retrieval",
            Self::Answer => "answer synthesis",
        };
        f.write_str(name)
    }
}

/// Hard failure of one query: a model call failed and no answer was produced.
///
/// Routing decisions made before the failure are kept so callers can surface them.
#[derive(Debug, thiserror::Error)]
#[error("generation failed during {stage}: {source}")]
pub struct GenerationFailure {
    /// Stage whose model call failed.
    pub stage: Stage,
    /// Section chosen before the failure, if any.
    pub section: Option<String>,
    /// Document chosen before the failure, if any.
    pub document: Option<String>,
    /// Underlying transport/API error.
    #[source]
    pub source: Box<EvManualError>,
}

impl EvManualError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a model-call error into a [`GenerationFailure`] for `stage`.
    pub fn generation(
        stage: Stage,
        section: Option<&str>,
        document: Option<&str>,
        source: EvManualError,
    ) -> Self {
        Self::Generation(Box::new(GenerationFailure {
            stage,
            section: section.map(str::to_owned),
            document: document.map(str::to_owned),
            source: Box::new(source),
        }))
    }

    /// Whether a retry may succeed (transport hiccup, rate limit, server error).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether this error came from talking to a model service.
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Api { .. } | Self::Timeout { .. } | Self::Model(_)
        )
    }

    /// The generation failure payload, if this is one.
    pub fn as_generation(&self) -> Option<&GenerationFailure> {
        match self {
            Self::Generation(failure) => Some(failure),
            _ => None,
        }
    }
}
