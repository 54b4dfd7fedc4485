//! HTTP clients for the model services the pipeline depends on.
//!
//! - [`ChatClient`]: OpenAI-compatible chat completions, used for section
//!   classification, document selection and answer synthesis
//! - [`EmbeddingClient`]: OpenAI or Azure OpenAI embeddings, used by the
//!   corpus store to embed queries
//!
//! Every call runs under a [`RequestPolicy`](evmanual_shared::RequestPolicy):
//! a per-attempt timeout plus bounded exponential-backoff retries for
//! transient transport errors.

mod chat;
mod embeddings;
mod retry;

pub use chat::ChatClient;
pub use embeddings::EmbeddingClient;

/// User-Agent string for model-service requests.
const USER_AGENT: &str = concat!("evmanual/", env!("CARGO_PKG_VERSION"));
