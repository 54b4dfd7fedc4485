//! Embeddings client for OpenAI-compatible and Azure OpenAI endpoints.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use evmanual_shared::{
    AppConfig, Embedder, EmbeddingConfig, EmbeddingProvider, EvManualError, RequestPolicy,
    Result, resolve_api_key,
};

use crate::USER_AGENT;
use crate::retry::{api_error, transport_error, with_retry};

/// Embeddings client implementing [`Embedder`].
pub struct EmbeddingClient {
    client: Client,
    endpoint: String,
    /// Sent in the body for OpenAI; Azure routes by deployment instead.
    model: Option<String>,
    dimensions: Option<usize>,
    policy: RequestPolicy,
}

impl EmbeddingClient {
    /// Build a client for `config` authenticated with `api_key`.
    pub fn new(api_key: &str, config: &EmbeddingConfig, policy: RequestPolicy) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(EvManualError::config("missing embedding API key"));
        }
        let base = config.base_url.trim_end_matches('/');
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let (endpoint, model) = match config.provider {
            EmbeddingProvider::Openai => {
                let auth = format!("Bearer {}", api_key.trim());
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&auth).map_err(|e| {
                        EvManualError::config(format!("invalid embedding API key: {e}"))
                    })?,
                );
                (format!("{base}/embeddings"), Some(config.model.clone()))
            }
            EmbeddingProvider::Azure => {
                let deployment = config.deployment.as_deref().ok_or_else(|| {
                    EvManualError::config("embedding.deployment is required for the azure provider")
                })?;
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(api_key.trim()).map_err(|e| {
                        EvManualError::config(format!("invalid embedding API key: {e}"))
                    })?,
                );
                (
                    format!(
                        "{base}/openai/deployments/{deployment}/embeddings?api-version={}",
                        config.api_version
                    ),
                    None,
                )
            }
        };

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| EvManualError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model,
            dimensions: config.dimensions,
            policy,
        })
    }

    /// Build a client from the app config, reading the key from its env var.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(&config.embedding.api_key_env)?;
        Self::new(&api_key, &config.embedding, RequestPolicy::from(config))
    }

    async fn send_once(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: self.model.as_deref(),
            input: [text],
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("embeddings request failed", e))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EvManualError::Model(format!("unparseable embeddings response: {e}")))?;

        let embedding = parsed
            .data
            .into_iter()
            .min_by_key(|entry| entry.index)
            .map(|entry| entry.embedding)
            .ok_or_else(|| EvManualError::Model("embeddings response has no data".into()))?;

        if embedding.is_empty() {
            return Err(EvManualError::Model("embedding vector is empty".into()));
        }
        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    #[instrument(skip_all, fields(text_chars = text.chars().count()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = with_retry(&self.policy, "embedding", || self.send_once(text)).await?;
        debug!(dims = vector.len(), "embedding received");
        Ok(vector)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
