//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use evmanual_shared::{
    AppConfig, EvManualError, LanguageModel, LlmConfig, RequestPolicy, Result, resolve_api_key,
};

use crate::retry::{api_error, transport_error, with_retry};
use crate::USER_AGENT;

/// Chat completions client implementing [`LanguageModel`].
///
/// Each prompt is sent as a single user message; no streaming.
pub struct ChatClient {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    policy: RequestPolicy,
}

impl ChatClient {
    /// Build a client for `config` authenticated with `api_key`.
    pub fn new(api_key: &str, config: &LlmConfig, policy: RequestPolicy) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(EvManualError::config("missing chat model API key"));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| EvManualError::config(format!("invalid chat API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| EvManualError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            policy,
        })
    }

    /// Build a client from the app config, reading the key from its env var.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(&config.llm.api_key_env)?;
        Self::new(&api_key, &config.llm, RequestPolicy::from(config))
    }

    async fn send_once(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("chat completions request failed", e))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EvManualError::Model(format!("unparseable chat response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| EvManualError::Model("chat response has no message content".into()))
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.chars().count()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let text = with_retry(&self.policy, "chat completion", || self.send_once(prompt)).await?;
        debug!(answer_chars = text.chars().count(), "chat completion received");
        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
