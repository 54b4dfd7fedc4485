//! Application configuration for the EV manual assistant.
//!
//! User config lives at `~/.evmanual/evmanual.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EvManualError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "evmanual.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".evmanual";

// ---------------------------------------------------------------------------
// Config structs (matching evmanual.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Corpus store location.
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Chat model used for routing and answering.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding model used for similarity search.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval knobs.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Timeout and retry policy for external calls.
    #[serde(default)]
    pub requests: RequestsConfig,
}

/// `[corpus]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Path to the libSQL index file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Base directory that source and image paths are resolved against.
    #[serde(default = "default_assets_root")]
    pub assets_root: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            assets_root: default_assets_root(),
        }
    }
}

fn default_db_path() -> String {
    "data/index/ev6.db".into()
}
fn default_assets_root() -> String {
    ".".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Chat model identifier.
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum completion tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key_env: default_openai_key_env(),
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_chat_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}

/// Which embeddings API flavour to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// `POST {base_url}/embeddings` with a bearer token.
    #[default]
    Openai,
    /// `POST {base_url}/openai/deployments/{deployment}/embeddings?api-version=..` with `api-key`.
    Azure,
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// API flavour.
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// API base URL (Azure: the resource endpoint).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Azure deployment name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,

    /// Azure API version.
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,

    /// Optional output dimensionality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            base_url: default_openai_base_url(),
            api_key_env: default_openai_key_env(),
            model: default_embedding_model(),
            deployment: None,
            api_version: default_azure_api_version(),
            dimensions: None,
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_azure_api_version() -> String {
    "2024-02-01".into()
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum chunks retrieved per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Context cap in characters before synthesis (0 disables).
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Cache the section → documents index between requests.
    #[serde(default = "default_true")]
    pub cache_document_index: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
            cache_document_index: true,
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_max_context_chars() -> usize {
    24_000
}
fn default_true() -> bool {
    true
}

/// `[requests]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsConfig {
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt, for transient failures only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential backoff.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    500
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum chunks retrieved per query.
    pub top_k: usize,
    /// Context cap in characters; `None` means unbounded.
    pub max_context_chars: Option<usize>,
    /// Cache the section → documents index keyed by store revision.
    pub cache_document_index: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let cap = config.retrieval.max_context_chars;
        Self {
            top_k: config.retrieval.top_k,
            max_context_chars: (cap > 0).then_some(cap),
            cache_document_index: config.retrieval.cache_document_index,
        }
    }
}

/// Runtime timeout/retry policy for one external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff delay; doubles per retry.
    pub backoff: Duration,
}

impl RequestPolicy {
    /// Delay before retry number `attempt` (1-based), capped at 32x the base.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(5);
        self.backoff.saturating_mul(1 << exponent)
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RequestPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.requests.timeout_secs),
            max_retries: config.requests.max_retries,
            backoff: Duration::from_millis(config.requests.retry_backoff_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.evmanual/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EvManualError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.evmanual/evmanual.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EvManualError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| EvManualError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EvManualError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EvManualError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EvManualError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key from the env var named `var_name`.
pub fn resolve_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(EvManualError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the chat and embedding API key env vars are set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(&config.llm.api_key_env)?;
    resolve_api_key(&config.embedding.api_key_env)?;
    Ok(())
}
