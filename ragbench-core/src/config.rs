//! Configuration system for Ragbench.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/ragbench/config.toml` and/or `.ragbench/config.toml`
//! in the workspace directory.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chat model selection.
    #[serde(default)]
    pub llm: LlmSettings,
    /// Embedding backend selection.
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    /// Recursive text splitter parameters.
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Retrieval parameters.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Experiment tracking storage.
    #[serde(default)]
    pub tracking: TrackingConfig,
}

impl RagConfig {
    /// Validate cross-field constraints. Called by [`load_config`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        if self.retrieval.k == 0 {
            return Err(ConfigError::invalid("retrieval.k must be positive"));
        }
        if self.tracking.experiment_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "tracking.experiment_name must not be empty",
            ));
        }
        Ok(())
    }
}

/// Supported chat model providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider selection.
    #[serde(default)]
    pub provider: LlmProviderKind,
    /// OpenAI model name.
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Environment variable holding the OpenAI API key.
    #[serde(default = "default_openai_key_env")]
    pub openai_api_key_env: String,
    /// Anthropic model name.
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    /// Environment variable holding the Anthropic API key.
    #[serde(default = "default_anthropic_key_env")]
    pub anthropic_api_key_env: String,
    /// Ollama model name.
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    /// Ollama server URL.
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
    /// Optional OpenAI-compatible base URL override.
    #[serde(default)]
    pub openai_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,
    /// Maximum tokens in a generated answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            openai_model: default_openai_model(),
            openai_api_key_env: default_openai_key_env(),
            anthropic_model: default_anthropic_model(),
            anthropic_api_key_env: default_anthropic_key_env(),
            ollama_model: default_ollama_model(),
            ollama_base_url: default_ollama_base_url(),
            openai_base_url: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmSettings {
    /// The model name for the selected provider.
    pub fn model(&self) -> &str {
        match self.provider {
            LlmProviderKind::OpenAi => &self.openai_model,
            LlmProviderKind::Anthropic => &self.anthropic_model,
            LlmProviderKind::Ollama => &self.ollama_model,
        }
    }

    /// The credential variable the selected provider requires, if any.
    pub fn api_key_env(&self) -> Option<&str> {
        match self.provider {
            LlmProviderKind::OpenAi => Some(&self.openai_api_key_env),
            LlmProviderKind::Anthropic => Some(&self.anthropic_api_key_env),
            LlmProviderKind::Ollama => None,
        }
    }

    /// Resolve the API key from the environment.
    ///
    /// Returns `Ok(None)` for providers that need no credential and
    /// `ConfigError::EnvVarMissing` when a required key is absent or empty.
    pub fn resolve_api_key(&self) -> Result<Option<String>, ConfigError> {
        let Some(var) = self.api_key_env() else {
            return Ok(None);
        };
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
            _ => Err(ConfigError::EnvVarMissing {
                var: var.to_string(),
            }),
        }
    }
}

fn default_openai_model() -> String {
    "gpt-4o-mini".into()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}

fn default_ollama_model() -> String {
    "llama3.2".into()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_max_tokens() -> usize {
    1024
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Local,
    OpenAi,
    Ollama,
}

/// Embedding backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// Provider-specific model name.
    #[serde(default)]
    pub model: Option<String>,
    /// Dimensions for the local embedder (remote providers report their own).
    #[serde(default = "default_local_dimensions")]
    pub dimensions: usize,
    /// Environment variable holding the OpenAI API key.
    #[serde(default = "default_openai_key_env")]
    pub openai_api_key_env: String,
    /// Ollama server URL.
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: None,
            dimensions: default_local_dimensions(),
            openai_api_key_env: default_openai_key_env(),
            ollama_base_url: default_ollama_base_url(),
        }
    }
}

fn default_local_dimensions() -> usize {
    256
}

/// Configuration for recursive text chunking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters carried over between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Separators tried in priority order; `""` splits into characters.
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
        }
    }
}

impl ChunkingConfig {
    /// Build a validated config with the default separators.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
            separators: default_separators(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        if !separators.is_empty() {
            self.separators = separators;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("chunk_size must be positive"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::invalid(
                "chunk_overlap must be less than chunk_size",
            ));
        }
        Ok(())
    }
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_separators() -> Vec<String> {
    vec![
        "\n\n".into(),
        "\n".into(),
        ". ".into(),
        " ".into(),
        String::new(),
    ]
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of documents to retrieve per query.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Vector store collection name.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// SQLite database path; in-memory when unset.
    #[serde(default)]
    pub persist_path: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            collection: default_collection(),
            persist_path: None,
        }
    }
}

fn default_k() -> usize {
    4
}

fn default_collection() -> String {
    "documents".into()
}

/// Experiment tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Root directory of the file tracking backend.
    #[serde(default = "default_tracking_root")]
    pub root: PathBuf,
    /// Default experiment name.
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            root: default_tracking_root(),
            experiment_name: default_experiment_name(),
        }
    }
}

fn default_tracking_root() -> PathBuf {
    PathBuf::from("mlruns")
}

fn default_experiment_name() -> String {
    "rag-evaluation".into()
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RAGBENCH_`)
/// 3. Workspace-local config (`.ragbench/config.toml`)
/// 4. User config (`~/.config/ragbench/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&RagConfig>,
) -> Result<RagConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(RagConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "ragbench", "ragbench") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".ragbench").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // RAGBENCH_LLM__PROVIDER, RAGBENCH_CHUNKING__CHUNK_SIZE, etc.
    figment = figment.merge(Env::prefixed("RAGBENCH_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: RagConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Render a config as TOML for display.
pub fn to_toml(config: &RagConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}
