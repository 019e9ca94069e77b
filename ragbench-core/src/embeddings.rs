//! Embedding backends for the vector store.
//!
//! [`EmbeddingModel`] is resolved once from [`EmbeddingSettings`] and then
//! dispatches statically to one of the concrete backends. The local backend
//! hashes lower-cased alphanumeric terms into a fixed number of dimensions and
//! needs no network.

use crate::config::{EmbeddingProviderKind, EmbeddingSettings};
use crate::error::{ConfigError, LlmError};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Anything that turns text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| LlmError::ResponseParse {
            message: "embedding backend returned no vectors".into(),
        })
    }

    /// Model name reported in configuration and experiment reports.
    fn model_name(&self) -> &str;
}

/// Cosine similarity between two vectors. Mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Hashed bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn model_name(&self) -> &str {
        "local"
    }
}

fn parse_vectors(
    values: Option<&Vec<serde_json::Value>>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, LlmError> {
    let values = values.ok_or_else(|| LlmError::ResponseParse {
        message: "missing embeddings in response".into(),
    })?;
    let vectors: Vec<Vec<f32>> = values
        .iter()
        .map(|v| {
            v.as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|x| x.as_f64().map(|f| f as f32))
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();
    if vectors.len() != expected {
        return Err(LlmError::ResponseParse {
            message: format!("expected {expected} embeddings, got {}", vectors.len()),
        });
    }
    Ok(vectors)
}

fn map_status(provider: &str, status: reqwest::StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::AuthFailed {
            provider: provider.to_string(),
        },
        429 => LlmError::RateLimited {
            retry_after_secs: 60,
        },
        code => LlmError::ApiRequest {
            message: format!("{provider} embeddings HTTP {code}: {body}"),
        },
    }
}

/// OpenAI `/v1/embeddings` client.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub const DEFAULT_MODEL: &'static str = "text-embedding-3-small";

    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| Self::DEFAULT_MODEL.into()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".into()),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "model": self.model, "input": texts });
        debug!(model = %self.model, inputs = texts.len(), "Requesting OpenAI embeddings");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status("openai", status, text));
        }
        let json: serde_json::Value = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: e.to_string(),
        })?;

        let embeddings: Option<Vec<serde_json::Value>> = json["data"].as_array().map(|data| {
            data.iter().map(|item| item["embedding"].clone()).collect()
        });
        parse_vectors(embeddings.as_ref(), texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Ollama `/api/embed` client.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaEmbedder {
    pub const DEFAULT_MODEL: &'static str = "nomic-embed-text";

    pub fn new(model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.unwrap_or_else(|| Self::DEFAULT_MODEL.into()),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".into()),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "model": self.model, "input": texts });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status("ollama", status, text));
        }
        let json: serde_json::Value = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: e.to_string(),
        })?;
        parse_vectors(json["embeddings"].as_array(), texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// The configured embedding backend.
#[derive(Debug, Clone)]
pub enum EmbeddingModel {
    Local(LocalEmbedder),
    OpenAi(OpenAiEmbedder),
    Ollama(OllamaEmbedder),
}

impl EmbeddingModel {
    /// Resolve the backend once from settings.
    ///
    /// The OpenAI backend requires its API key variable to be set.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self, ConfigError> {
        match settings.provider {
            EmbeddingProviderKind::Local => {
                if settings.dimensions == 0 {
                    return Err(ConfigError::invalid("embedding.dimensions must be positive"));
                }
                Ok(Self::Local(LocalEmbedder::new(settings.dimensions)))
            }
            EmbeddingProviderKind::OpenAi => {
                let var = &settings.openai_api_key_env;
                let key = std::env::var(var)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| ConfigError::EnvVarMissing { var: var.clone() })?;
                Ok(Self::OpenAi(OpenAiEmbedder::new(
                    key,
                    settings.model.clone(),
                    None,
                )))
            }
            EmbeddingProviderKind::Ollama => Ok(Self::Ollama(OllamaEmbedder::new(
                settings.model.clone(),
                Some(settings.ollama_base_url.clone()),
            ))),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingModel {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        match self {
            Self::Local(e) => e.embed_batch(texts).await,
            Self::OpenAi(e) => e.embed_batch(texts).await,
            Self::Ollama(e) => e.embed_batch(texts).await,
        }
    }

    fn model_name(&self) -> &str {
        match self {
            Self::Local(e) => e.model_name(),
            Self::OpenAi(e) => e.model_name(),
            Self::Ollama(e) => e.model_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_embedder_normalized() {
        let embedder = LocalEmbedder::new(128);
        let v = embedder.embed("test input text for normalization");
        assert_eq!(v.len(), 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "Expected normalized vector, got norm={norm}");
    }

    #[test]
    fn test_local_embedder_empty_text() {
        let v = LocalEmbedder::new(64).embed("");
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_local_embedder_case_and_punctuation_insensitive() {
        let embedder = LocalEmbedder::new(128);
        assert_eq!(embedder.embed("Hello, World!"), embedder.embed("hello world"));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_embed_batch_and_query_agree() {
        let embedder = LocalEmbedder::new(32);
        let batch = embedder
            .embed_batch(&["alpha beta".to_string(), "gamma".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        let query = embedder.embed_query("alpha beta").await.unwrap();
        assert_eq!(query, batch[0]);
    }

    #[test]
    fn test_from_settings_local_default() {
        let model = EmbeddingModel::from_settings(&EmbeddingSettings::default()).unwrap();
        assert!(matches!(model, EmbeddingModel::Local(ref e) if e.dimensions() == 256));
        assert_eq!(model.model_name(), "local");
    }

    #[test]
    fn test_from_settings_openai_missing_key() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProviderKind::OpenAi,
            openai_api_key_env: "RAGBENCH_TEST_UNSET_EMBED_KEY".into(),
            ..Default::default()
        };
        let err = EmbeddingModel::from_settings(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarMissing { ref var } if var == "RAGBENCH_TEST_UNSET_EMBED_KEY"));
    }

    #[test]
    fn test_from_settings_ollama_model_name() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProviderKind::Ollama,
            model: Some("mxbai-embed-large".into()),
            ..Default::default()
        };
        let model = EmbeddingModel::from_settings(&settings).unwrap();
        assert_eq!(model.model_name(), "mxbai-embed-large");
    }

    #[test]
    fn test_parse_vectors_count_mismatch() {
        let values = vec![serde_json::json!([0.1, 0.2])];
        let err = parse_vectors(Some(&values), 2).unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }
}
