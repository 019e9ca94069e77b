//! OpenAI-compatible chat completions provider.
//!
//! Serves both the OpenAI API and Ollama's `/v1` endpoint, which speaks the
//! same wire format without requiring a key.

use super::SseLineBuffer;
use crate::brain::LlmProvider;
use crate::config::LlmSettings;
use crate::error::{ConfigError, LlmError};
use crate::types::{CompletionRequest, CompletionResponse, Message, StreamEvent, TokenUsage};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::debug;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider for any endpoint implementing `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    label: &'static str,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
}

impl OpenAiCompatibleProvider {
    /// Build an OpenAI provider. The API key must be present in the environment.
    pub fn openai(settings: &LlmSettings) -> Result<Self, ConfigError> {
        let var = &settings.openai_api_key_env;
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::EnvVarMissing { var: var.clone() })?;
        Ok(Self::openai_with_key(settings, api_key))
    }

    /// Build an OpenAI provider with an explicitly resolved key.
    pub fn openai_with_key(settings: &LlmSettings, api_key: String) -> Self {
        Self {
            client: Client::new(),
            label: "openai",
            base_url: settings
                .openai_base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key: Some(api_key),
            model: settings.openai_model.clone(),
            max_tokens: settings.max_tokens,
        }
    }

    /// Build an Ollama provider against `{ollama_base_url}/v1`.
    pub fn ollama(settings: &LlmSettings) -> Self {
        Self {
            client: Client::new(),
            label: "ollama",
            base_url: format!("{}/v1", settings.ollama_base_url.trim_end_matches('/')),
            api_key: None,
            model: settings.ollama_model.clone(),
            max_tokens: settings.max_tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
            .collect()
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": Self::messages_to_json(&request.messages),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "stream": stream,
        });
        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    fn parse_response(body: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice = body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;
        let message = choice.get("message").ok_or_else(|| LlmError::ResponseParse {
            message: "No message in choice".to_string(),
        })?;
        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("");

        Ok(CompletionResponse {
            message: Message::assistant(text),
            usage: Self::parse_usage(body.get("usage")),
            model: body
                .get("model")
                .and_then(|m| m.as_str())
                .unwrap_or(model)
                .to_string(),
            finish_reason: choice
                .get("finish_reason")
                .and_then(|f| f.as_str())
                .map(str::to_string),
        })
    }

    fn parse_usage(usage: Option<&Value>) -> TokenUsage {
        let field = |name: &str| {
            usage
                .and_then(|u| u.get(name))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize
        };
        TokenUsage {
            input_tokens: field("prompt_tokens"),
            output_tokens: field("completion_tokens"),
        }
    }

    /// Parse a single SSE data line. `None` for non-data lines and `[DONE]`.
    fn parse_sse_line(line: &str) -> Option<Value> {
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            return None;
        }
        serde_json::from_str(data).ok()
    }

    /// Forward one SSE line; returns `true` once the `[DONE]` marker is seen.
    async fn handle_line(
        line: &str,
        tx: &mpsc::Sender<StreamEvent>,
        usage: &mut TokenUsage,
    ) -> bool {
        let line = line.trim();
        if line == "data: [DONE]" || line == "data:[DONE]" {
            return true;
        }
        let Some(data) = Self::parse_sse_line(line) else {
            return false;
        };
        if let Some(u) = data.get("usage").filter(|u| !u.is_null()) {
            *usage = Self::parse_usage(Some(u));
        }
        if let Some(content) = data
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())
            && !content.is_empty()
        {
            let _ = tx.send(StreamEvent::Token(content.to_string())).await;
        }
        false
    }

    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                LlmError::AuthFailed {
                    provider: self.label.to_string(),
                }
            }
            429 => LlmError::RateLimited {
                retry_after_secs: 5,
            },
            code if code >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({status}): {body}"),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }

    fn post(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let builder = self.client.post(url).json(body);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request, false);
        debug!(
            url = %url,
            model = %self.model,
            provider = self.label,
            "Sending completion request"
        );

        let response = self
            .post(&url, &body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: format!("Request failed: {e}"),
            })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {e}"),
        })?;
        if !status.is_success() {
            return Err(self.map_http_error(status, &text));
        }
        let json: Value = serde_json::from_str(&text).map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid JSON: {e}"),
        })?;
        Self::parse_response(&json, &self.model)
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request, true);

        let response = self
            .post(&url, &body)
            .send()
            .await
            .map_err(|e| LlmError::Streaming {
                message: format!("Request failed: {e}"),
            })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.map_http_error(status, &text));
        }

        let mut usage = TokenUsage::default();
        let mut buffer = SseLineBuffer::default();
        let mut stream = response.bytes_stream();

        let mut finished = false;
        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Streaming {
                message: format!("Failed to read stream: {e}"),
            })?;
            for line in buffer.push(&chunk) {
                if Self::handle_line(&line, &tx, &mut usage).await {
                    finished = true;
                    break 'read;
                }
            }
        }
        if !finished && let Some(line) = buffer.finish() {
            Self::handle_line(&line, &tx, &mut usage).await;
        }

        let _ = tx.send(StreamEvent::Done { usage }).await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        self.label
    }
}
