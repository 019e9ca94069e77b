//! Anthropic Messages API provider.
//!
//! Differences from the OpenAI wire format:
//! - Auth via `x-api-key` header plus a required `anthropic-version` header
//! - System prompt is a top-level `system` field, not a message
//! - SSE streaming uses named events (`content_block_delta`, `message_delta`, ...)

use super::SseLineBuffer;
use crate::brain::LlmProvider;
use crate::config::LlmSettings;
use crate::error::{ConfigError, LlmError};
use crate::types::{
    CompletionRequest, CompletionResponse, Message, Role, StreamEvent, TokenUsage,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
}

/// Streaming state carried across SSE events.
#[derive(Debug, Default)]
struct StreamState {
    event: String,
    usage: TokenUsage,
}

impl AnthropicProvider {
    /// Build from settings. The API key must be present in the environment.
    pub fn new(settings: &LlmSettings) -> Result<Self, ConfigError> {
        let var = &settings.anthropic_api_key_env;
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::EnvVarMissing { var: var.clone() })?;
        Ok(Self::new_with_key(settings, api_key))
    }

    pub fn new_with_key(settings: &LlmSettings, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: settings.anthropic_model.clone(),
            max_tokens: settings.max_tokens,
        }
    }

    fn build_request_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let (system, rest) = Self::extract_system_message(&request.messages);
        let messages: Vec<Value> = rest
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "temperature": request.temperature,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    /// Split system messages out, joining several with blank lines.
    fn extract_system_message(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut rest = Vec::new();
        for msg in messages {
            if msg.role == Role::System {
                system_parts.push(&msg.content);
            } else {
                rest.push(msg);
            }
        }
        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
        (system, rest)
    }

    fn parse_response(body: &Value) -> Result<CompletionResponse, LlmError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'content' array in response".to_string(),
            })?;
        let text: String = blocks
            .iter()
            .filter(|b| b["type"].as_str().unwrap_or("text") == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();

        Ok(CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
                output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
            },
            model: body["model"].as_str().unwrap_or("unknown").to_string(),
            finish_reason: body["stop_reason"].as_str().map(str::to_string),
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "anthropic".to_string(),
            },
            429 => {
                let retry_after = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                LlmError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            _ => LlmError::ApiRequest {
                message: format!("HTTP {status} from Anthropic API: {body_text}"),
            },
        }
    }

    /// Handle one SSE line, forwarding text deltas to `tx`.
    async fn handle_line(
        line: &str,
        state: &mut StreamState,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let line = line.trim();
        if let Some(event) = line.strip_prefix("event:") {
            state.event = event.trim().to_string();
            return Ok(());
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let Ok(data) = serde_json::from_str::<Value>(data.trim()) else {
            return Ok(());
        };
        let event = if state.event.is_empty() {
            data["type"].as_str().unwrap_or("").to_string()
        } else {
            std::mem::take(&mut state.event)
        };

        match event.as_str() {
            "message_start" => {
                if let Some(n) = data["message"]["usage"]["input_tokens"].as_u64() {
                    state.usage.input_tokens = n as usize;
                }
            }
            "content_block_delta" => {
                if data["delta"]["type"] == "text_delta"
                    && let Some(text) = data["delta"]["text"].as_str()
                    && !text.is_empty()
                {
                    let _ = tx.send(StreamEvent::Token(text.to_string())).await;
                }
            }
            "message_delta" => {
                if let Some(n) = data["usage"]["output_tokens"].as_u64() {
                    state.usage.output_tokens += n as usize;
                }
            }
            "error" => {
                let message = data["error"]["message"]
                    .as_str()
                    .unwrap_or("Unknown streaming error")
                    .to_string();
                let _ = tx.send(StreamEvent::Error(message.clone())).await;
                return Err(LlmError::Streaming { message });
            }
            other => debug!(event = other, "Ignoring SSE event"),
        }
        Ok(())
    }

    fn post(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request, false);
        let url = format!("{}/messages", self.base_url);
        debug!(model = %self.model, url = %url, "Sending Anthropic completion request");

        let response = self
            .post(&url, &body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: format!("Request to Anthropic API failed: {e}"),
            })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {e}"),
        })?;
        if !status.is_success() {
            return Err(Self::map_http_error(status, &text));
        }
        let json: Value = serde_json::from_str(&text).map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid JSON in response: {e}"),
        })?;
        Self::parse_response(&json)
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let body = self.build_request_body(&request, true);
        let url = format!("{}/messages", self.base_url);

        let response = self
            .post(&url, &body)
            .send()
            .await
            .map_err(|e| LlmError::Streaming {
                message: format!("Streaming request to Anthropic API failed: {e}"),
            })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &text));
        }

        let mut state = StreamState::default();
        let mut buffer = SseLineBuffer::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Streaming {
                message: format!("Failed to read streaming response: {e}"),
            })?;
            for line in buffer.push(&chunk) {
                if let Err(e) = Self::handle_line(&line, &mut state, &tx).await {
                    warn!(error = %e, "Error processing SSE event");
                    return Err(e);
                }
            }
        }
        if let Some(line) = buffer.finish() {
            Self::handle_line(&line, &mut state, &tx).await?;
        }

        let _ = tx.send(StreamEvent::Done { usage: state.usage }).await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}
