//! The chat model capability and its configured implementations.
//!
//! [`ChatModel`] is resolved once from [`LlmSettings`]; callers hold it (or any
//! other [`LlmProvider`]) behind a trait object.

use crate::config::{LlmProviderKind, LlmSettings};
use crate::error::{ConfigError, LlmError};
use crate::providers::{AnthropicProvider, OpenAiCompatibleProvider};
use crate::types::{CompletionRequest, CompletionResponse, Message, StreamEvent, TokenUsage};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Perform a streaming completion, sending events to the channel.
    ///
    /// Implementations send zero or more `Token` events followed by one `Done`.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// The configured chat backend.
#[derive(Debug, Clone)]
pub enum ChatModel {
    OpenAi(OpenAiCompatibleProvider),
    Anthropic(AnthropicProvider),
    Ollama(OpenAiCompatibleProvider),
}

impl ChatModel {
    /// Resolve the chat backend once from settings.
    ///
    /// Fails with `ConfigError::EnvVarMissing` when the selected provider
    /// needs an API key that is not set.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ConfigError> {
        let model = match settings.provider {
            LlmProviderKind::OpenAi => Self::OpenAi(OpenAiCompatibleProvider::openai(settings)?),
            LlmProviderKind::Anthropic => Self::Anthropic(AnthropicProvider::new(settings)?),
            LlmProviderKind::Ollama => Self::Ollama(OpenAiCompatibleProvider::ollama(settings)),
        };
        tracing::info!(
            provider = settings.provider.as_str(),
            model = model.model_name(),
            "Chat model configured"
        );
        Ok(model)
    }

    fn inner(&self) -> &dyn LlmProvider {
        match self {
            Self::OpenAi(p) | Self::Ollama(p) => p,
            Self::Anthropic(p) => p,
        }
    }
}

#[async_trait]
impl LlmProvider for ChatModel {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.inner().complete(request).await
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        self.inner().complete_streaming(request, tx).await
    }

    fn model_name(&self) -> &str {
        self.inner().model_name()
    }

    fn provider_name(&self) -> &str {
        self.inner().provider_name()
    }
}

/// A chat provider, its default model, and whether it needs a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub default_model: &'static str,
    pub requires_api_key: bool,
}

/// The supported chat providers.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "openai",
            default_model: "gpt-4o-mini",
            requires_api_key: true,
        },
        ProviderInfo {
            name: "anthropic",
            default_model: "claude-3-5-sonnet-20241022",
            requires_api_key: true,
        },
        ProviderInfo {
            name: "ollama",
            default_model: "llama3.2",
            requires_api_key: false,
        },
    ]
}

/// A scripted provider for tests and offline runs.
///
/// Returns queued responses in order; once the queue is empty it repeats the
/// fallback text. Every request is recorded for inspection.
#[derive(Debug)]
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            fallback: String::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that always answers with `text`.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: text.to_string(),
            ..Self::new()
        }
    }

    /// Queue a text response for the next call.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.lock_responses().push_back(Ok(text.into()));
    }

    /// Queue a failure for the next call.
    pub fn queue_error(&self, message: impl Into<String>) {
        self.lock_responses().push_back(Err(message.into()));
    }

    /// Messages sent with every call so far.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.responses.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn next(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.messages.clone());
        match self.lock_responses().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LlmError::ApiRequest { message }),
            None => Ok(self.fallback.clone()),
        }
    }

    fn usage(text: &str) -> TokenUsage {
        TokenUsage {
            input_tokens: 100,
            output_tokens: text.split_whitespace().count(),
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let text = self.next(&request)?;
        Ok(CompletionResponse {
            usage: Self::usage(&text),
            message: Message::assistant(text),
            model: self.model.clone(),
            finish_reason: Some("stop".to_string()),
        })
    }

    /// Streams the response word by word, keeping the whitespace.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let text = self.next(&request)?;
        for token in text.split_inclusive(' ') {
            let _ = tx.send(StreamEvent::Token(token.to_string())).await;
        }
        let _ = tx
            .send(StreamEvent::Done {
                usage: Self::usage(&text),
            })
            .await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_providers() {
        let providers = list_providers();
        let names: Vec<&str> = providers.iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["openai", "anthropic", "ollama"]);
        assert!(!providers[2].requires_api_key);
        assert_eq!(providers[1].default_model, "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn test_chat_model_ollama_needs_no_key() {
        let settings = LlmSettings {
            provider: LlmProviderKind::Ollama,
            ..Default::default()
        };
        let model = ChatModel::from_settings(&settings).unwrap();
        assert!(matches!(model, ChatModel::Ollama(_)));
        assert_eq!(model.model_name(), "llama3.2");
        assert_eq!(model.provider_name(), "ollama");
    }

    #[test]
    fn test_chat_model_anthropic_missing_key() {
        let settings = LlmSettings {
            provider: LlmProviderKind::Anthropic,
            anthropic_api_key_env: "RAGBENCH_TEST_UNSET_ANTHROPIC_KEY".into(),
            ..Default::default()
        };
        let err = ChatModel::from_settings(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarMissing { .. }));
    }

    #[tokio::test]
    async fn test_mock_queue_then_fallback() {
        let mock = MockLlmProvider::with_response("fallback");
        mock.queue_response("first");
        mock.queue_error("boom");

        let req = || CompletionRequest {
            messages: vec![Message::user("q")],
            ..Default::default()
        };
        assert_eq!(mock.complete(req()).await.unwrap().text(), "first");
        assert!(mock.complete(req()).await.is_err());
        assert_eq!(mock.complete(req()).await.unwrap().text(), "fallback");
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_streaming_reassembles() {
        let mock = MockLlmProvider::with_response("one two three");
        let (tx, mut rx) = mpsc::channel(16);
        mock.complete_streaming(CompletionRequest::default(), tx)
            .await
            .unwrap();

        let mut text = String::new();
        let mut done = false;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Token(t) => text.push_str(&t),
                StreamEvent::Done { .. } => done = true,
                StreamEvent::Error(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(text, "one two three");
        assert!(done);
    }
}
