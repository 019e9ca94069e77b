//! The retrieve → format → prompt → generate pipeline.

use crate::brain::LlmProvider;
use crate::document::{Document, SourceRecord};
use crate::error::{LlmError, RagError};
use crate::prompts::{PromptSet, format_documents};
use crate::retrieval::{RagAnswer, Retriever};
use crate::types::{CompletionRequest, Message, StreamEvent};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sources longer than this many characters are truncated in answers.
pub const SOURCE_PREVIEW_CHARS: usize = 200;

type History = Arc<Mutex<Vec<Message>>>;

/// Question answering over a retriever and a chat model, with optional
/// conversation history.
pub struct RagChain {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LlmProvider>,
    prompts: PromptSet,
    k: usize,
    temperature: f32,
    max_tokens: Option<usize>,
    history: History,
}

impl RagChain {
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            retriever,
            llm,
            prompts: PromptSet::default(),
            k: 4,
            temperature: 0.0,
            max_tokens: None,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: Option<usize>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Retrieve the configured number of documents for `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RagError> {
        self.retriever.search(query, self.k).await
    }

    /// Answer `query` using the configured `k`.
    pub async fn invoke(&self, query: &str, use_history: bool) -> Result<RagAnswer, RagError> {
        self.invoke_with_k(query, self.k, use_history).await
    }

    /// Answer `query` from the top `k` documents.
    pub async fn invoke_with_k(
        &self,
        query: &str,
        k: usize,
        use_history: bool,
    ) -> Result<RagAnswer, RagError> {
        let documents = self.retriever.search(query, k).await?;
        let request = self.build_request(query, &documents, use_history);
        let response = self.llm.complete(request).await?;
        let answer = response.text().to_string();
        debug!(
            k,
            retrieved = documents.len(),
            output_tokens = response.usage.output_tokens,
            "Generated answer"
        );

        if use_history {
            self.record_turn(query, &answer);
        }
        Ok(RagAnswer::new(answer, preview_sources(&documents)))
    }

    /// Stream the answer to `query` as text fragments.
    ///
    /// History is updated only once the stream has been read to the end.
    pub async fn stream(&self, query: &str, use_history: bool) -> Result<AnswerStream, RagError> {
        let documents = self.retrieve(query).await?;
        let request = self.build_request(query, &documents, use_history);
        let (tx, rx) = mpsc::channel(64);
        let llm = Arc::clone(&self.llm);

        tokio::spawn(async move {
            let err_tx = tx.clone();
            if let Err(e) = llm.complete_streaming(request, tx).await {
                warn!(error = %e, "Streaming completion failed");
                let _ = err_tx.send(StreamEvent::Error(e.to_string())).await;
            }
        });

        Ok(AnswerStream {
            rx,
            text: String::new(),
            question: query.to_string(),
            history: use_history.then(|| Arc::clone(&self.history)),
            sources: preview_sources(&documents),
            finished: false,
        })
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
    }

    pub fn chat_history(&self) -> Vec<Message> {
        self.lock_history().clone()
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.history.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record_turn(&self, question: &str, answer: &str) {
        let mut history = self.lock_history();
        history.push(Message::user(question));
        history.push(Message::assistant(answer));
    }

    fn build_request(
        &self,
        query: &str,
        documents: &[Document],
        use_history: bool,
    ) -> CompletionRequest {
        let context = format_documents(documents);
        let mut messages = vec![Message::system(self.prompts.system_prompt(&context))];
        if use_history {
            messages.extend(self.lock_history().iter().cloned());
        }
        messages.push(Message::user(query));
        CompletionRequest {
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            model: None,
        }
    }
}

fn preview_sources(documents: &[Document]) -> Vec<SourceRecord> {
    documents
        .iter()
        .map(|doc| {
            let content = if doc.page_content.chars().count() > SOURCE_PREVIEW_CHARS {
                let head: String = doc.page_content.chars().take(SOURCE_PREVIEW_CHARS).collect();
                format!("{head}...")
            } else {
                doc.page_content.clone()
            };
            SourceRecord::new(content, doc.metadata.clone())
        })
        .collect()
}

/// A finite, single-use stream of answer fragments.
pub struct AnswerStream {
    rx: mpsc::Receiver<StreamEvent>,
    text: String,
    question: String,
    history: Option<History>,
    sources: Vec<SourceRecord>,
    finished: bool,
}

impl AnswerStream {
    /// The next text fragment, `None` once the answer is complete.
    pub async fn next(&mut self) -> Option<Result<String, LlmError>> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(StreamEvent::Token(token)) => {
                self.text.push_str(&token);
                Some(Ok(token))
            }
            Some(StreamEvent::Done { .. }) | None => {
                self.finish();
                None
            }
            Some(StreamEvent::Error(message)) => {
                self.finished = true;
                Some(Err(LlmError::Streaming { message }))
            }
        }
    }

    /// Drain the stream and return the assembled answer.
    pub async fn collect(mut self) -> Result<RagAnswer, LlmError> {
        while let Some(fragment) = self.next().await {
            fragment?;
        }
        Ok(RagAnswer::new(
            std::mem::take(&mut self.text),
            std::mem::take(&mut self.sources),
        ))
    }

    pub fn sources(&self) -> &[SourceRecord] {
        &self.sources
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(history) = self.history.take() {
            let mut history = history.lock().unwrap_or_else(|p| p.into_inner());
            history.push(Message::user(std::mem::take(&mut self.question)));
            history.push(Message::assistant(self.text.clone()));
        }
    }
}
