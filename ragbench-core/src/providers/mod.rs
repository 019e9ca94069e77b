//! Chat provider implementations.
//!
//! - OpenAI-compatible chat completions (OpenAI, Ollama)
//! - Anthropic Messages API

pub mod anthropic;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatibleProvider;

/// Incremental line splitter for server-sent event bodies.
///
/// Bytes may arrive split at arbitrary points, including inside a UTF-8
/// sequence; only complete lines are returned.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            lines.push(text.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Any trailing line without a final newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).trim_end().to_string();
        self.pending.clear();
        (!text.is_empty()).then_some(text)
    }
}
