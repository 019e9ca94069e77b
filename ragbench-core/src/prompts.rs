//! Prompt templates for grounded question answering.

use crate::document::Document;

const SYSTEM_PROMPT_EN: &str = "You are a helpful assistant that answers questions based on the provided context.

Instructions:
1. Answer the question using ONLY the information from the context below.
2. If the context doesn't contain enough information to answer, say \"I don't have enough information to answer this question.\"
3. Always cite your sources by referencing the document names when possible.
4. Be concise and direct in your answers.

Context:
{context}";

const SYSTEM_PROMPT_DE: &str = "Du bist ein hilfreicher Assistent, der Fragen auf Grundlage des bereitgestellten Kontexts beantwortet.

Anweisungen:
1. Beantworte die Frage NUR mit den Informationen aus dem Kontext unten.
2. Wenn der Kontext nicht genügend Informationen enthält, sage \"Ich habe nicht genügend Informationen, um diese Frage zu beantworten.\"
3. Nenne immer deine Quellen, indem du nach Möglichkeit auf die Dokumentnamen verweist.
4. Antworte knapp und direkt.

Kontext:
{context}";

const CONTEXT_PLACEHOLDER: &str = "{context}";

/// System prompt templates for one answer language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSet {
    pub language: &'static str,
    system: &'static str,
}

impl PromptSet {
    pub fn english() -> Self {
        Self {
            language: "en",
            system: SYSTEM_PROMPT_EN,
        }
    }

    pub fn german() -> Self {
        Self {
            language: "de",
            system: SYSTEM_PROMPT_DE,
        }
    }

    /// Prompts for a two-letter language code; unknown codes get English.
    pub fn for_language(language: &str) -> Self {
        match language.to_lowercase().as_str() {
            "de" => Self::german(),
            _ => Self::english(),
        }
    }

    /// The system prompt with `context` substituted.
    pub fn system_prompt(&self, context: &str) -> String {
        self.system.replace(CONTEXT_PLACEHOLDER, context)
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::english()
    }
}

/// Render documents as a numbered, source-attributed context block.
pub fn format_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "[Document {}] (Source: {})\n{}",
                i + 1,
                doc.source().unwrap_or("Unknown"),
                doc.page_content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
