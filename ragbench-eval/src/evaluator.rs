//! Scoring a single answer against the sources it was grounded on.

use crate::scorer::{faithfulness_score, relevance_score};
use ragbench_core::{Document, SourceRecord};
use serde::{Deserialize, Serialize};

/// The evaluated outcome of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub question: String,
    pub answer: String,
    pub expected_answer: Option<String>,
    pub sources: Vec<SourceRecord>,
    pub latency_seconds: f64,
    pub relevance_score: Option<f64>,
    pub faithfulness_score: Option<f64>,
}

/// The flat form of an [`EvaluationResult`] written to logs and artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub answer: String,
    pub expected_answer: Option<String>,
    pub num_sources: usize,
    pub latency_seconds: f64,
    pub relevance_score: Option<f64>,
    pub faithfulness_score: Option<f64>,
}

impl EvaluationResult {
    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn record(&self) -> EvaluationRecord {
        EvaluationRecord {
            question: self.question.clone(),
            answer: self.answer.clone(),
            expected_answer: self.expected_answer.clone(),
            num_sources: self.num_sources(),
            latency_seconds: self.latency_seconds,
            relevance_score: self.relevance_score,
            faithfulness_score: self.faithfulness_score,
        }
    }
}

/// Score `answer` and the sources it was generated from.
///
/// Both scores are always computed here; they are optional on the result
/// only so records from other producers can omit them.
pub fn evaluate_response(
    question: &str,
    answer: &str,
    sources: Vec<SourceRecord>,
    latency_seconds: f64,
    expected_answer: Option<&str>,
    expected_keywords: Option<&[String]>,
) -> EvaluationResult {
    let documents: Vec<Document> = sources.iter().map(SourceRecord::to_document).collect();
    let relevance = relevance_score(question, &documents, expected_keywords);
    let faithfulness = faithfulness_score(answer, &documents);

    EvaluationResult {
        question: question.to_string(),
        answer: answer.to_string(),
        expected_answer: expected_answer.map(str::to_string),
        sources,
        latency_seconds,
        relevance_score: Some(relevance),
        faithfulness_score: Some(faithfulness),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ragbench_core::Metadata;
    use serde_json::json;

    fn sources() -> Vec<SourceRecord> {
        vec![
            SourceRecord::new("Cats are popular pets that require care.", Metadata::new()),
            SourceRecord::new("Dogs are loyal companions and need exercise.", Metadata::new()),
        ]
    }

    #[test]
    fn test_evaluate_response_scores() {
        let keywords = vec!["cats".to_string(), "birds".to_string()];
        let result = evaluate_response(
            "What pets are popular?",
            "Cats are popular pets.",
            sources(),
            1.25,
            Some("Cats"),
            Some(keywords.as_slice()),
        );
        assert_eq!(result.relevance_score, Some(0.5));
        assert!(result.faithfulness_score.unwrap() > 0.5);
        assert_eq!(result.expected_answer.as_deref(), Some("Cats"));
        assert_eq!(result.num_sources(), 2);
    }

    #[test]
    fn test_malformed_sources_degrade() {
        let malformed = vec![SourceRecord::from_value(&json!({"metadata": {"source": "x"}}))];
        let result = evaluate_response("q", "Cats are popular.", malformed, 0.1, None, None);
        // One empty document still counts as evidence.
        assert_eq!(result.relevance_score, Some(1.0));
        assert_eq!(result.faithfulness_score, Some(0.0));
    }

    #[test]
    fn test_record_shape() {
        let result = evaluate_response("q", "a", sources(), 0.5, None, None);
        let value = serde_json::to_value(result.record()).unwrap();
        assert_eq!(
            value,
            json!({
                "question": "q",
                "answer": "a",
                "expected_answer": null,
                "num_sources": 2,
                "latency_seconds": 0.5,
                "relevance_score": 1.0,
                "faithfulness_score": 1.0,
            })
        );
    }
}
