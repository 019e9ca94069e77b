//! Lexical relevance and faithfulness scoring.
//!
//! Both scores are fractions in `[0, 1]` computed by case-insensitive
//! substring search over the concatenated document text. Empty evidence
//! scores 0.0; nothing to check scores 1.0.

use ragbench_core::Document;

/// English function words ignored by [`faithfulness_score`].
pub const STOP_WORDS: [&str; 91] = [
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "dare", "ought", "used", "to", "of", "in", "for", "on", "with", "at", "by",
    "from", "as", "into", "through", "during", "before", "after", "above", "below", "between",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
    "all", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only",
    "own", "same", "so", "than", "too", "very", "just", "and", "but", "if", "or", "because",
    "until", "while", "this", "that", "these", "those", "i", "it", "its",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lower-cased document texts joined by single spaces.
fn search_buffer(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.page_content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fraction of `expected_keywords` found in the retrieved documents.
///
/// Returns 0.0 with no documents and 1.0 when no keywords are given.
/// Matching is substring containment, so a keyword inside a longer word counts.
pub fn relevance_score(
    _question: &str,
    documents: &[Document],
    expected_keywords: Option<&[String]>,
) -> f64 {
    if documents.is_empty() {
        return 0.0;
    }
    let keywords = match expected_keywords {
        Some(k) if !k.is_empty() => k,
        _ => return 1.0,
    };
    let buffer = search_buffer(documents);
    let matches = keywords
        .iter()
        .filter(|kw| buffer.contains(&kw.to_lowercase()))
        .count();
    matches as f64 / keywords.len() as f64
}

/// The distinct significant words of `answer`.
///
/// A word is significant when it is longer than two characters and is not
/// a stop word (both checked before trimming). Kept words are lower-cased
/// with `.`, `,`, `!` and `?` trimmed from both ends.
pub fn significant_words(answer: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in answer.split_whitespace() {
        let lowered = word.to_lowercase();
        if word.chars().count() <= 2 || is_stop_word(&lowered) {
            continue;
        }
        let trimmed = lowered.trim_matches(['.', ',', '!', '?']).to_string();
        if !words.contains(&trimmed) {
            words.push(trimmed);
        }
    }
    words
}

/// Fraction of the answer's significant words found in the documents.
///
/// Returns 0.0 for an empty answer or no documents and 1.0 when the answer
/// has no significant words.
pub fn faithfulness_score(answer: &str, documents: &[Document]) -> f64 {
    if answer.is_empty() || documents.is_empty() {
        return 0.0;
    }
    let words = significant_words(answer);
    if words.is_empty() {
        return 1.0;
    }
    let buffer = search_buffer(documents);
    let matches = words.iter().filter(|w| buffer.contains(w.as_str())).count();
    matches as f64 / words.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("Cats are popular pets that require care."),
            Document::new("Dogs are loyal companions and need exercise."),
        ]
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_stop_word_count() {
        let unique: std::collections::HashSet<_> = STOP_WORDS.iter().collect();
        assert_eq!(unique.len(), 91);
    }

    #[test]
    fn test_relevance_all_keywords() {
        assert_eq!(relevance_score("q", &docs(), Some(kw(&["cats", "dogs"]).as_slice())), 1.0);
    }

    #[test]
    fn test_relevance_partial() {
        assert_eq!(relevance_score("q", &docs(), Some(kw(&["cats", "birds"]).as_slice())), 0.5);
    }

    #[test]
    fn test_relevance_edge_cases() {
        assert_eq!(relevance_score("q", &[], Some(kw(&["cats"]).as_slice())), 0.0);
        assert_eq!(relevance_score("q", &[], None), 0.0);
        assert_eq!(relevance_score("q", &docs(), None), 1.0);
        assert_eq!(relevance_score("q", &docs(), Some(&[][..])), 1.0);
    }

    #[test]
    fn test_relevance_is_case_insensitive_substring() {
        // "CAT" is a substring of "cats"
        assert_eq!(relevance_score("q", &docs(), Some(kw(&["CAT", "Loyal"]).as_slice())), 1.0);
    }

    #[test]
    fn test_faithfulness_grounded_answer() {
        assert!(faithfulness_score("Cats are popular pets.", &docs()) > 0.5);
    }

    #[test]
    fn test_faithfulness_ungrounded_answer() {
        assert!(faithfulness_score("Elephants live in Africa and Asia.", &docs()) < 0.5);
    }

    #[test]
    fn test_faithfulness_edge_cases() {
        assert_eq!(faithfulness_score("", &docs()), 0.0);
        assert_eq!(faithfulness_score("Cats", &[]), 0.0);
        // Only short words and stop words
        assert_eq!(faithfulness_score("It is so I am", &docs()), 1.0);
    }

    #[test]
    fn test_significant_words_rules() {
        // Length is checked on the raw token, so "ox." survives as "ox".
        assert_eq!(significant_words("ox. The cats, cats!"), vec!["ox", "cats"]);
        // Stop-word check uses the untrimmed token.
        assert_eq!(significant_words("this. this"), vec!["this"]);
        assert_eq!(significant_words("...!"), vec![""]);
    }

    #[test]
    fn test_faithfulness_counts_distinct_words() {
        let docs = vec![Document::new("pets")];
        // {"pets", "elephants"}: one of two found
        assert_eq!(faithfulness_score("pets pets pets elephants", &docs), 0.5);
    }
}
