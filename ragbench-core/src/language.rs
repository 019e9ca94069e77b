//! Lightweight query language detection.

/// Detects the language of a piece of text as a two-letter lowercase code.
///
/// Implementations return `"en"` when the input is empty or ambiguous.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> String;
}

const GERMAN_INDICATORS: &[&str] = &[
    "der", "die", "das", "und", "ist", "sind", "ein", "eine", "für", "mit", "auf", "nicht", "ich",
    "du", "wir", "sie", "kann", "wird", "haben", "werden", "über", "nach",
];

/// Fallback heuristic that only tells German from English, by counting common
/// German function words. Everything that is not German reports `"en"`; it is
/// not a general-purpose language identifier.
///
/// Tokens are whitespace-separated and lower-cased; punctuation stays attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicDetector;

impl LanguageDetector for HeuristicDetector {
    fn detect(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        if words.is_empty() {
            return "en".to_string();
        }
        let hits = words
            .iter()
            .filter(|w| GERMAN_INDICATORS.contains(*w))
            .count();
        if hits >= 2 || hits as f64 / words.len() as f64 > 0.2 {
            "de".to_string()
        } else {
            "en".to_string()
        }
    }
}
