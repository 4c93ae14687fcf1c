//! Vocabulary statistics and word-set similarity.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Lowercased word tokens; apostrophes stay inside words.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

pub fn word_set(text: &str) -> HashSet<String> {
    words(text).into_iter().collect()
}

/// `|A ∩ B| / |A ∪ B|`; 0 when both sets are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Jaccard similarity of two texts' word sets.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    jaccard(&word_set(a), &word_set(b))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VocabularyStats {
    /// Distinct words over total words.
    pub unique_word_ratio: f64,
    /// Words per sentence.
    pub avg_sentence_length: f64,
    /// ASCII punctuation characters over all non-whitespace characters.
    pub punctuation_density: f64,
}

/// Statistics over every text an agent wrote.
pub fn vocabulary_stats<S: AsRef<str>>(texts: &[S]) -> VocabularyStats {
    let mut total_words = 0usize;
    let mut unique: HashSet<String> = HashSet::new();
    let mut sentences = 0usize;
    let mut punctuation = 0usize;
    let mut visible_chars = 0usize;

    for text in texts {
        let text = text.as_ref();
        let w = words(text);
        total_words += w.len();
        unique.extend(w);
        sentences += text
            .split(['.', '!', '?'])
            .filter(|s| !words(s).is_empty())
            .count();
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            visible_chars += 1;
            if c.is_ascii_punctuation() {
                punctuation += 1;
            }
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    VocabularyStats {
        unique_word_ratio: ratio(unique.len(), total_words),
        avg_sentence_length: ratio(total_words, sentences),
        punctuation_density: ratio(punctuation, visible_chars),
    }
}
