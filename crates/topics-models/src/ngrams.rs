//! Collocation detection and merging.
//!
//! Multi-word collocations meeting collection- and document-frequency
//! thresholds are scored by normalized PMI and merged into single tokens
//! before training, so "wild land fire" becomes one vocabulary entry. The
//! resulting [`PhraseTable`] is persisted with the model and re-applied on
//! reload so the vocabulary stays identical.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use topics_types::{LabelingSettings, NgramSettings};

/// Delimiter placed between the words of a merged collocation.
pub const PHRASE_DELIMITER: &str = " ";

/// Thresholds for collocation extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseOptions {
    /// Minimum collection frequency
    pub min_cf: usize,
    /// Minimum document frequency
    pub min_df: usize,
    /// Maximum collocation length in words
    pub max_len: usize,
    /// Maximum number of collocations kept
    pub max_candidates: usize,
    /// Minimum normalized PMI
    pub min_score: f64,
}

impl From<&NgramSettings> for PhraseOptions {
    fn from(settings: &NgramSettings) -> Self {
        Self {
            min_cf: settings.min_cf,
            min_df: settings.min_df,
            max_len: settings.max_len,
            max_candidates: settings.max_candidates,
            min_score: settings.min_score,
        }
    }
}

impl From<&LabelingSettings> for PhraseOptions {
    fn from(settings: &LabelingSettings) -> Self {
        Self {
            min_cf: settings.min_cf,
            min_df: settings.min_df,
            max_len: settings.max_len,
            max_candidates: settings.max_candidates,
            min_score: 0.0,
        }
    }
}

/// A scored collocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    /// Component words in order
    pub words: Vec<String>,
    /// Normalized PMI
    pub score: f64,
    /// Collection frequency
    pub cf: usize,
    /// Document frequency
    pub df: usize,
}

impl Phrase {
    /// Merged token form.
    pub fn joined(&self) -> String {
        self.words.join(PHRASE_DELIMITER)
    }
}

/// Ordered set of collocations with a first-word lookup index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Phrase>", into = "Vec<Phrase>")]
pub struct PhraseTable {
    phrases: Vec<Phrase>,
    by_first_word: HashMap<String, Vec<usize>>,
}

impl PhraseTable {
    /// Table that merges nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Detect collocations in `texts`.
    ///
    /// Candidates are word sequences of length 2 to `max_len` that reach
    /// `min_cf` occurrences in at least `min_df` documents. They are ranked
    /// by normalized PMI (ties by word order) and the best `max_candidates`
    /// scoring at least `min_score` are kept.
    pub fn extract(texts: &[Vec<String>], options: &PhraseOptions) -> Self {
        let mut unigrams: HashMap<&str, usize> = HashMap::new();
        let mut ngrams: HashMap<Vec<&str>, (usize, usize)> = HashMap::new();
        let mut total_tokens = 0usize;

        for text in texts {
            total_tokens += text.len();
            for word in text {
                *unigrams.entry(word.as_str()).or_insert(0) += 1;
            }
            let mut seen_in_doc: HashSet<Vec<&str>> = HashSet::new();
            for n in 2..=options.max_len {
                for window in text.windows(n) {
                    let key: Vec<&str> = window.iter().map(String::as_str).collect();
                    let entry = ngrams.entry(key.clone()).or_insert((0, 0));
                    entry.0 += 1;
                    if seen_in_doc.insert(key) {
                        entry.1 += 1;
                    }
                }
            }
        }

        if total_tokens == 0 {
            return Self::empty();
        }
        let n = total_tokens as f64;

        let mut phrases: Vec<Phrase> = ngrams
            .into_iter()
            .filter(|(_, (cf, df))| *cf >= options.min_cf && *df >= options.min_df)
            .map(|(words, (cf, df))| {
                let p_joint = cf as f64 / n;
                let p_independent: f64 = words
                    .iter()
                    .map(|w| unigrams.get(w).copied().unwrap_or(0) as f64 / n)
                    .product();
                let score = normalized_pmi(p_joint, p_independent);
                Phrase {
                    words: words.into_iter().map(str::to_string).collect(),
                    score,
                    cf,
                    df,
                }
            })
            .filter(|p| p.score >= options.min_score)
            .collect();

        phrases.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.words.cmp(&b.words))
        });
        phrases.truncate(options.max_candidates);
        Self::from(phrases)
    }

    /// Collocations in rank order.
    pub fn phrases(&self) -> &[Phrase] {
        &self.phrases
    }

    /// Number of collocations.
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    /// True when the table merges nothing.
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Merge collocations in `tokens`, longest match first, left to right.
    pub fn merge(&self, tokens: &[String]) -> Vec<String> {
        if self.phrases.is_empty() {
            return tokens.to_vec();
        }
        let mut merged = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let matched = self.by_first_word.get(&tokens[i]).and_then(|candidates| {
                candidates.iter().map(|&c| &self.phrases[c]).find(|p| {
                    tokens.len() - i >= p.words.len()
                        && p.words.iter().zip(&tokens[i..]).all(|(a, b)| a == b)
                })
            });
            match matched {
                Some(phrase) => {
                    merged.push(phrase.joined());
                    i += phrase.words.len();
                }
                None => {
                    merged.push(tokens[i].clone());
                    i += 1;
                }
            }
        }
        merged
    }
}

impl PartialEq for PhraseTable {
    fn eq(&self, other: &Self) -> bool {
        self.phrases == other.phrases
    }
}

impl From<Vec<Phrase>> for PhraseTable {
    fn from(phrases: Vec<Phrase>) -> Self {
        let mut by_first_word: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, phrase) in phrases.iter().enumerate() {
            if let Some(first) = phrase.words.first() {
                by_first_word.entry(first.clone()).or_default().push(i);
            }
        }
        // Longest first; rank order among equal lengths.
        for candidates in by_first_word.values_mut() {
            candidates.sort_by(|&a, &b| {
                phrases[b]
                    .words
                    .len()
                    .cmp(&phrases[a].words.len())
                    .then(a.cmp(&b))
            });
        }
        Self {
            phrases,
            by_first_word,
        }
    }
}

impl From<PhraseTable> for Vec<Phrase> {
    fn from(table: PhraseTable) -> Self {
        table.phrases
    }
}

fn normalized_pmi(p_joint: f64, p_independent: f64) -> f64 {
    if p_joint <= 0.0 || p_independent <= 0.0 {
        return -1.0;
    }
    let neg_log_joint = -p_joint.ln();
    if neg_log_joint == 0.0 {
        return 1.0;
    }
    (p_joint / p_independent).ln() / neg_log_joint
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn options(min_cf: usize, min_df: usize) -> PhraseOptions {
        PhraseOptions {
            min_cf,
            min_df,
            max_len: 3,
            max_candidates: 100,
            min_score: 0.0,
        }
    }

    #[test]
    fn test_extract_frequent_collocation() {
        let texts = vec![
            doc("wild land fire near engine"),
            doc("crew reported wild land fire"),
            doc("wild land fire spread quickly"),
            doc("engine failure on takeoff"),
        ];
        let table = PhraseTable::extract(&texts, &options(3, 3));
        let joined: Vec<String> = table.phrases().iter().map(Phrase::joined).collect();
        assert!(joined.contains(&"wild land fire".to_string()));
        assert!(joined.contains(&"wild land".to_string()));
        assert!(!joined.iter().any(|p| p.contains("engine")));
    }

    #[test]
    fn test_merge_prefers_longest_match() {
        let texts = vec![
            doc("wild land fire"),
            doc("wild land fire"),
            doc("wild land fire"),
        ];
        let table = PhraseTable::extract(&texts, &options(3, 3));
        let merged = table.merge(&doc("the wild land fire and wild land"));
        assert_eq!(
            merged,
            vec!["the", "wild land fire", "and", "wild land"]
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_thresholds_exclude_rare_pairs() {
        let texts = vec![doc("engine fire"), doc("engine fire"), doc("gear")];
        let table = PhraseTable::extract(&texts, &options(3, 1));
        assert!(table.is_empty());
        assert_eq!(table.merge(&doc("engine fire")), doc("engine fire"));
    }

    #[test]
    fn test_serialization_rebuilds_index() {
        let texts = vec![doc("a b c"), doc("a b c"), doc("a b d")];
        let table = PhraseTable::extract(&texts, &options(2, 2));
        let json = serde_json::to_string(&table).unwrap();
        let decoded: PhraseTable = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(decoded.merge(&doc("a b c")), table.merge(&doc("a b c")));
    }
}
