//! Integer encoding of one attribute's documents.

use serde::{Deserialize, Serialize};
use topics_types::{AttributeCorpus, AttributeId, DocumentId, TermWeight, Vocabulary};

use crate::error::ModelError;
use crate::ngrams::PhraseTable;

/// Wire form of an encoded corpus; term weights are derived on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEncodedCorpus {
    attribute: AttributeId,
    doc_ids: Vec<DocumentId>,
    vocab: Vocabulary,
    phrases: PhraseTable,
    term_weight: TermWeight,
    docs: Vec<Vec<u32>>,
}

/// Documents of one attribute as word indices into a fixed vocabulary.
///
/// The phrase table used to merge collocations travels with the encoding,
/// so the same merge can be replayed against the source corpus when a
/// persisted model is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEncodedCorpus", into = "RawEncodedCorpus")]
pub struct EncodedCorpus {
    attribute: AttributeId,
    doc_ids: Vec<DocumentId>,
    vocab: Vocabulary,
    phrases: PhraseTable,
    term_weight: TermWeight,
    docs: Vec<Vec<u32>>,
    weights: Vec<f64>,
    token_count: usize,
}

impl EncodedCorpus {
    /// Merge collocations and encode every document of `corpus`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyCorpus` when the attribute has no documents or no tokens.
    pub fn encode(
        corpus: AttributeCorpus<'_>,
        phrases: PhraseTable,
        term_weight: TermWeight,
    ) -> Result<Self, ModelError> {
        corpus.ensure_trainable()?;

        let mut vocab = Vocabulary::new();
        let docs = corpus
            .texts()
            .iter()
            .map(|text| {
                phrases
                    .merge(text)
                    .iter()
                    .map(|token| vocab.intern(token))
                    .collect()
            })
            .collect();

        Ok(Self::assemble(
            corpus.attribute().clone(),
            corpus.doc_ids().to_vec(),
            vocab,
            phrases,
            term_weight,
            docs,
        ))
    }

    fn assemble(
        attribute: AttributeId,
        doc_ids: Vec<DocumentId>,
        vocab: Vocabulary,
        phrases: PhraseTable,
        term_weight: TermWeight,
        docs: Vec<Vec<u32>>,
    ) -> Self {
        let weights = term_weights(&docs, vocab.len(), term_weight);
        let token_count = docs.iter().map(Vec::len).sum();
        Self {
            attribute,
            doc_ids,
            vocab,
            phrases,
            term_weight,
            docs,
            weights,
            token_count,
        }
    }

    /// Check that this encoding was produced from `corpus`.
    ///
    /// Replays the phrase merge and compares document IDs and every token.
    ///
    /// # Errors
    ///
    /// Returns `Inconsistent` describing the first mismatch found.
    pub fn verify_against(&self, corpus: AttributeCorpus<'_>) -> Result<(), ModelError> {
        let mismatch = |reason: String| ModelError::Inconsistent {
            attribute: self.attribute.to_string(),
            reason,
        };

        if corpus.attribute() != &self.attribute {
            return Err(mismatch(format!(
                "corpus attribute is {}",
                corpus.attribute()
            )));
        }
        if corpus.len() != self.docs.len() {
            return Err(mismatch(format!(
                "model has {} documents, corpus has {}",
                self.docs.len(),
                corpus.len()
            )));
        }
        if let Some(row) = corpus
            .doc_ids()
            .iter()
            .zip(&self.doc_ids)
            .position(|(a, b)| a != b)
        {
            return Err(mismatch(format!(
                "document ID at row {row} differs ({} vs {})",
                self.doc_ids[row],
                corpus.doc_ids()[row]
            )));
        }
        for (row, (text, encoded)) in corpus.texts().iter().zip(&self.docs).enumerate() {
            let merged = self.phrases.merge(text);
            let same = merged.len() == encoded.len()
                && merged
                    .iter()
                    .zip(encoded)
                    .all(|(token, &id)| self.vocab.word(id) == Some(token.as_str()));
            if !same {
                return Err(mismatch(format!(
                    "tokens of document {} differ from the model vocabulary",
                    self.doc_ids[row]
                )));
            }
        }
        Ok(())
    }

    /// Attribute the documents belong to.
    pub fn attribute(&self) -> &AttributeId {
        &self.attribute
    }

    /// Document IDs in row order.
    pub fn doc_ids(&self) -> &[DocumentId] {
        &self.doc_ids
    }

    /// Vocabulary after collocation merging.
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Collocations merged before encoding.
    pub fn phrases(&self) -> &PhraseTable {
        &self.phrases
    }

    /// Term weighting scheme.
    pub fn term_weight(&self) -> TermWeight {
        self.term_weight
    }

    /// Encoded documents.
    pub fn docs(&self) -> &[Vec<u32>] {
        &self.docs
    }

    /// Number of documents.
    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    /// Vocabulary size.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Total token count.
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Count contribution of one occurrence of `word`.
    pub fn weight(&self, word: u32) -> f64 {
        self.weights.get(word as usize).copied().unwrap_or(0.0)
    }

    /// Words of document `doc` as strings.
    pub fn doc_words(&self, doc: usize) -> Vec<&str> {
        self.docs
            .get(doc)
            .map(|d| d.iter().filter_map(|&w| self.vocab.word(w)).collect())
            .unwrap_or_default()
    }
}

impl TryFrom<RawEncodedCorpus> for EncodedCorpus {
    type Error = ModelError;

    fn try_from(raw: RawEncodedCorpus) -> Result<Self, Self::Error> {
        if raw.doc_ids.len() != raw.docs.len() {
            return Err(ModelError::Inconsistent {
                attribute: raw.attribute.to_string(),
                reason: format!(
                    "{} document IDs for {} documents",
                    raw.doc_ids.len(),
                    raw.docs.len()
                ),
            });
        }
        let vocab_size = raw.vocab.len() as u32;
        if raw.docs.iter().flatten().any(|&w| w >= vocab_size) {
            return Err(ModelError::Inconsistent {
                attribute: raw.attribute.to_string(),
                reason: "word index outside the vocabulary".to_string(),
            });
        }
        Ok(Self::assemble(
            raw.attribute,
            raw.doc_ids,
            raw.vocab,
            raw.phrases,
            raw.term_weight,
            raw.docs,
        ))
    }
}

impl From<EncodedCorpus> for RawEncodedCorpus {
    fn from(corpus: EncodedCorpus) -> Self {
        Self {
            attribute: corpus.attribute,
            doc_ids: corpus.doc_ids,
            vocab: corpus.vocab,
            phrases: corpus.phrases,
            term_weight: corpus.term_weight,
            docs: corpus.docs,
        }
    }
}

/// Per-word token weights.
///
/// IDF weight = ln(N / df) where N = document count and df = number of
/// documents containing the word.
fn term_weights(docs: &[Vec<u32>], vocab_size: usize, scheme: TermWeight) -> Vec<f64> {
    match scheme {
        TermWeight::One => vec![1.0; vocab_size],
        TermWeight::Idf => {
            let mut df = vec![0usize; vocab_size];
            let mut last_doc = vec![usize::MAX; vocab_size];
            for (d, doc) in docs.iter().enumerate() {
                for &w in doc {
                    let w = w as usize;
                    if last_doc[w] != d {
                        last_doc[w] = d;
                        df[w] += 1;
                    }
                }
            }
            let n = docs.len() as f64;
            df.into_iter()
                .map(|df| if df == 0 { 0.0 } else { (n / df as f64).ln() })
                .collect()
        }
    }
}
