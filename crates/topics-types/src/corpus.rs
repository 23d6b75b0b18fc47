//! Tokenized corpus types.
//!
//! A corpus holds one token sequence per document per attribute. Every
//! attribute is aligned 1:1 with the corpus document ID list, so the same
//! row index addresses the same document in every attribute.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Identifier of a document, unique within a corpus.
pub type DocumentId = String;

/// Identifier of a text attribute (a column of the source data set).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeId(String);

impl AttributeId {
    /// Create a new attribute identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Attribute name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AttributeId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for AttributeId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire form of a corpus, validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCorpus {
    doc_ids: Vec<DocumentId>,
    #[serde(default)]
    attributes: BTreeMap<AttributeId, Vec<Vec<String>>>,
}

/// Documents tokenized per attribute.
///
/// The corpus is read-only once built and may be shared across threads
/// training different attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCorpus", into = "RawCorpus")]
pub struct Corpus {
    doc_ids: Vec<DocumentId>,
    attributes: BTreeMap<AttributeId, Vec<Vec<String>>>,
}

impl Corpus {
    /// Start building a corpus over the given document IDs.
    pub fn builder(doc_ids: Vec<DocumentId>) -> CorpusBuilder {
        CorpusBuilder {
            doc_ids,
            attributes: Vec::new(),
        }
    }

    /// Parse a corpus from its JSON form.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TypesError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    /// True when the corpus has no documents.
    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Document IDs in row order.
    pub fn doc_ids(&self) -> &[DocumentId] {
        &self.doc_ids
    }

    /// Attribute identifiers in sorted order.
    pub fn attribute_ids(&self) -> impl Iterator<Item = &AttributeId> {
        self.attributes.keys()
    }

    /// Borrow one attribute slice of the corpus.
    pub fn attribute(&self, attribute: &AttributeId) -> Result<AttributeCorpus<'_>, TypesError> {
        let (id, texts) = self
            .attributes
            .get_key_value(attribute)
            .ok_or_else(|| TypesError::UnknownAttribute(attribute.to_string()))?;
        Ok(AttributeCorpus {
            attribute: id,
            doc_ids: &self.doc_ids,
            texts,
        })
    }

    /// Borrow every attribute slice.
    pub fn attributes(&self) -> impl Iterator<Item = AttributeCorpus<'_>> {
        self.attributes.iter().map(|(id, texts)| AttributeCorpus {
            attribute: id,
            doc_ids: &self.doc_ids,
            texts,
        })
    }
}

impl TryFrom<RawCorpus> for Corpus {
    type Error = TypesError;

    fn try_from(raw: RawCorpus) -> Result<Self, Self::Error> {
        let mut builder = Corpus::builder(raw.doc_ids);
        for (id, texts) in raw.attributes {
            builder = builder.attribute(id, texts);
        }
        builder.build()
    }
}

impl From<Corpus> for RawCorpus {
    fn from(corpus: Corpus) -> Self {
        Self {
            doc_ids: corpus.doc_ids,
            attributes: corpus.attributes,
        }
    }
}

/// Builder validating row alignment and ID uniqueness.
#[derive(Debug, Clone)]
pub struct CorpusBuilder {
    doc_ids: Vec<DocumentId>,
    attributes: Vec<(AttributeId, Vec<Vec<String>>)>,
}

impl CorpusBuilder {
    /// Add an attribute with one token sequence per document.
    pub fn attribute(mut self, id: impl Into<AttributeId>, texts: Vec<Vec<String>>) -> Self {
        self.attributes.push((id.into(), texts));
        self
    }

    /// Validate and build the corpus.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a document ID repeats, an attribute is
    /// declared twice, or an attribute's row count differs from the number
    /// of document IDs.
    pub fn build(self) -> Result<Corpus, TypesError> {
        let mut seen = HashSet::with_capacity(self.doc_ids.len());
        for id in &self.doc_ids {
            if !seen.insert(id.as_str()) {
                return Err(TypesError::InvalidInput(format!(
                    "duplicate document ID: {id}"
                )));
            }
        }

        let mut attributes = BTreeMap::new();
        for (id, texts) in self.attributes {
            if texts.len() != self.doc_ids.len() {
                return Err(TypesError::InvalidInput(format!(
                    "attribute {id} has {} rows, expected {}",
                    texts.len(),
                    self.doc_ids.len()
                )));
            }
            if attributes.insert(id.clone(), texts).is_some() {
                return Err(TypesError::InvalidInput(format!(
                    "attribute {id} declared twice"
                )));
            }
        }

        Ok(Corpus {
            doc_ids: self.doc_ids,
            attributes,
        })
    }
}

/// Read-only view of a single attribute of a corpus.
#[derive(Debug, Clone, Copy)]
pub struct AttributeCorpus<'a> {
    attribute: &'a AttributeId,
    doc_ids: &'a [DocumentId],
    texts: &'a [Vec<String>],
}

impl<'a> AttributeCorpus<'a> {
    /// Attribute this slice belongs to.
    pub fn attribute(&self) -> &'a AttributeId {
        self.attribute
    }

    /// Document IDs in row order.
    pub fn doc_ids(&self) -> &'a [DocumentId] {
        self.doc_ids
    }

    /// Token sequences in row order.
    pub fn texts(&self) -> &'a [Vec<String>] {
        self.texts
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// True when the slice has no documents.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Total token count over all documents.
    pub fn token_count(&self) -> usize {
        self.texts.iter().map(Vec::len).sum()
    }

    /// Fail fast if the slice cannot be trained on.
    ///
    /// # Errors
    ///
    /// Returns `EmptyCorpus` when there are no documents or no tokens.
    pub fn ensure_trainable(&self) -> Result<(), TypesError> {
        if self.is_empty() {
            return Err(TypesError::EmptyCorpus(format!(
                "attribute {} has no documents",
                self.attribute
            )));
        }
        if self.token_count() == 0 {
            return Err(TypesError::EmptyCorpus(format!(
                "attribute {} has an empty vocabulary",
                self.attribute
            )));
        }
        Ok(())
    }
}
