//! Tagged model handle and the query capabilities shared by every model.

use serde::{Deserialize, Serialize};
use topics_types::{AttributeId, DocumentId};

use crate::encoding::EncodedCorpus;
use crate::error::ModelError;
use crate::flat::FlatTopicModel;
use crate::hierarchical::HierarchicalTopicModel;

/// Kind of topic model behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Flat LDA
    Flat,
    /// Tree-structured hLDA
    Hierarchical,
}

impl ModelKind {
    /// File-name tag used when persisting.
    pub fn tag(&self) -> &'static str {
        match self {
            ModelKind::Flat => "lda",
            ModelKind::Hierarchical => "hlda",
        }
    }
}

/// Per-document output of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentDistribution {
    /// Topic probability vector of a flat model
    Probabilities(Vec<f64>),
    /// Root-to-leaf topic path of a hierarchical model
    Path(Vec<usize>),
}

/// Read-only queries every trained topic model answers.
///
/// Evaluators, table builders and the taxonomy builder take models through
/// this trait and never mutate them.
pub trait TopicModelView {
    /// Attribute the model was trained on.
    fn attribute(&self) -> &AttributeId;

    /// Model kind.
    fn kind(&self) -> ModelKind;

    /// Encoded training documents.
    fn corpus(&self) -> &EncodedCorpus;

    /// Number of addressable topic IDs.
    fn topic_slots(&self) -> usize;

    /// Levels in the model; 1 for a flat model.
    fn depth(&self) -> usize;

    /// Level of `topic`; always 0 for a flat model.
    fn topic_level(&self, topic: usize) -> usize;

    /// Whether `topic` takes part in aggregate reporting.
    fn is_reportable(&self, topic: usize) -> bool;

    /// Word distribution of `topic`.
    fn topic_word_dist(&self, topic: usize) -> Result<Vec<f64>, ModelError>;

    /// The `n` most probable words of `topic`.
    fn top_words(&self, topic: usize, n: usize) -> Result<Vec<(String, f64)>, ModelError>;

    /// Tokens assigned to each topic slot.
    fn count_by_topic(&self) -> &[usize];

    /// Documents assigned to `topic`.
    fn num_docs_of_topic(&self, topic: usize) -> usize;

    /// Distribution vector or path of `doc`.
    fn document_distribution(&self, doc: usize) -> Option<DocumentDistribution>;

    /// Log-likelihood per word.
    fn ll_per_word(&self) -> f64;

    /// Document IDs in row order.
    fn doc_ids(&self) -> &[DocumentId] {
        self.corpus().doc_ids()
    }

    /// Reportable topics in ID order.
    fn reportable_topics(&self) -> Vec<usize> {
        (0..self.topic_slots())
            .filter(|&t| self.is_reportable(t))
            .collect()
    }
}

impl TopicModelView for FlatTopicModel {
    fn attribute(&self) -> &AttributeId {
        FlatTopicModel::attribute(self)
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Flat
    }

    fn corpus(&self) -> &EncodedCorpus {
        FlatTopicModel::corpus(self)
    }

    fn topic_slots(&self) -> usize {
        self.num_topics()
    }

    fn depth(&self) -> usize {
        1
    }

    fn topic_level(&self, _topic: usize) -> usize {
        0
    }

    fn is_reportable(&self, topic: usize) -> bool {
        self.count_by_topic().get(topic).is_some_and(|&n| n > 0)
    }

    fn topic_word_dist(&self, topic: usize) -> Result<Vec<f64>, ModelError> {
        FlatTopicModel::topic_word_dist(self, topic)
    }

    fn top_words(&self, topic: usize, n: usize) -> Result<Vec<(String, f64)>, ModelError> {
        FlatTopicModel::top_words(self, topic, n)
    }

    fn count_by_topic(&self) -> &[usize] {
        FlatTopicModel::count_by_topic(self)
    }

    fn num_docs_of_topic(&self, topic: usize) -> usize {
        FlatTopicModel::num_docs_of_topic(self, topic)
    }

    fn document_distribution(&self, doc: usize) -> Option<DocumentDistribution> {
        self.doc_topic_dist(doc).map(DocumentDistribution::Probabilities)
    }

    fn ll_per_word(&self) -> f64 {
        FlatTopicModel::ll_per_word(self)
    }
}

impl TopicModelView for HierarchicalTopicModel {
    fn attribute(&self) -> &AttributeId {
        HierarchicalTopicModel::attribute(self)
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Hierarchical
    }

    fn corpus(&self) -> &EncodedCorpus {
        HierarchicalTopicModel::corpus(self)
    }

    fn topic_slots(&self) -> usize {
        self.num_topic_slots()
    }

    fn depth(&self) -> usize {
        HierarchicalTopicModel::depth(self)
    }

    fn topic_level(&self, topic: usize) -> usize {
        self.level(topic).unwrap_or(0)
    }

    fn is_reportable(&self, topic: usize) -> bool {
        self.is_live(topic)
    }

    fn topic_word_dist(&self, topic: usize) -> Result<Vec<f64>, ModelError> {
        HierarchicalTopicModel::topic_word_dist(self, topic)
    }

    fn top_words(&self, topic: usize, n: usize) -> Result<Vec<(String, f64)>, ModelError> {
        HierarchicalTopicModel::top_words(self, topic, n)
    }

    fn count_by_topic(&self) -> &[usize] {
        HierarchicalTopicModel::count_by_topic(self)
    }

    fn num_docs_of_topic(&self, topic: usize) -> usize {
        HierarchicalTopicModel::num_docs_of_topic(self, topic)
    }

    fn document_distribution(&self, doc: usize) -> Option<DocumentDistribution> {
        self.path(doc)
            .map(|p| DocumentDistribution::Path(p.to_vec()))
    }

    fn ll_per_word(&self) -> f64 {
        HierarchicalTopicModel::ll_per_word(self)
    }
}

/// A trained model of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelHandle {
    /// Flat model
    Flat(FlatTopicModel),
    /// Hierarchical model
    Hierarchical(HierarchicalTopicModel),
}

impl ModelHandle {
    /// The model as a trait object.
    pub fn view(&self) -> &dyn TopicModelView {
        match self {
            ModelHandle::Flat(m) => m,
            ModelHandle::Hierarchical(m) => m,
        }
    }

    /// Flat model, if this is one.
    pub fn as_flat(&self) -> Option<&FlatTopicModel> {
        match self {
            ModelHandle::Flat(m) => Some(m),
            ModelHandle::Hierarchical(_) => None,
        }
    }

    /// Hierarchical model, if this is one.
    pub fn as_hierarchical(&self) -> Option<&HierarchicalTopicModel> {
        match self {
            ModelHandle::Hierarchical(m) => Some(m),
            ModelHandle::Flat(_) => None,
        }
    }
}

impl From<FlatTopicModel> for ModelHandle {
    fn from(model: FlatTopicModel) -> Self {
        ModelHandle::Flat(model)
    }
}

impl From<HierarchicalTopicModel> for ModelHandle {
    fn from(model: HierarchicalTopicModel) -> Self {
        ModelHandle::Hierarchical(model)
    }
}

impl TopicModelView for ModelHandle {
    fn attribute(&self) -> &AttributeId {
        self.view().attribute()
    }

    fn kind(&self) -> ModelKind {
        self.view().kind()
    }

    fn corpus(&self) -> &EncodedCorpus {
        self.view().corpus()
    }

    fn topic_slots(&self) -> usize {
        self.view().topic_slots()
    }

    fn depth(&self) -> usize {
        self.view().depth()
    }

    fn topic_level(&self, topic: usize) -> usize {
        self.view().topic_level(topic)
    }

    fn is_reportable(&self, topic: usize) -> bool {
        self.view().is_reportable(topic)
    }

    fn topic_word_dist(&self, topic: usize) -> Result<Vec<f64>, ModelError> {
        self.view().topic_word_dist(topic)
    }

    fn top_words(&self, topic: usize, n: usize) -> Result<Vec<(String, f64)>, ModelError> {
        self.view().top_words(topic, n)
    }

    fn count_by_topic(&self) -> &[usize] {
        self.view().count_by_topic()
    }

    fn num_docs_of_topic(&self, topic: usize) -> usize {
        self.view().num_docs_of_topic(topic)
    }

    fn document_distribution(&self, doc: usize) -> Option<DocumentDistribution> {
        self.view().document_distribution(doc)
    }

    fn ll_per_word(&self) -> f64 {
        self.view().ll_per_word()
    }
}
