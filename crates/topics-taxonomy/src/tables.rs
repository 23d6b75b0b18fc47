//! Output tables derived from trained models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use topics_models::{
    AssignedTopic, CoherenceEvaluator, CoherenceReport, DocumentDistribution, FlatTopicModel,
    HierarchicalTopicModel, ModelHandle, ModelKind, ModelSet, SoftAssignments, TopicModelView,
};
use topics_types::{AttributeId, CoherenceMeasure, DocumentId};
use tracing::instrument;

use crate::error::TaxonomyError;

/// One topic of a topic table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRow {
    /// Topic ID
    pub topic: usize,
    /// Level in the tree; 0 for flat topics
    pub level: usize,
    /// Parent topic; `None` for flat topics and the root
    pub parent: Option<usize>,
    /// Documents assigned to the topic
    pub num_docs: usize,
    /// Words above the probability threshold, most probable first
    pub words: Vec<String>,
    /// Tokens assigned to the topic
    pub total_words: usize,
    /// Number of words above the probability threshold
    pub num_words: usize,
    /// Member document with the highest probability for the topic
    pub best_document: Option<DocumentId>,
    /// Coherence of the topic, if scored
    pub coherence: Option<f64>,
    /// Member documents in corpus order
    pub documents: Vec<DocumentId>,
}

/// Every reportable topic of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTable {
    /// Attribute of the model
    pub attribute: AttributeId,
    /// Model kind
    pub kind: ModelKind,
    /// Topic rows in ID order
    pub rows: Vec<TopicRow>,
}

struct Membership {
    documents: Vec<DocumentId>,
    best_document: Option<DocumentId>,
}

/// Collect members and the best member from `(doc, weight)` pairs.
fn membership(ids: &[DocumentId], members: impl Iterator<Item = (usize, f64)>) -> Membership {
    let mut documents = Vec::new();
    let mut best: Option<(usize, f64)> = None;
    for (d, weight) in members {
        documents.push(ids[d].clone());
        if best.map_or(true, |(_, b)| weight > b) {
            best = Some((d, weight));
        }
    }
    Membership {
        documents,
        best_document: best.map(|(d, _)| ids[d].clone()),
    }
}

/// Words of `topic` whose probability exceeds `p_threshold`.
fn topic_words<M: TopicModelView + ?Sized>(
    model: &M,
    topic: usize,
    p_threshold: f64,
) -> Result<Vec<String>, TaxonomyError> {
    let dist = model.topic_word_dist(topic)?;
    let n = dist.iter().filter(|&&p| p > p_threshold).count();
    Ok(model
        .top_words(topic, n)?
        .into_iter()
        .map(|(w, _)| w)
        .collect())
}

fn flat_rows(
    model: &FlatTopicModel,
    coherence: Option<&CoherenceReport>,
    p_threshold: f64,
) -> Result<Vec<TopicRow>, TaxonomyError> {
    let num_docs = model.corpus().num_docs();
    let dists: Vec<Vec<f64>> = (0..num_docs)
        .map(|d| model.doc_topic_dist(d).unwrap_or_default())
        .collect();
    let primary: Vec<Option<usize>> = (0..num_docs).map(|d| model.primary_topic(d)).collect();

    let mut rows = Vec::with_capacity(model.num_topics());
    for topic in 0..model.num_topics() {
        let words = topic_words(model, topic, p_threshold)?;
        let members = membership(
            model.doc_ids(),
            (0..num_docs)
                .filter(|&d| primary[d] == Some(topic))
                .map(|d| (d, dists[d][topic])),
        );
        rows.push(TopicRow {
            topic,
            level: 0,
            parent: None,
            num_docs: members.documents.len(),
            num_words: words.len(),
            words,
            total_words: model.count_by_topic()[topic],
            best_document: members.best_document,
            coherence: coherence.and_then(|c| c.topic_score(topic)),
            documents: members.documents,
        });
    }
    Ok(rows)
}

fn hierarchical_rows(
    model: &HierarchicalTopicModel,
    coherence: Option<&CoherenceReport>,
    p_threshold: f64,
) -> Result<Vec<TopicRow>, TaxonomyError> {
    let num_docs = model.corpus().num_docs();
    let level_dists: Vec<Vec<f64>> = (0..num_docs)
        .map(|d| model.doc_level_dist(d).unwrap_or_default())
        .collect();

    let mut rows = Vec::new();
    for topic in model.live_topics() {
        let level = model.level(topic)?;
        let words = topic_words(model, topic, p_threshold)?;
        let members = membership(
            model.doc_ids(),
            (0..num_docs)
                .filter(|&d| model.path(d).and_then(|p| p.get(level)) == Some(&topic))
                .map(|d| (d, level_dists[d].get(level).copied().unwrap_or(0.0))),
        );
        rows.push(TopicRow {
            topic,
            level,
            parent: model.parent_topic(topic)?,
            num_docs: model.num_docs_of_topic(topic),
            num_words: words.len(),
            words,
            total_words: model.count_by_topic()[topic],
            best_document: members.best_document,
            coherence: coherence.and_then(|c| c.topic_score(topic)),
            documents: members.documents,
        });
    }
    Ok(rows)
}

/// Topic table of one model.
///
/// Flat tables list every topic; hierarchical tables list live topics only.
/// A document belongs to its most probable flat topic, or to the topics on
/// its path.
#[instrument(skip_all, fields(attribute = %model.attribute()))]
pub fn topic_table(
    model: &ModelHandle,
    coherence: Option<&CoherenceReport>,
    p_threshold: f64,
) -> Result<TopicTable, TaxonomyError> {
    let rows = match model {
        ModelHandle::Flat(m) => flat_rows(m, coherence, p_threshold)?,
        ModelHandle::Hierarchical(m) => hierarchical_rows(m, coherence, p_threshold)?,
    };
    Ok(TopicTable {
        attribute: model.attribute().clone(),
        kind: model.kind(),
        rows,
    })
}

/// Score every model of a set.
pub fn score_models(
    models: &ModelSet,
    evaluator: &CoherenceEvaluator,
) -> Result<BTreeMap<AttributeId, CoherenceReport>, TaxonomyError> {
    models
        .iter()
        .map(|(attribute, model)| Ok((attribute.clone(), evaluator.score(model)?)))
        .collect()
}

/// Aggregate coherence of one model or one of its levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceRow {
    /// Attribute of the model
    pub attribute: AttributeId,
    /// `None` for the whole model, else the level
    pub level: Option<usize>,
    /// Measure used
    pub measure: CoherenceMeasure,
    /// Average topic coherence; NaN (null in JSON) when degenerate
    pub average: f64,
    /// Standard deviation of topic coherence
    pub std_dev: f64,
    /// Topic diversity; only on whole-model rows
    pub diversity: Option<f64>,
}

/// Coherence per attribute, with one extra row per hierarchical level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceTable {
    /// Rows grouped by attribute, whole-model row first
    pub rows: Vec<CoherenceRow>,
}

impl CoherenceTable {
    /// Table of already computed reports.
    pub fn from_reports(reports: &BTreeMap<AttributeId, CoherenceReport>) -> Self {
        let mut rows = Vec::new();
        for (attribute, report) in reports {
            rows.push(CoherenceRow {
                attribute: attribute.clone(),
                level: None,
                measure: report.measure,
                average: report.average,
                std_dev: report.std_dev,
                diversity: Some(report.diversity),
            });
            rows.extend(report.levels.iter().map(|level| CoherenceRow {
                attribute: attribute.clone(),
                level: Some(level.level),
                measure: report.measure,
                average: level.average,
                std_dev: level.std_dev,
                diversity: None,
            }));
        }
        Self { rows }
    }

    /// Rows of `attribute`.
    pub fn rows_for<'a>(&'a self, attribute: &'a AttributeId) -> impl Iterator<Item = &'a CoherenceRow> {
        self.rows.iter().filter(move |r| &r.attribute == attribute)
    }
}

/// Distributions of one document under every model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTopicRow {
    /// Document ID
    pub doc_id: DocumentId,
    /// Probability vector (flat) or path (hierarchical) per attribute
    pub distributions: BTreeMap<AttributeId, DocumentDistribution>,
}

/// Per-document model output across attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTopicTable {
    /// Attributes in the table
    pub attributes: Vec<AttributeId>,
    /// One row per document, in corpus order
    pub rows: Vec<DocumentTopicRow>,
}

impl DocumentTopicTable {
    /// Build from every model of a set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumn` when the models were trained on different
    /// document lists.
    pub fn from_models(models: &ModelSet) -> Result<Self, TaxonomyError> {
        let attributes: Vec<AttributeId> = models.attributes().cloned().collect();
        let Some((_, first)) = models.iter().next() else {
            return Ok(Self {
                attributes,
                rows: Vec::new(),
            });
        };
        let doc_ids = first.doc_ids();
        if let Some((attribute, _)) = models.iter().find(|(_, m)| m.doc_ids() != doc_ids) {
            return Err(TaxonomyError::InvalidColumn {
                attribute: attribute.to_string(),
                reason: "document IDs differ from the other models".to_string(),
            });
        }

        let rows = doc_ids
            .iter()
            .enumerate()
            .map(|(d, id)| DocumentTopicRow {
                doc_id: id.clone(),
                distributions: models
                    .iter()
                    .filter_map(|(a, m)| m.document_distribution(d).map(|dist| (a.clone(), dist)))
                    .collect(),
            })
            .collect();
        Ok(Self { attributes, rows })
    }
}

/// Documents under one soft-assigned topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftTopicRow {
    /// Topic, or -1 for unassigned documents
    pub topic: AssignedTopic,
    /// Number of documents
    pub count: usize,
    /// Documents for which the topic is significant
    pub documents: Vec<DocumentId>,
}

/// Soft topic membership of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftTopicMembership {
    /// Attribute of the model
    pub attribute: AttributeId,
    /// Assignment threshold
    pub threshold: f64,
    /// Rows in topic order, unassigned first
    pub topics: Vec<SoftTopicRow>,
}

impl SoftTopicMembership {
    /// Group soft assignments by significant topic.
    pub fn new(attribute: AttributeId, assignments: &SoftAssignments) -> Self {
        let topics = assignments
            .documents_per_topic()
            .into_iter()
            .map(|(topic, documents)| SoftTopicRow {
                topic,
                count: documents.len(),
                documents,
            })
            .collect();
        Self {
            attribute,
            threshold: assignments.threshold,
            topics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat_model, hierarchical_model};
    use topics_models::ROOT;

    #[test]
    fn test_flat_topic_table() {
        let model: ModelHandle = flat_model().into();
        let report = CoherenceEvaluator::new(CoherenceMeasure::UMass, 5)
            .score(&model)
            .unwrap();
        let table = topic_table(&model, Some(&report), 0.001).unwrap();

        assert_eq!(table.kind, ModelKind::Flat);
        assert_eq!(table.rows.len(), 2);
        let docs: usize = table.rows.iter().map(|r| r.num_docs).sum();
        assert_eq!(docs, 12);
        for row in &table.rows {
            assert_eq!(row.num_docs, row.documents.len());
            assert_eq!(row.num_words, row.words.len());
            assert!(row.coherence.is_some());
            if let Some(best) = &row.best_document {
                assert!(row.documents.contains(best));
            }
        }
        assert_eq!(table.rows.iter().map(|r| r.total_words).sum::<usize>(), 84);
    }

    #[test]
    fn test_high_threshold_keeps_no_words() {
        let model: ModelHandle = flat_model().into();
        let table = topic_table(&model, None, 1.0).unwrap();
        assert!(table.rows.iter().all(|r| r.words.is_empty() && r.coherence.is_none()));
    }

    #[test]
    fn test_hierarchical_topic_table_lists_live_topics() {
        let tree = hierarchical_model();
        let live = tree.live_topics().count();
        let model: ModelHandle = tree.into();
        let table = topic_table(&model, None, 0.001).unwrap();

        assert_eq!(table.rows.len(), live);
        let root = table.rows.iter().find(|r| r.topic == ROOT).unwrap();
        assert_eq!(root.level, 0);
        assert_eq!(root.parent, None);
        assert_eq!(root.num_docs, 12);
        for row in table.rows.iter().filter(|r| r.level > 0) {
            assert!(row.parent.is_some());
            assert_eq!(row.documents.len(), row.num_docs);
        }
    }

    #[test]
    fn test_coherence_table_rows() {
        let mut models = ModelSet::new();
        models.insert(flat_model().into());
        let evaluator = CoherenceEvaluator::new(CoherenceMeasure::Npmi, 5);
        let reports = score_models(&models, &evaluator).unwrap();
        let table = CoherenceTable::from_reports(&reports);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].level, None);
        assert!(table.rows[0].diversity.is_some());

        let mut models = ModelSet::new();
        models.insert(hierarchical_model().into());
        let reports = score_models(&models, &evaluator).unwrap();
        let table = CoherenceTable::from_reports(&reports);
        let levels: Vec<Option<usize>> = table
            .rows_for(&"Narrative".into())
            .map(|r| r.level)
            .collect();
        assert_eq!(levels, vec![None, Some(1), Some(2)]);
    }

    #[test]
    fn test_document_topic_table() {
        let mut models = ModelSet::new();
        models.insert(flat_model().into());
        let table = DocumentTopicTable::from_models(&models).unwrap();
        assert_eq!(table.rows.len(), 12);
        assert_eq!(table.rows[0].doc_id, "doc0");
        match &table.rows[0].distributions[&AttributeId::from("Narrative")] {
            DocumentDistribution::Probabilities(p) => assert_eq!(p.len(), 2),
            other => panic!("unexpected distribution {other:?}"),
        }

        let empty = DocumentTopicTable::from_models(&ModelSet::new()).unwrap();
        assert!(empty.rows.is_empty());
    }

    #[test]
    fn test_soft_membership_collects_unassigned() {
        let model = flat_model();
        let assignments = SoftAssignments::for_model(&model, 0.999);
        let membership = SoftTopicMembership::new(model.attribute().clone(), &assignments);
        assert_eq!(membership.topics[0].topic, AssignedTopic::Unassigned);
        let total: usize = membership.topics.iter().map(|t| t.count).sum();
        assert!(total >= 12);
    }
}
