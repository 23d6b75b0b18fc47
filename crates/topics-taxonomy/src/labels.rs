//! Per-document label columns.
//!
//! A column maps document IDs to the label string of the topic each
//! document is assigned to under one attribute (or one hierarchical level of
//! an attribute). Labels are either the topic's top words or the automatic
//! labels of the topic, always joined with [`LABEL_DELIMITER`] in rank order,
//! so two documents on the same topic get byte-identical strings.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use topics_models::{
    AssignedTopic, FlatTopicModel, HierarchicalTopicModel, ModelHandle, ModelKind, ModelSet,
    SoftAssignments, TopicLabels, TopicModelView,
};
use topics_types::{AttributeId, DocumentId};
use tracing::warn;

use crate::error::TaxonomyError;

/// Separator between words of one label.
pub const LABEL_DELIMITER: &str = ", ";

/// Label of documents without a significant topic.
pub const UNASSIGNED_LABEL: &str = "unassigned";

/// Prefix of the word label of a topic that holds no tokens.
pub const EMPTY_TOPIC_PREFIX: &str = "empty topic";

/// Word label of a topic without tokens, unique per topic ID.
pub fn empty_topic_label(topic: usize) -> String {
    format!("{EMPTY_TOPIC_PREFIX} {topic}")
}

/// Where label strings come from.
#[derive(Debug, Clone, Copy)]
pub enum Labeling<'a> {
    /// The topic's most probable words: `num_words` of them, capped by the
    /// token count for flat topics; topics without tokens get
    /// [`empty_topic_label`]
    Words {
        /// Word cap per label
        num_words: usize,
    },
    /// Automatic labels per attribute; topics without labels are missing
    Labels(&'a BTreeMap<AttributeId, TopicLabels>),
}

impl Labeling<'_> {
    /// Label string of `topic`, or `None` when no label exists.
    pub fn topic_label<M: TopicModelView + ?Sized>(
        &self,
        model: &M,
        topic: usize,
    ) -> Result<Option<String>, TaxonomyError> {
        match self {
            Labeling::Words { num_words } => {
                let available = model.count_by_topic().get(topic).copied().unwrap_or(0);
                if available == 0 {
                    return Ok(Some(empty_topic_label(topic)));
                }
                let n = match model.kind() {
                    ModelKind::Flat => (*num_words).min(available),
                    ModelKind::Hierarchical => *num_words,
                };
                let words = model.top_words(topic, n)?;
                let words: Vec<String> = words.into_iter().map(|(w, _)| w).collect();
                Ok(Some(words.join(LABEL_DELIMITER)))
            }
            Labeling::Labels(labels) => Ok(labels
                .get(model.attribute())
                .and_then(|l| l.labels(topic))
                .filter(|l| !l.is_empty())
                .map(|l| l.join(LABEL_DELIMITER))),
        }
    }
}

/// One label column of a taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelColumn {
    /// Column header: the attribute, or `"<attribute> Level <n>"`
    pub name: String,
    /// Attribute the labels come from
    pub attribute: AttributeId,
    /// Hierarchical level, if the column is one level of a tree
    pub level: Option<usize>,
    /// Label per document; documents without a label are absent
    pub labels: BTreeMap<DocumentId, String>,
}

impl LabelColumn {
    /// Empty column.
    pub fn new(name: impl Into<String>, attribute: AttributeId, level: Option<usize>) -> Self {
        Self {
            name: name.into(),
            attribute,
            level,
            labels: BTreeMap::new(),
        }
    }

    /// Label of `doc`.
    pub fn label(&self, doc: &str) -> Option<&str> {
        self.labels.get(doc).map(String::as_str)
    }
}

/// Header of one hierarchical level column.
pub fn level_column_name(attribute: &AttributeId, level: usize) -> String {
    format!("{attribute} Level {level}")
}

/// Labels cached per topic while filling a column.
struct TopicLabelCache<'m, M: ?Sized> {
    model: &'m M,
    labeling: Labeling<'m>,
    cache: HashMap<usize, Option<String>>,
}

impl<'m, M: TopicModelView + ?Sized> TopicLabelCache<'m, M> {
    fn new(model: &'m M, labeling: Labeling<'m>) -> Self {
        Self {
            model,
            labeling,
            cache: HashMap::new(),
        }
    }

    fn get(&mut self, topic: usize) -> Result<Option<String>, TaxonomyError> {
        if let Some(label) = self.cache.get(&topic) {
            return Ok(label.clone());
        }
        let label = self.labeling.topic_label(self.model, topic)?;
        self.cache.insert(topic, label.clone());
        Ok(label)
    }
}

/// Column of each document's most probable topic.
pub fn flat_column(
    model: &FlatTopicModel,
    labeling: Labeling<'_>,
) -> Result<LabelColumn, TaxonomyError> {
    let mut column = LabelColumn::new(model.attribute().as_str(), model.attribute().clone(), None);
    let mut cache = TopicLabelCache::new(model, labeling);
    for (d, id) in model.doc_ids().iter().enumerate() {
        let Some(topic) = model.primary_topic(d) else {
            continue;
        };
        if let Some(label) = cache.get(topic)? {
            column.labels.insert(id.clone(), label);
        }
    }
    Ok(column)
}

/// Column of each document's primary soft assignment.
///
/// Documents whose probabilities never cleared the threshold get
/// [`UNASSIGNED_LABEL`].
pub fn soft_column(
    model: &FlatTopicModel,
    assignments: &SoftAssignments,
    labeling: Labeling<'_>,
) -> Result<LabelColumn, TaxonomyError> {
    let mut column = LabelColumn::new(model.attribute().as_str(), model.attribute().clone(), None);
    let mut cache = TopicLabelCache::new(model, labeling);
    for (id, assignment) in assignments.doc_ids.iter().zip(&assignments.assignments) {
        let label = match assignment.primary {
            AssignedTopic::Unassigned => Some(UNASSIGNED_LABEL.to_string()),
            AssignedTopic::Topic(t) => cache.get(t)?,
        };
        if let Some(label) = label {
            column.labels.insert(id.clone(), label);
        }
    }
    Ok(column)
}

/// Column of the path topic at `level` of every document.
///
/// # Errors
///
/// Returns `InvalidLevel` unless `1 <= level < depth`.
pub fn hierarchical_level_column(
    model: &HierarchicalTopicModel,
    level: usize,
    labeling: Labeling<'_>,
) -> Result<LabelColumn, TaxonomyError> {
    if level == 0 || level >= model.depth() {
        return Err(TaxonomyError::InvalidLevel {
            attribute: model.attribute().to_string(),
            level,
            depth: model.depth(),
        });
    }
    let mut column = LabelColumn::new(
        level_column_name(model.attribute(), level),
        model.attribute().clone(),
        Some(level),
    );
    let mut cache = TopicLabelCache::new(model, labeling);
    for (d, id) in model.doc_ids().iter().enumerate() {
        let Some(&topic) = model.path(d).and_then(|p| p.get(level)) else {
            continue;
        };
        if let Some(label) = cache.get(topic)? {
            column.labels.insert(id.clone(), label);
        }
    }
    Ok(column)
}

/// One column per non-root level, shallowest first.
pub fn hierarchical_columns(
    model: &HierarchicalTopicModel,
    labeling: Labeling<'_>,
) -> Result<Vec<LabelColumn>, TaxonomyError> {
    (1..model.depth())
        .map(|level| hierarchical_level_column(model, level, labeling))
        .collect()
}

/// Every label column of one model.
pub fn model_columns(
    model: &ModelHandle,
    labeling: Labeling<'_>,
) -> Result<Vec<LabelColumn>, TaxonomyError> {
    match model {
        ModelHandle::Flat(m) => Ok(vec![flat_column(m, labeling)?]),
        ModelHandle::Hierarchical(m) => hierarchical_columns(m, labeling),
    }
}

/// A requested column of a mixed taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSpec {
    /// Every column of the attribute's model
    Attribute(AttributeId),
    /// One level of the attribute's hierarchical model
    Level(AttributeId, usize),
}

impl ColumnSpec {
    fn attribute(&self) -> &AttributeId {
        match self {
            ColumnSpec::Attribute(a) | ColumnSpec::Level(a, _) => a,
        }
    }
}

/// Columns of a curated mix of attributes and levels, in request order.
///
/// An attribute without a model yields an empty column, so every document
/// is left out of the taxonomy with a warning rather than failing.
///
/// # Errors
///
/// Returns `InvalidColumn` when a level is requested from a flat model and
/// `InvalidLevel` when the level does not exist.
pub fn mixed_columns(
    models: &ModelSet,
    specs: &[ColumnSpec],
    labeling: Labeling<'_>,
) -> Result<Vec<LabelColumn>, TaxonomyError> {
    let mut columns = Vec::new();
    for spec in specs {
        let attribute = spec.attribute();
        let Some(model) = models.get(attribute) else {
            warn!(attribute = %attribute, "No model for taxonomy column, its documents are excluded");
            let (name, level) = match spec {
                ColumnSpec::Attribute(a) => (a.to_string(), None),
                ColumnSpec::Level(a, l) => (level_column_name(a, *l), Some(*l)),
            };
            columns.push(LabelColumn::new(name, attribute.clone(), level));
            continue;
        };
        match (spec, model) {
            (ColumnSpec::Attribute(_), model) => columns.extend(model_columns(model, labeling)?),
            (ColumnSpec::Level(_, level), ModelHandle::Hierarchical(m)) => {
                columns.push(hierarchical_level_column(m, *level, labeling)?);
            }
            (ColumnSpec::Level(_, level), ModelHandle::Flat(_)) => {
                return Err(TaxonomyError::InvalidColumn {
                    attribute: attribute.to_string(),
                    reason: format!("level {level} requested from a flat model"),
                });
            }
        }
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TaxonomyBuilder;
    use crate::test_support::{
        flat_model, hierarchical_model, hierarchical_model_for, hierarchical_model_with_empty_leaves,
    };
    use topics_models::{SoftAssignments, TopicLabeler};

    #[test]
    fn test_flat_column_labels_every_document() {
        let model = flat_model();
        let column = flat_column(&model, Labeling::Words { num_words: 3 }).unwrap();
        assert_eq!(column.name, "Narrative");
        assert_eq!(column.level, None);
        assert_eq!(column.labels.len(), 12);

        let even = column.label("doc0").unwrap();
        assert_eq!(even.split(LABEL_DELIMITER).count(), 3);
        assert_eq!(column.label("doc2"), Some(even));
        assert_ne!(column.label("doc1"), Some(even));
    }

    #[test]
    fn test_words_capped_by_topic_size() {
        let model = flat_model();
        let column = flat_column(&model, Labeling::Words { num_words: 500 }).unwrap();
        let label = column.label("doc0").unwrap();
        assert!(label.split(LABEL_DELIMITER).count() <= model.corpus().vocab_size());
    }

    #[test]
    fn test_hierarchical_columns_per_level() {
        let model = hierarchical_model();
        let columns = hierarchical_columns(&model, Labeling::Words { num_words: 2 }).unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Narrative Level 1", "Narrative Level 2"]);
        assert!(columns.iter().all(|c| c.labels.len() == 12));

        assert!(matches!(
            hierarchical_level_column(&model, 0, Labeling::Words { num_words: 2 }),
            Err(TaxonomyError::InvalidLevel { level: 0, .. })
        ));
        assert!(hierarchical_level_column(&model, 3, Labeling::Words { num_words: 2 }).is_err());
    }

    #[test]
    fn test_soft_column_marks_unassigned() {
        let model = flat_model();
        let assignments = SoftAssignments::for_model(&model, 0.999);
        let column = soft_column(&model, &assignments, Labeling::Words { num_words: 3 }).unwrap();
        assert_eq!(column.labels.len(), 12);
        assert!(column.labels.values().any(|l| l == UNASSIGNED_LABEL));
    }

    #[test]
    fn test_automatic_labels_replace_words() {
        let model = flat_model();
        let labels = TopicLabeler::default().label_topics(&model).unwrap();
        let by_attribute = BTreeMap::from([(model.attribute().clone(), labels.clone())]);
        let column = flat_column(&model, Labeling::Labels(&by_attribute)).unwrap();

        let topic = model.primary_topic(0).unwrap();
        assert_eq!(column.label("doc0"), labels.label(topic).as_deref());

        let empty = BTreeMap::new();
        let column = flat_column(&model, Labeling::Labels(&empty)).unwrap();
        assert!(column.labels.is_empty());
    }

    #[test]
    fn test_mixed_columns_in_request_order() {
        let mut models = ModelSet::new();
        models.insert(flat_model().into());
        models.insert(hierarchical_model_for("Cause").into());

        let specs = vec![
            ColumnSpec::Level("Cause".into(), 1),
            ColumnSpec::Attribute("Narrative".into()),
            ColumnSpec::Attribute("Missing".into()),
        ];
        let columns = mixed_columns(&models, &specs, Labeling::Words { num_words: 2 }).unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Cause Level 1", "Narrative", "Missing"]);
        assert!(columns[2].labels.is_empty());

        let bad = [ColumnSpec::Level("Narrative".into(), 1)];
        assert!(matches!(
            mixed_columns(&models, &bad, Labeling::Words { num_words: 2 }),
            Err(TaxonomyError::InvalidColumn { .. })
        ));
    }

    #[test]
    fn test_live_topic_without_tokens_gets_own_label() {
        let model = hierarchical_model_with_empty_leaves();
        for leaf in [4, 5, 6] {
            assert!(model.is_live(leaf));
            assert_eq!(model.count_by_topic()[leaf], 0);
        }

        let labeling = Labeling::Words { num_words: 10 };
        let column = hierarchical_level_column(&model, 2, labeling).unwrap();
        assert_eq!(column.labels.len(), 12);
        assert!(column.labels.values().all(|l| !l.is_empty()));
        assert_eq!(column.label("doc2"), Some(empty_topic_label(4).as_str()));
        assert_eq!(column.label("doc1"), Some("empty topic 5"));
        assert!(column.label("doc0").unwrap().contains("engine"));

        let table = TaxonomyBuilder::new(model.doc_ids())
            .columns(hierarchical_columns(&model, labeling).unwrap())
            .level_view(2)
            .unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.excluded.is_empty());
        assert_ne!(table.row_of("doc1"), table.row_of("doc3"));
        assert_eq!(table.row_of("doc1").unwrap().count, 3);
    }
}
