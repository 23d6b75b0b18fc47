//! Probability-thresholded (soft) topic assignment.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use topics_types::DocumentId;

use crate::flat::FlatTopicModel;
use crate::math::argmax;

/// A topic ID or the unassigned sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssignedTopic {
    /// No topic cleared the threshold (reported as -1)
    Unassigned,
    /// A topic ID
    Topic(usize),
}

impl AssignedTopic {
    /// Numeric form: the topic ID, or -1 when unassigned.
    pub fn as_index(&self) -> i64 {
        match self {
            AssignedTopic::Unassigned => -1,
            AssignedTopic::Topic(t) => *t as i64,
        }
    }

    /// Topic ID, if assigned.
    pub fn topic(&self) -> Option<usize> {
        match self {
            AssignedTopic::Unassigned => None,
            AssignedTopic::Topic(t) => Some(*t),
        }
    }
}

impl fmt::Display for AssignedTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_index())
    }
}

impl Serialize for AssignedTopic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_index())
    }
}

impl<'de> Deserialize<'de> for AssignedTopic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        match value {
            -1 => Ok(AssignedTopic::Unassigned),
            v if v >= 0 => Ok(AssignedTopic::Topic(v as usize)),
            v => Err(serde::de::Error::custom(format!("invalid topic index {v}"))),
        }
    }
}

/// Soft assignment of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAssignment {
    /// Row of the document
    pub doc_index: usize,
    /// Most probable topic, or unassigned
    pub primary: AssignedTopic,
    /// Every topic whose probability exceeds the threshold
    pub significant: Vec<AssignedTopic>,
}

/// Assign a document from its topic probability vector.
///
/// The primary topic is the argmax unless the maximum is at or below
/// `threshold`, in which case both fields are unassigned. Significant
/// topics are those strictly above `threshold`, falling back to the
/// primary topic if none qualifies.
pub fn assign(doc_index: usize, probabilities: &[f64], threshold: f64) -> TopicAssignment {
    let unassigned = TopicAssignment {
        doc_index,
        primary: AssignedTopic::Unassigned,
        significant: vec![AssignedTopic::Unassigned],
    };
    let Some(best) = argmax(probabilities) else {
        return unassigned;
    };
    if probabilities[best] <= threshold {
        return unassigned;
    }

    let primary = AssignedTopic::Topic(best);
    let mut significant: Vec<AssignedTopic> = probabilities
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p > threshold)
        .map(|(t, _)| AssignedTopic::Topic(t))
        .collect();
    if significant.is_empty() {
        significant.push(primary);
    }
    TopicAssignment {
        doc_index,
        primary,
        significant,
    }
}

/// Soft assignments of every document of a flat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftAssignments {
    /// Threshold used
    pub threshold: f64,
    /// Document IDs in row order
    pub doc_ids: Vec<DocumentId>,
    /// One assignment per document
    pub assignments: Vec<TopicAssignment>,
}

impl SoftAssignments {
    /// Assign every document of `model`.
    ///
    /// Computed from the model's current distributions, so a reduced model
    /// must be assigned again rather than patched.
    pub fn for_model(model: &FlatTopicModel, threshold: f64) -> Self {
        let assignments = (0..model.corpus().num_docs())
            .map(|d| {
                let probabilities = model.doc_topic_dist(d).unwrap_or_default();
                assign(d, &probabilities, threshold)
            })
            .collect();
        Self {
            threshold,
            doc_ids: model.doc_ids().to_vec(),
            assignments,
        }
    }

    /// Primary assignment keyed by document ID.
    pub fn primary_by_doc(&self) -> BTreeMap<&DocumentId, AssignedTopic> {
        self.doc_ids
            .iter()
            .zip(&self.assignments)
            .map(|(id, a)| (id, a.primary))
            .collect()
    }

    /// Documents under each significant topic; a document may appear under
    /// several topics and unassigned documents are collected under -1.
    pub fn documents_per_topic(&self) -> BTreeMap<AssignedTopic, Vec<DocumentId>> {
        let mut by_topic: BTreeMap<AssignedTopic, Vec<DocumentId>> = BTreeMap::new();
        for (id, assignment) in self.doc_ids.iter().zip(&self.assignments) {
            for topic in &assignment.significant {
                by_topic.entry(*topic).or_default().push(id.clone());
            }
        }
        by_topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::LdaParams;
    use crate::test_support::two_theme_corpus;
    use crate::training::TrainingSchedule;

    fn pair(a: &TopicAssignment) -> (i64, Vec<i64>) {
        (
            a.primary.as_index(),
            a.significant.iter().map(AssignedTopic::as_index).collect(),
        )
    }

    #[test]
    fn test_three_document_scenario() {
        let vectors = [[0.9, 0.1], [0.4, 0.6], [0.2, 0.2]];
        let result: Vec<(i64, Vec<i64>)> = vectors
            .iter()
            .enumerate()
            .map(|(d, p)| pair(&assign(d, p, 0.5)))
            .collect();
        assert_eq!(
            result,
            vec![(0, vec![0]), (1, vec![1]), (-1, vec![-1])]
        );
    }

    #[test]
    fn test_multiple_significant_topics() {
        let a = assign(0, &[0.45, 0.05, 0.5], 0.1);
        assert_eq!(pair(&a), (2, vec![0, 2]));
    }

    #[test]
    fn test_max_at_threshold_is_unassigned() {
        let a = assign(3, &[0.5, 0.5], 0.5);
        assert_eq!(a.primary, AssignedTopic::Unassigned);
        assert_eq!(a.doc_index, 3);
        assert_eq!(pair(&assign(0, &[], 0.1)), (-1, vec![-1]));
        assert_eq!(pair(&assign(0, &[f64::NAN], 0.1)), (-1, vec![-1]));
    }

    #[test]
    fn test_assignment_is_idempotent() {
        let p = [0.3, 0.25, 0.45];
        assert_eq!(assign(1, &p, 0.2), assign(1, &p, 0.2));
    }

    #[test]
    fn test_serializes_sentinel_as_minus_one() {
        let a = assign(0, &[0.1], 0.5);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, r#"{"doc_index":0,"primary":-1,"significant":[-1]}"#);
        let back: TopicAssignment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_reassign_after_reduction() {
        let params = LdaParams {
            k: 4,
            alpha: 0.1,
            eta: 0.01,
            seed: 42,
        };
        let schedule = TrainingSchedule::new(50, 10).unwrap();
        let model = FlatTopicModel::train(two_theme_corpus(), params, &schedule).unwrap();
        let before = SoftAssignments::for_model(&model, 0.01);
        let reduced = model.reduce_topics(2).unwrap();
        let after = SoftAssignments::for_model(&reduced, 0.01);

        assert_eq!(before.assignments.len(), after.assignments.len());
        assert!(after
            .assignments
            .iter()
            .flat_map(|a| &a.significant)
            .all(|t| t.topic().is_some_and(|t| t < 2)));
        let per_topic = after.documents_per_topic();
        let covered: usize = per_topic.values().map(Vec::len).sum();
        assert!(covered >= 12);
    }
}
