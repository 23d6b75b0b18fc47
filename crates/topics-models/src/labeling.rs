//! Automatic topic labeling.
//!
//! Label candidates are frequent words and PMI collocations of the model's
//! own corpus. Each candidate is scored per topic by how much more likely
//! its words are under that topic than on average, minus a share of its
//! relevance to the other topics, so labels favor phrases specific to one
//! topic.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use topics_types::{AttributeId, LabelingSettings};
use tracing::{debug, instrument};

use crate::error::ModelError;
use crate::handle::TopicModelView;
use crate::ngrams::{PhraseOptions, PhraseTable, PHRASE_DELIMITER};

/// Labels of every reportable topic of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicLabels {
    /// Attribute of the labeled model
    pub attribute: AttributeId,
    /// Best labels per topic, best first
    pub labels: BTreeMap<usize, Vec<String>>,
}

impl TopicLabels {
    /// Labels of `topic`, best first.
    pub fn labels(&self, topic: usize) -> Option<&[String]> {
        self.labels.get(&topic).map(Vec::as_slice)
    }

    /// Labels of `topic` joined into one display string.
    pub fn label(&self, topic: usize) -> Option<String> {
        self.labels(topic)
            .filter(|l| !l.is_empty())
            .map(|l| l.join(", "))
    }
}

/// A label candidate as word IDs of the model vocabulary.
#[derive(Debug, Clone)]
struct Candidate {
    text: String,
    words: Vec<u32>,
}

/// Relevance-based topic labeler.
#[derive(Debug, Clone)]
pub struct TopicLabeler {
    settings: LabelingSettings,
}

impl TopicLabeler {
    /// Create a labeler.
    pub fn new(settings: LabelingSettings) -> Self {
        Self { settings }
    }

    /// Label every reportable topic of `model`.
    #[instrument(skip_all, fields(attribute = %model.attribute()))]
    pub fn label_topics<M: TopicModelView + ?Sized>(&self, model: &M) -> Result<TopicLabels, ModelError> {
        let candidates = self.candidates(model);
        let topics = model.reportable_topics();
        let mut dists = Vec::with_capacity(topics.len());
        for &topic in &topics {
            dists.push(model.topic_word_dist(topic)?);
        }

        let vocab_size = model.corpus().vocab_size();
        let mean_dist: Vec<f64> = (0..vocab_size)
            .map(|w| dists.iter().map(|d| d[w]).sum::<f64>() / dists.len().max(1) as f64)
            .collect();

        let smoothing = self.settings.smoothing;
        // relevance[t][c]
        let relevance: Vec<Vec<f64>> = dists
            .iter()
            .map(|dist| {
                candidates
                    .iter()
                    .map(|c| {
                        c.words
                            .iter()
                            .map(|&w| {
                                let w = w as usize;
                                ((dist[w] + smoothing) / (mean_dist[w] + smoothing)).ln()
                            })
                            .sum::<f64>()
                            / c.words.len() as f64
                    })
                    .collect()
            })
            .collect();

        let mut labels = BTreeMap::new();
        for (i, &topic) in topics.iter().enumerate() {
            let others = (topics.len() - 1).max(1) as f64;
            let mut scored: Vec<(f64, &str)> = candidates
                .iter()
                .enumerate()
                .map(|(c, cand)| {
                    let other: f64 = relevance
                        .iter()
                        .enumerate()
                        .filter(|&(j, _)| j != i)
                        .map(|(_, r)| r[c])
                        .sum::<f64>()
                        / others;
                    (relevance[i][c] - self.settings.mu * other, cand.text.as_str())
                })
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(b.1)));
            labels.insert(
                topic,
                scored
                    .into_iter()
                    .take(self.settings.top_n)
                    .map(|(_, text)| text.to_string())
                    .collect(),
            );
        }

        debug!(topics = labels.len(), candidates = candidates.len(), "Labeled topics");
        Ok(TopicLabels {
            attribute: model.attribute().clone(),
            labels,
        })
    }

    /// Frequent words and collocations of the model corpus.
    fn candidates<M: TopicModelView + ?Sized>(&self, model: &M) -> Vec<Candidate> {
        let corpus = model.corpus();
        let vocab = corpus.vocab();

        let mut cf = vec![0usize; vocab.len()];
        let mut df = vec![0usize; vocab.len()];
        for doc in corpus.docs() {
            let mut seen = HashSet::new();
            for &w in doc {
                cf[w as usize] += 1;
                if seen.insert(w) {
                    df[w as usize] += 1;
                }
            }
        }
        let mut candidates: Vec<Candidate> = (0..vocab.len())
            .filter(|&w| cf[w] >= self.settings.min_cf && df[w] >= self.settings.min_df)
            .filter_map(|w| {
                vocab.word(w as u32).map(|text| Candidate {
                    text: text.to_string(),
                    words: vec![w as u32],
                })
            })
            .collect();

        let texts: Vec<Vec<String>> = (0..corpus.num_docs())
            .map(|d| corpus.doc_words(d).into_iter().map(str::to_string).collect())
            .collect();
        let phrases = PhraseTable::extract(&texts, &PhraseOptions::from(&self.settings));
        let mut seen: HashSet<String> = candidates.iter().map(|c| c.text.clone()).collect();
        for phrase in phrases.phrases() {
            let words: Option<Vec<u32>> = phrase.words.iter().map(|w| vocab.get(w)).collect();
            let text = phrase.words.join(PHRASE_DELIMITER);
            if let Some(words) = words {
                if seen.insert(text.clone()) {
                    candidates.push(Candidate { text, words });
                }
            }
        }
        candidates
    }
}

impl Default for TopicLabeler {
    fn default() -> Self {
        Self::new(LabelingSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::{FlatTopicModel, LdaParams};
    use crate::test_support::two_theme_corpus;
    use crate::training::TrainingSchedule;

    fn model() -> FlatTopicModel {
        let params = LdaParams {
            k: 2,
            alpha: 0.1,
            eta: 0.01,
            seed: 42,
        };
        let schedule = TrainingSchedule::new(100, 10).unwrap();
        FlatTopicModel::train(two_theme_corpus(), params, &schedule).unwrap()
    }

    #[test]
    fn test_labels_are_topic_specific() {
        let model = model();
        let labels = TopicLabeler::default().label_topics(&model).unwrap();
        let engine_topic = model.primary_topic(0).unwrap();
        let gear_topic = model.primary_topic(1).unwrap();

        let engine_labels = labels.labels(engine_topic).unwrap();
        assert_eq!(engine_labels.len(), 3);
        let engine_words = ["engine", "fire", "smoke", "cockpit"];
        assert!(engine_labels
            .iter()
            .all(|l| l.split(' ').all(|w| engine_words.contains(&w))));

        let gear_label = labels.label(gear_topic).unwrap();
        assert!(!gear_label.contains("engine"));
    }

    #[test]
    fn test_collocations_become_candidates() {
        let model = model();
        let labeler = TopicLabeler::default();
        let candidates = labeler.candidates(&model);
        assert!(candidates.iter().any(|c| c.text == "engine fire"));
        assert!(candidates.iter().any(|c| c.text == "runway"));
    }

    #[test]
    fn test_no_candidates_gives_empty_labels() {
        let settings = LabelingSettings {
            min_cf: 1000,
            ..LabelingSettings::default()
        };
        let labels = TopicLabeler::new(settings).label_topics(&model()).unwrap();
        assert!(labels.label(0).is_none());
    }
}
