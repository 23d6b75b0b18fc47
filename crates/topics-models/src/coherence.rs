//! Topic coherence and diversity.
//!
//! Coherence is computed from co-occurrence of each topic's top words in the
//! model's own encoded corpus: per document for `u_mass`, per boolean
//! sliding window for the PMI-based measures. Only reportable topics (flat
//! topics with tokens, live hierarchical topics) are scored, so dead slots
//! never distort the aggregates.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use topics_types::{CoherenceMeasure, CoherenceSettings};
use tracing::{debug, instrument};

use crate::encoding::EncodedCorpus;
use crate::error::ModelError;
use crate::flat::top_word_ids;
use crate::handle::TopicModelView;
use crate::math::{cosine_similarity, mean_std};

const EPSILON: f64 = 1e-12;

/// Coherence of one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCoherence {
    /// Topic ID
    pub topic: usize,
    /// Topic level (0 for flat models)
    pub level: usize,
    /// Coherence score
    pub score: f64,
}

/// Aggregate coherence of one hierarchy level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelCoherence {
    /// Level
    pub level: usize,
    /// Mean over the level's live topics
    pub average: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Topics scored at this level
    pub topics: usize,
}

/// Coherence and diversity of a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceReport {
    /// Measure used
    pub measure: CoherenceMeasure,
    /// Top words per topic fed to the measure
    pub top_n: usize,
    /// Per-topic scores in topic ID order
    pub per_topic: Vec<TopicCoherence>,
    /// Mean of `per_topic`; NaN when no topic was scored
    pub average: f64,
    /// Standard deviation of `per_topic`; NaN when no topic was scored
    pub std_dev: f64,
    /// Levels 1..depth of a hierarchical model; empty for flat models
    pub levels: Vec<LevelCoherence>,
    /// Distinct top words over all top-word slots
    pub diversity: f64,
}

impl CoherenceReport {
    /// True when the model had no topic to score.
    pub fn is_degenerate(&self) -> bool {
        self.per_topic.is_empty()
    }

    /// Score of `topic`, if it was scored.
    pub fn topic_score(&self, topic: usize) -> Option<f64> {
        self.per_topic
            .iter()
            .find(|t| t.topic == topic)
            .map(|t| t.score)
    }
}

/// Scores models with one coherence measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoherenceEvaluator {
    measure: CoherenceMeasure,
    top_n: usize,
}

impl CoherenceEvaluator {
    /// Evaluator for `measure` over the `top_n` words of each topic.
    pub fn new(measure: CoherenceMeasure, top_n: usize) -> Self {
        Self { measure, top_n }
    }

    /// Measure used.
    pub fn measure(&self) -> CoherenceMeasure {
        self.measure
    }

    /// Score every reportable topic of `model`.
    ///
    /// A model with no reportable topic yields a degenerate report rather
    /// than an error.
    #[instrument(skip_all, fields(attribute = %model.attribute(), measure = %self.measure))]
    pub fn score<M: TopicModelView + ?Sized>(&self, model: &M) -> Result<CoherenceReport, ModelError> {
        let topics = model.reportable_topics();
        let mut top_words: Vec<Vec<u32>> = Vec::with_capacity(topics.len());
        for &topic in &topics {
            let dist = model.topic_word_dist(topic)?;
            top_words.push(top_word_ids(&dist, self.top_n));
        }

        let stats = CooccurrenceStats::collect(model.corpus(), &top_words, self.measure.window_size());
        let per_topic: Vec<TopicCoherence> = topics
            .iter()
            .zip(&top_words)
            .map(|(&topic, words)| TopicCoherence {
                topic,
                level: model.topic_level(topic),
                score: stats.coherence(self.measure, words),
            })
            .collect();

        let scores: Vec<f64> = per_topic.iter().map(|t| t.score).collect();
        let (average, std_dev) = mean_std(&scores);

        let levels = (1..model.depth())
            .map(|level| {
                let at_level: Vec<f64> = per_topic
                    .iter()
                    .filter(|t| t.level == level && model.num_docs_of_topic(t.topic) > 0)
                    .map(|t| t.score)
                    .collect();
                let (average, std_dev) = mean_std(&at_level);
                LevelCoherence {
                    level,
                    average,
                    std_dev,
                    topics: at_level.len(),
                }
            })
            .collect();

        let diversity = topic_diversity(&top_words);
        debug!(average, std_dev, diversity, topics = scores.len(), "Scored coherence");

        Ok(CoherenceReport {
            measure: self.measure,
            top_n: self.top_n,
            per_topic,
            average,
            std_dev,
            levels,
            diversity,
        })
    }
}

impl From<&CoherenceSettings> for CoherenceEvaluator {
    fn from(settings: &CoherenceSettings) -> Self {
        Self::new(settings.measure, settings.top_n)
    }
}

/// Share of distinct words among all top-word slots; 1.0 when no two
/// topics share a top word, NaN for no topics.
pub fn topic_diversity(top_words: &[Vec<u32>]) -> f64 {
    let slots: usize = top_words.iter().map(Vec::len).sum();
    if slots == 0 {
        return f64::NAN;
    }
    let unique: HashSet<u32> = top_words.iter().flatten().copied().collect();
    unique.len() as f64 / slots as f64
}

/// Segment counts for the words that appear in any top-word list.
struct CooccurrenceStats {
    segments: f64,
    single: HashMap<u32, f64>,
    pairs: HashMap<(u32, u32), f64>,
}

impl CooccurrenceStats {
    fn collect(corpus: &EncodedCorpus, top_words: &[Vec<u32>], window: Option<usize>) -> Self {
        let wanted: HashSet<u32> = top_words.iter().flatten().copied().collect();
        let mut stats = Self {
            segments: 0.0,
            single: HashMap::new(),
            pairs: HashMap::new(),
        };
        for doc in corpus.docs() {
            match window {
                Some(size) if doc.len() > size => {
                    for segment in doc.windows(size) {
                        stats.count_segment(segment, &wanted);
                    }
                }
                _ => stats.count_segment(doc, &wanted),
            }
        }
        stats
    }

    fn count_segment(&mut self, segment: &[u32], wanted: &HashSet<u32>) {
        self.segments += 1.0;
        let mut present: Vec<u32> = segment
            .iter()
            .copied()
            .filter(|w| wanted.contains(w))
            .collect();
        present.sort_unstable();
        present.dedup();
        for (i, &a) in present.iter().enumerate() {
            *self.single.entry(a).or_insert(0.0) += 1.0;
            for &b in &present[i + 1..] {
                *self.pairs.entry((a, b)).or_insert(0.0) += 1.0;
            }
        }
    }

    fn count(&self, w: u32) -> f64 {
        self.single.get(&w).copied().unwrap_or(0.0)
    }

    fn joint(&self, a: u32, b: u32) -> f64 {
        if a == b {
            return self.count(a);
        }
        let key = if a < b { (a, b) } else { (b, a) };
        self.pairs.get(&key).copied().unwrap_or(0.0)
    }

    fn pmi(&self, a: u32, b: u32) -> f64 {
        let n = self.segments.max(1.0);
        let p_ab = self.joint(a, b) / n;
        let p_a = self.count(a) / n;
        let p_b = self.count(b) / n;
        if p_a == 0.0 || p_b == 0.0 {
            return 0.0;
        }
        ((p_ab + EPSILON) / (p_a * p_b)).ln()
    }

    fn npmi(&self, a: u32, b: u32) -> f64 {
        let n = self.segments.max(1.0);
        let p_ab = self.joint(a, b) / n;
        let denom = -(p_ab + EPSILON).ln();
        if denom == 0.0 {
            return 1.0;
        }
        self.pmi(a, b) / denom
    }

    fn coherence(&self, measure: CoherenceMeasure, words: &[u32]) -> f64 {
        if words.len() < 2 {
            return 0.0;
        }
        match measure {
            CoherenceMeasure::UMass => {
                // log((D(w_i, w_j) + 1) / D(w_j)) for every higher-ranked w_j
                let mut total = 0.0;
                let mut pairs = 0.0;
                for (i, &wi) in words.iter().enumerate().skip(1) {
                    for &wj in &words[..i] {
                        let dj = self.count(wj);
                        if dj > 0.0 {
                            total += ((self.joint(wi, wj) + 1.0) / dj).ln();
                        }
                        pairs += 1.0;
                    }
                }
                total / pairs
            }
            CoherenceMeasure::Uci => self.mean_over_pairs(words, |a, b| self.pmi(a, b)),
            CoherenceMeasure::Npmi => self.mean_over_pairs(words, |a, b| self.npmi(a, b)),
            CoherenceMeasure::Cv => {
                let vectors: Vec<Vec<f64>> = words
                    .iter()
                    .map(|&wi| words.iter().map(|&wj| self.npmi(wi, wj)).collect())
                    .collect();
                let topic_vector: Vec<f64> = (0..words.len())
                    .map(|j| vectors.iter().map(|v| v[j]).sum())
                    .collect();
                let sims: Vec<f64> = vectors
                    .iter()
                    .map(|v| cosine_similarity(v, &topic_vector))
                    .collect();
                sims.iter().sum::<f64>() / sims.len() as f64
            }
        }
    }

    fn mean_over_pairs(&self, words: &[u32], score: impl Fn(u32, u32) -> f64) -> f64 {
        let mut total = 0.0;
        let mut pairs = 0.0;
        for (i, &a) in words.iter().enumerate() {
            for &b in &words[i + 1..] {
                total += score(a, b);
                pairs += 1.0;
            }
        }
        total / pairs
    }
}
