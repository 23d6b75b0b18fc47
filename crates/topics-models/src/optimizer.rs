//! Topic-count search.
//!
//! A transient flat model is trained for every candidate count 1..=max and
//! scored by average coherence and perplexity. Both curves are scaled to
//! unit L2 norm; the selected count is the first one at which the change in
//! coherence to the next candidate falls below the threshold.
//!
//! This is a diminishing-returns heuristic, not an optimum: on a
//! non-monotonic coherence curve a local plateau is taken as the answer,
//! and when no difference falls below the threshold the search reports
//! k = 1 with `fell_back` set. Callers should treat a fallback as a sign of
//! unstable output rather than a recommendation.

use serde::{Deserialize, Serialize};
use topics_types::Settings;
use tracing::{info, instrument, warn};

use crate::coherence::CoherenceEvaluator;
use crate::encoding::EncodedCorpus;
use crate::error::ModelError;
use crate::flat::{FlatTopicModel, LdaParams};
use crate::math::normalize_l2;
use crate::training::TrainingSchedule;

/// Options of a topic-count search.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Largest candidate count
    pub max_topics: usize,
    /// Coherence difference below which the search stops
    pub threshold: f64,
    /// Training schedule of every candidate
    pub schedule: TrainingSchedule,
    /// Document-topic prior
    pub alpha: f64,
    /// Topic-word prior
    pub eta: f64,
    /// Sampler seed
    pub seed: u64,
    /// Coherence measure used to score candidates
    pub evaluator: CoherenceEvaluator,
}

impl OptimizerConfig {
    /// Search options from application settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ModelError> {
        Ok(Self {
            max_topics: settings.flat.max_topics,
            threshold: settings.flat.optimizer_threshold,
            schedule: TrainingSchedule::try_from(&settings.training)?,
            alpha: settings.flat.alpha,
            eta: settings.flat.eta,
            seed: settings.training.seed,
            evaluator: CoherenceEvaluator::from(&settings.coherence),
        })
    }
}

/// Scores of one candidate count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Topic count
    pub k: usize,
    /// Average coherence
    pub coherence: f64,
    /// Perplexity
    pub perplexity: f64,
    /// Log-likelihood per word
    pub ll_per_word: f64,
    /// Coherence scaled to unit norm over all candidates; keeps the sign,
    /// so negative measures such as u_mass land in `[-1, 0]`
    pub normalized_coherence: f64,
    /// Perplexity scaled to unit norm over all candidates
    pub normalized_perplexity: f64,
}

/// Outcome of a topic-count search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCountSelection {
    /// Selected topic count
    pub selected: usize,
    /// True when no coherence difference fell below the threshold
    pub fell_back: bool,
    /// Every candidate in increasing `k`
    pub candidates: Vec<CandidateScore>,
}

/// Search for a topic count over `corpus`.
///
/// Coherence is L2-normalized before selection. The scaling is by a
/// positive norm only, so differences keep their sign and order; a u_mass
/// curve stays negative and `threshold` applies to its scaled steps.
///
/// # Errors
///
/// Returns `InvalidConfig` when `max_topics` is 0.
#[instrument(skip_all, fields(attribute = %corpus.attribute(), max_topics = config.max_topics))]
pub fn find_topic_count(
    corpus: &EncodedCorpus,
    config: &OptimizerConfig,
) -> Result<TopicCountSelection, ModelError> {
    if config.max_topics < 1 {
        return Err(ModelError::InvalidConfig(
            "max_topics must be >= 1".to_string(),
        ));
    }

    let mut coherence = Vec::with_capacity(config.max_topics);
    let mut perplexity = Vec::with_capacity(config.max_topics);
    let mut ll_per_word = Vec::with_capacity(config.max_topics);
    for k in 1..=config.max_topics {
        let params = LdaParams {
            k,
            alpha: config.alpha,
            eta: config.eta,
            seed: config.seed,
        };
        let model = FlatTopicModel::train(corpus.clone(), params, &config.schedule)?;
        coherence.push(config.evaluator.score(&model)?.average);
        perplexity.push(model.perplexity());
        ll_per_word.push(model.ll_per_word());
    }

    let normalized_coherence = normalize_l2(&coherence);
    let normalized_perplexity = normalize_l2(&perplexity);
    let (index, fell_back) = select_topic_count(&normalized_coherence, config.threshold);
    let selected = index + 1;

    if fell_back {
        warn!(
            selected,
            threshold = config.threshold,
            "No coherence difference fell below threshold, falling back to one topic"
        );
    } else {
        info!(selected, "Selected topic count");
    }

    let candidates = (0..config.max_topics)
        .map(|i| CandidateScore {
            k: i + 1,
            coherence: coherence[i],
            perplexity: perplexity[i],
            ll_per_word: ll_per_word[i],
            normalized_coherence: normalized_coherence[i],
            normalized_perplexity: normalized_perplexity[i],
        })
        .collect();

    Ok(TopicCountSelection {
        selected,
        fell_back,
        candidates,
    })
}

/// Index of the first candidate whose coherence differs from the next
/// candidate's by less than `threshold`.
///
/// Returns `(0, true)` when there is no such candidate.
pub fn select_topic_count(coherence: &[f64], threshold: f64) -> (usize, bool) {
    coherence
        .windows(2)
        .position(|pair| (pair[1] - pair[0]).abs() < threshold)
        .map_or((0, true), |i| (i, false))
}
