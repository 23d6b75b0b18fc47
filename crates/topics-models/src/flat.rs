//! Flat topic model (LDA) trained by collapsed Gibbs sampling.
//!
//! [`LdaSampler`] owns the mutable sampling state while training runs;
//! [`LdaSampler::finish`] freezes it into a read-only [`FlatTopicModel`].
//! All counts of a finished model are recomputed from the per-token topic
//! assignments, so a model rebuilt from its persisted state is identical to
//! the one that was saved.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use topics_types::{AttributeId, DocumentId, FlatSettings};
use tracing::{info, instrument};

use crate::encoding::EncodedCorpus;
use crate::error::ModelError;
use crate::math::{argmax, cosine_similarity, sample_index};
use crate::training::{run_schedule, GibbsSampler, TrainingSchedule};

/// Hyperparameters of a flat model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LdaParams {
    /// Number of topics, fixed for the life of the model
    pub k: usize,
    /// Document-topic Dirichlet prior
    pub alpha: f64,
    /// Topic-word Dirichlet prior
    pub eta: f64,
    /// Sampler seed
    pub seed: u64,
}

impl LdaParams {
    /// Parameters for `k` topics using the priors from `settings`.
    pub fn new(k: usize, settings: &FlatSettings, seed: u64) -> Self {
        Self {
            k,
            alpha: settings.alpha,
            eta: settings.eta,
            seed,
        }
    }

    /// Reject parameters no model can be trained with.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.k < 1 {
            return Err(ModelError::InvalidConfig(format!(
                "topic count must be >= 1, got {}",
                self.k
            )));
        }
        if !(self.alpha > 0.0) || !(self.eta > 0.0) {
            return Err(ModelError::InvalidConfig(
                "alpha and eta must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Weighted sufficient statistics of the sampler.
#[derive(Debug, Clone, PartialEq)]
struct FlatCounts {
    doc_topic: Vec<Vec<f64>>,
    doc_total: Vec<f64>,
    topic_word: Vec<Vec<f64>>,
    topic_total: Vec<f64>,
}

impl FlatCounts {
    fn from_assignments(corpus: &EncodedCorpus, z: &[Vec<u32>], k: usize) -> Self {
        let mut counts = Self {
            doc_topic: vec![vec![0.0; k]; corpus.num_docs()],
            doc_total: vec![0.0; corpus.num_docs()],
            topic_word: vec![vec![0.0; corpus.vocab_size()]; k],
            topic_total: vec![0.0; k],
        };
        for (d, (doc, topics)) in corpus.docs().iter().zip(z).enumerate() {
            for (&w, &t) in doc.iter().zip(topics) {
                counts.shift(d, w, t as usize, corpus.weight(w));
            }
        }
        counts
    }

    fn shift(&mut self, doc: usize, word: u32, topic: usize, weight: f64) {
        self.doc_topic[doc][topic] += weight;
        self.doc_total[doc] += weight;
        self.topic_word[topic][word as usize] += weight;
        self.topic_total[topic] += weight;
    }

    fn ll_per_word(&self, corpus: &EncodedCorpus, params: &LdaParams) -> f64 {
        let k_alpha = params.k as f64 * params.alpha;
        let v_eta = corpus.vocab_size() as f64 * params.eta;
        let mut ll = 0.0;
        for (d, doc) in corpus.docs().iter().enumerate() {
            let doc_denom = self.doc_total[d].max(0.0) + k_alpha;
            for &w in doc {
                let p: f64 = (0..params.k)
                    .map(|t| {
                        (self.doc_topic[d][t].max(0.0) + params.alpha) / doc_denom
                            * (self.topic_word[t][w as usize].max(0.0) + params.eta)
                            / (self.topic_total[t].max(0.0) + v_eta)
                    })
                    .sum();
                ll += p.ln();
            }
        }
        ll / corpus.token_count().max(1) as f64
    }
}

/// Mutable collapsed Gibbs sampler for one attribute.
pub struct LdaSampler {
    corpus: EncodedCorpus,
    params: LdaParams,
    z: Vec<Vec<u32>>,
    counts: FlatCounts,
    rng: StdRng,
    iterations: usize,
    scratch: Vec<f64>,
}

impl LdaSampler {
    /// Initialize with uniformly random topic assignments.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for `k < 1` or non-positive priors.
    pub fn new(corpus: EncodedCorpus, params: LdaParams) -> Result<Self, ModelError> {
        params.validate()?;
        let mut rng = StdRng::seed_from_u64(params.seed);
        let z: Vec<Vec<u32>> = corpus
            .docs()
            .iter()
            .map(|doc| {
                doc.iter()
                    .map(|_| rng.random_range(0..params.k) as u32)
                    .collect()
            })
            .collect();
        let counts = FlatCounts::from_assignments(&corpus, &z, params.k);
        Ok(Self {
            corpus,
            params,
            z,
            counts,
            rng,
            iterations: 0,
            scratch: vec![0.0; params.k],
        })
    }

    /// Sweeps run so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Freeze into a read-only model.
    pub fn finish(self) -> FlatTopicModel {
        FlatTopicModel::assemble(self.corpus, self.params, self.z, self.iterations)
    }
}

impl GibbsSampler for LdaSampler {
    fn attribute(&self) -> &AttributeId {
        self.corpus.attribute()
    }

    fn sweep(&mut self, iterations: usize) {
        let Self {
            corpus,
            params,
            z,
            counts,
            rng,
            scratch,
            ..
        } = self;
        let v_eta = corpus.vocab_size() as f64 * params.eta;

        for _ in 0..iterations {
            for (d, doc) in corpus.docs().iter().enumerate() {
                for (i, &w) in doc.iter().enumerate() {
                    let weight = corpus.weight(w);
                    counts.shift(d, w, z[d][i] as usize, -weight);

                    for (t, p) in scratch.iter_mut().enumerate() {
                        *p = (counts.doc_topic[d][t].max(0.0) + params.alpha)
                            * (counts.topic_word[t][w as usize].max(0.0) + params.eta)
                            / (counts.topic_total[t].max(0.0) + v_eta);
                    }
                    let topic = sample_index(&scratch[..], &mut *rng);

                    counts.shift(d, w, topic, weight);
                    z[d][i] = topic as u32;
                }
            }
        }
        self.iterations += iterations;
    }

    fn ll_per_word(&self) -> f64 {
        self.counts.ll_per_word(&self.corpus, &self.params)
    }
}

/// Persisted form of a flat model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatModelState {
    /// Hyperparameters
    pub params: LdaParams,
    /// Sweeps run during training
    pub iterations: usize,
    /// Encoded documents and vocabulary
    pub corpus: EncodedCorpus,
    /// Topic of every token
    pub assignments: Vec<Vec<u32>>,
}

/// Trained, read-only flat topic model.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatTopicModel {
    corpus: EncodedCorpus,
    params: LdaParams,
    z: Vec<Vec<u32>>,
    iterations: usize,
    counts: FlatCounts,
    token_counts: Vec<usize>,
    doc_primary: Vec<usize>,
}

impl FlatTopicModel {
    /// Train a model over `corpus` following `schedule`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for invalid parameters.
    #[instrument(skip(corpus), fields(attribute = %corpus.attribute()))]
    pub fn train(
        corpus: EncodedCorpus,
        params: LdaParams,
        schedule: &TrainingSchedule,
    ) -> Result<Self, ModelError> {
        info!(
            k = params.k,
            docs = corpus.num_docs(),
            vocab = corpus.vocab_size(),
            iterations = schedule.iterations(),
            "Training flat model"
        );
        let mut sampler = LdaSampler::new(corpus, params)?;
        run_schedule(&mut sampler, schedule, |_| std::ops::ControlFlow::Continue(()));
        let model = sampler.finish();
        info!(
            k = params.k,
            ll_per_word = model.ll_per_word(),
            "Flat model trained"
        );
        Ok(model)
    }

    fn assemble(corpus: EncodedCorpus, params: LdaParams, z: Vec<Vec<u32>>, iterations: usize) -> Self {
        let counts = FlatCounts::from_assignments(&corpus, &z, params.k);
        let mut token_counts = vec![0usize; params.k];
        for &t in z.iter().flatten() {
            token_counts[t as usize] += 1;
        }
        let mut model = Self {
            corpus,
            params,
            z,
            iterations,
            counts,
            token_counts,
            doc_primary: Vec::new(),
        };
        model.doc_primary = (0..model.corpus.num_docs())
            .map(|d| argmax(&model.dist_unchecked(d)).unwrap_or(0))
            .collect();
        model
    }

    /// Rebuild a model from its persisted state.
    ///
    /// # Errors
    ///
    /// Returns `Inconsistent` when the assignments do not fit the corpus.
    pub fn from_state(state: FlatModelState) -> Result<Self, ModelError> {
        state.params.validate()?;
        let FlatModelState {
            params,
            iterations,
            corpus,
            assignments,
        } = state;
        let inconsistent = |reason: &str| ModelError::Inconsistent {
            attribute: corpus.attribute().to_string(),
            reason: reason.to_string(),
        };
        if assignments.len() != corpus.num_docs() {
            return Err(inconsistent("assignment rows differ from document count"));
        }
        if corpus
            .docs()
            .iter()
            .zip(&assignments)
            .any(|(doc, z)| doc.len() != z.len())
        {
            return Err(inconsistent("assignment length differs from document length"));
        }
        if assignments.iter().flatten().any(|&t| t as usize >= params.k) {
            return Err(inconsistent("topic assignment outside the model"));
        }
        Ok(Self::assemble(corpus, params, assignments, iterations))
    }

    /// Persisted form of this model.
    pub fn state(&self) -> FlatModelState {
        FlatModelState {
            params: self.params,
            iterations: self.iterations,
            corpus: self.corpus.clone(),
            assignments: self.z.clone(),
        }
    }

    /// Attribute the model was trained on.
    pub fn attribute(&self) -> &AttributeId {
        self.corpus.attribute()
    }

    /// Encoded training documents.
    pub fn corpus(&self) -> &EncodedCorpus {
        &self.corpus
    }

    /// Document IDs in row order.
    pub fn doc_ids(&self) -> &[DocumentId] {
        self.corpus.doc_ids()
    }

    /// Hyperparameters.
    pub fn params(&self) -> &LdaParams {
        &self.params
    }

    /// Number of topics.
    pub fn num_topics(&self) -> usize {
        self.params.k
    }

    /// Sweeps run during training.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Per-token topic assignments.
    pub fn assignments(&self) -> &[Vec<u32>] {
        &self.z
    }

    fn dist_unchecked(&self, doc: usize) -> Vec<f64> {
        let k_alpha = self.params.k as f64 * self.params.alpha;
        let denom = self.counts.doc_total[doc] + k_alpha;
        self.counts.doc_topic[doc]
            .iter()
            .map(|&n| (n + self.params.alpha) / denom)
            .collect()
    }

    fn check_topic(&self, topic: usize) -> Result<(), ModelError> {
        if topic >= self.params.k {
            return Err(ModelError::TopicOutOfRange {
                topic,
                slots: self.params.k,
            });
        }
        Ok(())
    }

    /// Topic probability vector of document `doc`.
    pub fn doc_topic_dist(&self, doc: usize) -> Option<Vec<f64>> {
        (doc < self.corpus.num_docs()).then(|| self.dist_unchecked(doc))
    }

    /// The `n` most probable topics of `doc`, most probable first.
    pub fn top_topics(&self, doc: usize, n: usize) -> Option<Vec<(usize, f64)>> {
        let dist = self.doc_topic_dist(doc)?;
        let mut ranked: Vec<(usize, f64)> = dist.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        Some(ranked)
    }

    /// Hard assignment: argmax of the document's topic distribution.
    pub fn primary_topic(&self, doc: usize) -> Option<usize> {
        self.doc_primary.get(doc).copied()
    }

    /// Word distribution of `topic`, indexed by word ID.
    pub fn topic_word_dist(&self, topic: usize) -> Result<Vec<f64>, ModelError> {
        self.check_topic(topic)?;
        let v_eta = self.corpus.vocab_size() as f64 * self.params.eta;
        let denom = self.counts.topic_total[topic] + v_eta;
        Ok(self.counts.topic_word[topic]
            .iter()
            .map(|&n| (n + self.params.eta) / denom)
            .collect())
    }

    /// The `n` most probable words of `topic`; ties go to the lower word ID.
    pub fn top_words(&self, topic: usize, n: usize) -> Result<Vec<(String, f64)>, ModelError> {
        let dist = self.topic_word_dist(topic)?;
        Ok(rank_words(&self.corpus, &dist, n))
    }

    /// Tokens assigned to each topic.
    pub fn count_by_topic(&self) -> &[usize] {
        &self.token_counts
    }

    /// Documents whose primary topic is `topic`.
    pub fn num_docs_of_topic(&self, topic: usize) -> usize {
        self.doc_primary.iter().filter(|&&t| t == topic).count()
    }

    /// Log-likelihood per word under the trained distributions.
    pub fn ll_per_word(&self) -> f64 {
        self.counts.ll_per_word(&self.corpus, &self.params)
    }

    /// `exp(-ll_per_word)`.
    pub fn perplexity(&self) -> f64 {
        (-self.ll_per_word()).exp()
    }

    /// Reduce the model to `target` topics.
    ///
    /// The topic with the fewest tokens is merged into the topic whose word
    /// distribution is most cosine-similar, repeatedly, and the remaining
    /// topics are renumbered densely. Document distributions must be read
    /// again from the returned model; the old ones have a different
    /// dimensionality.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `target` is 0 or above the current count.
    #[instrument(skip(self), fields(attribute = %self.attribute(), from = self.params.k))]
    pub fn reduce_topics(&self, target: usize) -> Result<Self, ModelError> {
        if target < 1 || target > self.params.k {
            return Err(ModelError::InvalidConfig(format!(
                "cannot reduce {} topics to {target}",
                self.params.k
            )));
        }

        let mut model = self.clone();
        while model.num_topics() > target {
            let k = model.num_topics();
            let smallest = (0..k)
                .min_by_key(|&t| (model.token_counts[t], t))
                .unwrap_or(0);
            let source = model.topic_word_dist(smallest)?;

            let mut into = None;
            let mut best = f64::NEG_INFINITY;
            for t in (0..k).filter(|&t| t != smallest) {
                let sim = cosine_similarity(&source, &model.topic_word_dist(t)?);
                if sim > best {
                    best = sim;
                    into = Some(t);
                }
            }
            let into = into.unwrap_or(0);

            let z = model
                .z
                .iter()
                .map(|doc| {
                    doc.iter()
                        .map(|&t| {
                            let t = if t as usize == smallest { into as u32 } else { t };
                            if t as usize > smallest {
                                t - 1
                            } else {
                                t
                            }
                        })
                        .collect()
                })
                .collect();
            let params = LdaParams { k: k - 1, ..model.params };
            model = Self::assemble(model.corpus, params, z, model.iterations);
        }

        info!(to = target, "Reduced topics");
        Ok(model)
    }
}

/// Rank vocabulary entries of a word distribution, most probable first.
pub(crate) fn rank_words(corpus: &EncodedCorpus, dist: &[f64], n: usize) -> Vec<(String, f64)> {
    top_word_ids(dist, n)
        .into_iter()
        .filter_map(|w| {
            corpus
                .vocab()
                .word(w)
                .map(|word| (word.to_string(), dist[w as usize]))
        })
        .collect()
}

/// IDs of the `n` most probable words; ties go to the lower ID.
pub(crate) fn top_word_ids(dist: &[f64], n: usize) -> Vec<u32> {
    let mut ids: Vec<u32> = (0..dist.len() as u32).collect();
    ids.sort_by(|&a, &b| dist[b as usize].total_cmp(&dist[a as usize]).then(a.cmp(&b)));
    ids.truncate(n);
    ids
}
