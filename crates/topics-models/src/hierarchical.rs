//! Hierarchical topic model (hLDA) over a nested Chinese restaurant process.
//!
//! Each document owns one root-to-leaf path through a tree of fixed depth
//! and every token is assigned to one level of that path. Paths and levels
//! are resampled alternately by [`HldaSampler`]; a node whose last document
//! leaves it is detached from the tree and its slot is reused by the next
//! new branch.
//!
//! A finished [`HierarchicalTopicModel`] keeps every slot so IDs stay
//! stable. Slots with no documents are dead: they are excluded from
//! reporting but can still be looked up.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use topics_types::{AttributeId, DocumentId, HierarchicalSettings};
use tracing::{info, instrument};

use crate::encoding::EncodedCorpus;
use crate::error::ModelError;
use crate::flat::rank_words;
use crate::math::{ln_gamma, sample_index, sample_log_index};
use crate::training::{run_schedule, GibbsSampler, TrainingSchedule};

/// ID of the root topic.
pub const ROOT: usize = 0;

/// Hyperparameters of a hierarchical model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HldaParams {
    /// Tree depth including the root level
    pub depth: usize,
    /// Document-level Dirichlet prior
    pub alpha: f64,
    /// Topic-word Dirichlet prior
    pub eta: f64,
    /// Nested CRP concentration
    pub gamma: f64,
    /// Sampler seed
    pub seed: u64,
}

impl HldaParams {
    /// Parameters from `settings`.
    pub fn new(settings: &HierarchicalSettings, seed: u64) -> Self {
        Self {
            depth: settings.depth,
            alpha: settings.alpha,
            eta: settings.eta,
            gamma: settings.gamma,
            seed,
        }
    }

    /// Reject parameters no model can be trained with.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.depth < 2 {
            return Err(ModelError::InvalidConfig(format!(
                "hierarchical depth must be >= 2, got {}",
                self.depth
            )));
        }
        if !(self.alpha > 0.0) || !(self.eta > 0.0) || !(self.gamma > 0.0) {
            return Err(ModelError::InvalidConfig(
                "alpha, eta and gamma must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Position of a topic slot in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNode {
    /// Parent slot; `None` for the root and for dead slots detached when
    /// their parent slot was reused
    pub parent: Option<usize>,
    /// Depth level, root = 0
    pub level: usize,
}

/// Tree structure plus weighted word counts per slot.
#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<TopicNode>,
    children: Vec<Vec<usize>>,
    free: Vec<usize>,
    num_docs: Vec<usize>,
    node_word: Vec<Vec<f64>>,
    node_total: Vec<f64>,
}

impl Tree {
    fn with_root(vocab_size: usize) -> Self {
        Self {
            nodes: vec![TopicNode {
                parent: None,
                level: 0,
            }],
            children: vec![Vec::new()],
            free: Vec::new(),
            num_docs: vec![0],
            node_word: vec![vec![0.0; vocab_size]],
            node_total: vec![0.0],
        }
    }

    /// Rebuild counts and live children from paths and token levels.
    fn from_paths(
        nodes: Vec<TopicNode>,
        corpus: &EncodedCorpus,
        paths: &[Vec<usize>],
        levels: &[Vec<u32>],
    ) -> Self {
        let slots = nodes.len();
        let mut tree = Self {
            nodes,
            children: vec![Vec::new(); slots],
            free: Vec::new(),
            num_docs: vec![0; slots],
            node_word: vec![vec![0.0; corpus.vocab_size()]; slots],
            node_total: vec![0.0; slots],
        };
        for (d, path) in paths.iter().enumerate() {
            tree.add_doc(corpus, d, path, &levels[d]);
        }
        for id in 1..slots {
            match tree.nodes[id].parent {
                Some(parent) if tree.num_docs[id] > 0 => tree.children[parent].push(id),
                _ if tree.num_docs[id] == 0 => tree.free.push(id),
                _ => {}
            }
        }
        tree
    }

    fn add_doc(&mut self, corpus: &EncodedCorpus, doc: usize, path: &[usize], levels: &[u32]) {
        for &node in path {
            self.num_docs[node] += 1;
        }
        for (&w, &l) in corpus.docs()[doc].iter().zip(levels) {
            let node = path[l as usize];
            let weight = corpus.weight(w);
            self.node_word[node][w as usize] += weight;
            self.node_total[node] += weight;
        }
    }

    fn remove_doc(&mut self, corpus: &EncodedCorpus, doc: usize, path: &[usize], levels: &[u32]) {
        for (&w, &l) in corpus.docs()[doc].iter().zip(levels) {
            let node = path[l as usize];
            let weight = corpus.weight(w);
            self.node_word[node][w as usize] -= weight;
            self.node_total[node] -= weight;
        }
        for &node in path {
            self.num_docs[node] -= 1;
        }
        for &node in path.iter().rev() {
            if node != ROOT && self.num_docs[node] == 0 {
                if let Some(parent) = self.nodes[node].parent {
                    self.children[parent].retain(|&c| c != node);
                }
                self.free.push(node);
            }
        }
    }

    fn allocate(&mut self, parent: usize, level: usize) -> usize {
        let node = TopicNode {
            parent: Some(parent),
            level,
        };
        let id = match self.free.pop() {
            Some(id) => {
                // Dead slots still naming the old occupant as parent are detached.
                for (n, &docs) in self.nodes.iter_mut().zip(&self.num_docs) {
                    if docs == 0 && n.parent == Some(id) {
                        n.parent = None;
                    }
                }
                self.nodes[id] = node;
                self.children[id].clear();
                self.num_docs[id] = 0;
                self.node_word[id].iter_mut().for_each(|c| *c = 0.0);
                self.node_total[id] = 0.0;
                id
            }
            None => {
                let vocab_size = self.node_word[ROOT].len();
                self.nodes.push(node);
                self.children.push(Vec::new());
                self.num_docs.push(0);
                self.node_word.push(vec![0.0; vocab_size]);
                self.node_total.push(0.0);
                self.nodes.len() - 1
            }
        };
        self.children[parent].push(id);
        id
    }

    fn ancestors(&self, node: usize) -> Vec<usize> {
        let mut path = vec![node];
        let mut current = node;
        while let Some(parent) = self.nodes[current].parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Log marginal likelihood of a document's level words under `node`.
    fn level_ll(&self, node: Option<usize>, words: &BTreeMap<u32, f64>, total: f64, eta: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        let v_eta = self.node_word[ROOT].len() as f64 * eta;
        let n_t = node.map_or(0.0, |t| self.node_total[t].max(0.0));
        let mut ll = ln_gamma(n_t + v_eta) - ln_gamma(n_t + total + v_eta);
        for (&w, &c) in words {
            let n_tw = node.map_or(0.0, |t| self.node_word[t][w as usize].max(0.0));
            ll += ln_gamma(n_tw + c + eta) - ln_gamma(n_tw + eta);
        }
        ll
    }
}

fn doc_level_counts(corpus: &EncodedCorpus, levels: &[Vec<u32>], depth: usize) -> Vec<Vec<f64>> {
    corpus
        .docs()
        .iter()
        .zip(levels)
        .map(|(doc, lv)| {
            let mut counts = vec![0.0; depth];
            for (&w, &l) in doc.iter().zip(lv) {
                counts[l as usize] += corpus.weight(w);
            }
            counts
        })
        .collect()
}

fn ll_per_word(
    corpus: &EncodedCorpus,
    params: &HldaParams,
    tree: &Tree,
    paths: &[Vec<usize>],
    doc_level: &[Vec<f64>],
) -> f64 {
    let l_alpha = params.depth as f64 * params.alpha;
    let v_eta = corpus.vocab_size() as f64 * params.eta;
    let mut ll = 0.0;
    for (d, doc) in corpus.docs().iter().enumerate() {
        let doc_total: f64 = doc_level[d].iter().map(|c| c.max(0.0)).sum();
        for &w in doc {
            let p: f64 = paths[d]
                .iter()
                .enumerate()
                .map(|(l, &t)| {
                    (doc_level[d][l].max(0.0) + params.alpha) / (doc_total + l_alpha)
                        * (tree.node_word[t][w as usize].max(0.0) + params.eta)
                        / (tree.node_total[t].max(0.0) + v_eta)
                })
                .sum();
            ll += p.ln();
        }
    }
    ll / corpus.token_count().max(1) as f64
}

/// Mutable nested-CRP Gibbs sampler for one attribute.
pub struct HldaSampler {
    corpus: EncodedCorpus,
    params: HldaParams,
    tree: Tree,
    paths: Vec<Vec<usize>>,
    levels: Vec<Vec<u32>>,
    doc_level: Vec<Vec<f64>>,
    rng: StdRng,
    iterations: usize,
}

impl HldaSampler {
    /// Initialize with random token levels, adding documents one at a time
    /// and sampling each path against the documents already placed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for depth < 2 or non-positive priors.
    pub fn new(corpus: EncodedCorpus, params: HldaParams) -> Result<Self, ModelError> {
        params.validate()?;
        let mut rng = StdRng::seed_from_u64(params.seed);
        let levels: Vec<Vec<u32>> = corpus
            .docs()
            .iter()
            .map(|doc| {
                doc.iter()
                    .map(|_| rng.random_range(0..params.depth) as u32)
                    .collect()
            })
            .collect();
        let doc_level = doc_level_counts(&corpus, &levels, params.depth);

        let mut sampler = Self {
            tree: Tree::with_root(corpus.vocab_size()),
            paths: vec![Vec::new(); corpus.num_docs()],
            corpus,
            params,
            levels,
            doc_level,
            rng,
            iterations: 0,
        };
        for d in 0..sampler.corpus.num_docs() {
            let path = sampler.sample_path(d);
            sampler.tree.add_doc(&sampler.corpus, d, &path, &sampler.levels[d]);
            sampler.paths[d] = path;
        }
        Ok(sampler)
    }

    /// Sweeps run so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Freeze into a read-only model.
    pub fn finish(self) -> HierarchicalTopicModel {
        HierarchicalTopicModel::assemble(
            self.corpus,
            self.params,
            self.tree.nodes,
            self.paths,
            self.levels,
            self.iterations,
        )
    }

    /// Sample a path for `doc`, which must not currently be in the tree.
    fn sample_path(&mut self, doc: usize) -> Vec<usize> {
        let depth = self.params.depth;
        let mut level_words: Vec<BTreeMap<u32, f64>> = vec![BTreeMap::new(); depth];
        let mut level_totals = vec![0.0; depth];
        for (&w, &l) in self.corpus.docs()[doc].iter().zip(&self.levels[doc]) {
            let weight = self.corpus.weight(w);
            *level_words[l as usize].entry(w).or_insert(0.0) += weight;
            level_totals[l as usize] += weight;
        }

        let eta = self.params.eta;
        let gamma = self.params.gamma;
        let fresh: Vec<f64> = (0..depth)
            .map(|l| self.tree.level_ll(None, &level_words[l], level_totals[l], eta))
            .collect();

        // Candidates: every leaf, plus a new branch below every internal node.
        let mut candidates: Vec<(usize, bool)> = Vec::new();
        let mut scores: Vec<f64> = Vec::new();
        let mut stack = vec![(ROOT, 0.0)];
        while let Some((node, score)) = stack.pop() {
            let level = self.tree.nodes[node].level;
            if level + 1 == depth {
                candidates.push((node, false));
                scores.push(score);
                continue;
            }
            let denom = self.tree.num_docs[node] as f64 + gamma;
            candidates.push((node, true));
            scores.push(score + (gamma / denom).ln() + fresh[level + 1..].iter().sum::<f64>());
            for &child in &self.tree.children[node] {
                let prior = (self.tree.num_docs[child] as f64 / denom).ln();
                let ll = self.tree.level_ll(
                    Some(child),
                    &level_words[level + 1],
                    level_totals[level + 1],
                    eta,
                );
                stack.push((child, score + prior + ll));
            }
        }

        let (node, new_branch) = candidates[sample_log_index(&scores, &mut self.rng)];
        let mut path = self.tree.ancestors(node);
        if new_branch {
            let mut parent = node;
            for level in self.tree.nodes[node].level + 1..depth {
                parent = self.tree.allocate(parent, level);
                path.push(parent);
            }
        }
        path
    }

    fn sample_levels(&mut self, doc: usize) {
        let Self {
            corpus,
            params,
            tree,
            paths,
            levels,
            doc_level,
            rng,
            ..
        } = self;
        let v_eta = corpus.vocab_size() as f64 * params.eta;
        let path = &paths[doc];
        let mut weights = vec![0.0; params.depth];

        for (i, &w) in corpus.docs()[doc].iter().enumerate() {
            let weight = corpus.weight(w);
            let old = path[levels[doc][i] as usize];
            doc_level[doc][levels[doc][i] as usize] -= weight;
            tree.node_word[old][w as usize] -= weight;
            tree.node_total[old] -= weight;

            for (l, p) in weights.iter_mut().enumerate() {
                let t = path[l];
                *p = (doc_level[doc][l].max(0.0) + params.alpha)
                    * (tree.node_word[t][w as usize].max(0.0) + params.eta)
                    / (tree.node_total[t].max(0.0) + v_eta);
            }
            let level = sample_index(&weights, &mut *rng);

            let new = path[level];
            doc_level[doc][level] += weight;
            tree.node_word[new][w as usize] += weight;
            tree.node_total[new] += weight;
            levels[doc][i] = level as u32;
        }
    }
}

impl GibbsSampler for HldaSampler {
    fn attribute(&self) -> &AttributeId {
        self.corpus.attribute()
    }

    fn sweep(&mut self, iterations: usize) {
        for _ in 0..iterations {
            for d in 0..self.corpus.num_docs() {
                let old = std::mem::take(&mut self.paths[d]);
                self.tree.remove_doc(&self.corpus, d, &old, &self.levels[d]);
                let path = self.sample_path(d);
                self.tree.add_doc(&self.corpus, d, &path, &self.levels[d]);
                self.paths[d] = path;
                self.sample_levels(d);
            }
        }
        self.iterations += iterations;
    }

    fn ll_per_word(&self) -> f64 {
        ll_per_word(
            &self.corpus,
            &self.params,
            &self.tree,
            &self.paths,
            &self.doc_level,
        )
    }
}

/// Persisted form of a hierarchical model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalModelState {
    /// Hyperparameters
    pub params: HldaParams,
    /// Sweeps run during training
    pub iterations: usize,
    /// Encoded documents and vocabulary
    pub corpus: EncodedCorpus,
    /// Every topic slot, live or dead
    pub nodes: Vec<TopicNode>,
    /// Root-to-leaf path of every document
    pub paths: Vec<Vec<usize>>,
    /// Level of every token
    pub levels: Vec<Vec<u32>>,
}

/// Trained, read-only hierarchical topic model.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchicalTopicModel {
    corpus: EncodedCorpus,
    params: HldaParams,
    paths: Vec<Vec<usize>>,
    levels: Vec<Vec<u32>>,
    iterations: usize,
    tree: Tree,
    doc_level: Vec<Vec<f64>>,
    token_counts: Vec<usize>,
}

impl HierarchicalTopicModel {
    /// Train a model over `corpus` following `schedule`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for invalid parameters.
    #[instrument(skip(corpus), fields(attribute = %corpus.attribute()))]
    pub fn train(
        corpus: EncodedCorpus,
        params: HldaParams,
        schedule: &TrainingSchedule,
    ) -> Result<Self, ModelError> {
        info!(
            depth = params.depth,
            docs = corpus.num_docs(),
            vocab = corpus.vocab_size(),
            iterations = schedule.iterations(),
            "Training hierarchical model"
        );
        let mut sampler = HldaSampler::new(corpus, params)?;
        run_schedule(&mut sampler, schedule, |_| std::ops::ControlFlow::Continue(()));
        let model = sampler.finish();
        info!(
            live_topics = model.live_topics().count(),
            ll_per_word = model.ll_per_word(),
            "Hierarchical model trained"
        );
        Ok(model)
    }

    fn assemble(
        corpus: EncodedCorpus,
        params: HldaParams,
        nodes: Vec<TopicNode>,
        paths: Vec<Vec<usize>>,
        levels: Vec<Vec<u32>>,
        iterations: usize,
    ) -> Self {
        let tree = Tree::from_paths(nodes, &corpus, &paths, &levels);
        let doc_level = doc_level_counts(&corpus, &levels, params.depth);
        let mut token_counts = vec![0usize; tree.nodes.len()];
        for (path, lv) in paths.iter().zip(&levels) {
            for &l in lv {
                token_counts[path[l as usize]] += 1;
            }
        }
        Self {
            corpus,
            params,
            paths,
            levels,
            iterations,
            tree,
            doc_level,
            token_counts,
        }
    }

    /// Rebuild a model from its persisted state.
    ///
    /// # Errors
    ///
    /// Returns `Inconsistent` when paths, levels or the node table do not
    /// describe a valid tree over the corpus.
    pub fn from_state(state: HierarchicalModelState) -> Result<Self, ModelError> {
        state.params.validate()?;
        let HierarchicalModelState {
            params,
            iterations,
            corpus,
            nodes,
            paths,
            levels,
        } = state;
        let inconsistent = |reason: String| ModelError::Inconsistent {
            attribute: corpus.attribute().to_string(),
            reason,
        };

        match nodes.first() {
            Some(root) if root.parent.is_none() && root.level == 0 => {}
            _ => return Err(inconsistent("missing root topic".to_string())),
        }
        if nodes
            .iter()
            .skip(1)
            .any(|n| n.level >= params.depth || n.parent.is_some_and(|p| p >= nodes.len()))
        {
            return Err(inconsistent("topic node outside the tree".to_string()));
        }
        if paths.len() != corpus.num_docs() || levels.len() != corpus.num_docs() {
            return Err(inconsistent("path rows differ from document count".to_string()));
        }
        for (d, path) in paths.iter().enumerate() {
            let valid = path.len() == params.depth
                && path.first() == Some(&ROOT)
                && path.iter().enumerate().all(|(l, &t)| {
                    t < nodes.len()
                        && nodes[t].level == l
                        && (l == 0 || nodes[t].parent == Some(path[l - 1]))
                });
            if !valid {
                return Err(inconsistent(format!("invalid path for document {d}")));
            }
        }
        for (doc, lv) in corpus.docs().iter().zip(&levels) {
            if doc.len() != lv.len() || lv.iter().any(|&l| l as usize >= params.depth) {
                return Err(inconsistent("token level outside the tree".to_string()));
            }
        }

        Ok(Self::assemble(corpus, params, nodes, paths, levels, iterations))
    }

    /// Persisted form of this model.
    pub fn state(&self) -> HierarchicalModelState {
        HierarchicalModelState {
            params: self.params,
            iterations: self.iterations,
            corpus: self.corpus.clone(),
            nodes: self.tree.nodes.clone(),
            paths: self.paths.clone(),
            levels: self.levels.clone(),
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
    pub fn params(&self) -> &HldaParams {
        &self.params
    }

    /// Tree depth including the root.
    pub fn depth(&self) -> usize {
        self.params.depth
    }

    /// Sweeps run during training.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of topic slots, live and dead.
    pub fn num_topic_slots(&self) -> usize {
        self.tree.nodes.len()
    }

    fn node(&self, topic: usize) -> Result<&TopicNode, ModelError> {
        self.tree
            .nodes
            .get(topic)
            .ok_or(ModelError::TopicOutOfRange {
                topic,
                slots: self.tree.nodes.len(),
            })
    }

    /// True when at least one document passes through `topic`.
    pub fn is_live(&self, topic: usize) -> bool {
        self.num_docs_of_topic(topic) > 0
    }

    /// Level of `topic`.
    pub fn level(&self, topic: usize) -> Result<usize, ModelError> {
        Ok(self.node(topic)?.level)
    }

    /// Parent of `topic`; `None` for the root and for detached dead slots.
    pub fn parent_topic(&self, topic: usize) -> Result<Option<usize>, ModelError> {
        Ok(self.node(topic)?.parent)
    }

    /// Live children of `topic` in ID order.
    pub fn children(&self, topic: usize) -> Result<&[usize], ModelError> {
        self.node(topic)?;
        Ok(&self.tree.children[topic])
    }

    /// Documents whose path passes through `topic`.
    pub fn num_docs_of_topic(&self, topic: usize) -> usize {
        self.tree.num_docs.get(topic).copied().unwrap_or(0)
    }

    /// Live topics in ID order.
    pub fn live_topics(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.tree.nodes.len()).filter(|&t| self.is_live(t))
    }

    /// Live topics at `level` in ID order.
    pub fn topics_at_level(&self, level: usize) -> Vec<usize> {
        self.live_topics()
            .filter(|&t| self.tree.nodes[t].level == level)
            .collect()
    }

    /// Root-to-leaf path of `doc`.
    pub fn path(&self, doc: usize) -> Option<&[usize]> {
        self.paths.get(doc).map(Vec::as_slice)
    }

    /// Token levels of `doc`.
    pub fn token_levels(&self, doc: usize) -> Option<&[u32]> {
        self.levels.get(doc).map(Vec::as_slice)
    }

    /// Level proportions of `doc`.
    pub fn doc_level_dist(&self, doc: usize) -> Option<Vec<f64>> {
        let counts = self.doc_level.get(doc)?;
        let denom = counts.iter().sum::<f64>() + self.params.depth as f64 * self.params.alpha;
        Some(counts.iter().map(|c| (c + self.params.alpha) / denom).collect())
    }

    /// Word distribution of `topic`, indexed by word ID.
    pub fn topic_word_dist(&self, topic: usize) -> Result<Vec<f64>, ModelError> {
        self.node(topic)?;
        let v_eta = self.corpus.vocab_size() as f64 * self.params.eta;
        let denom = self.tree.node_total[topic] + v_eta;
        Ok(self.tree.node_word[topic]
            .iter()
            .map(|&n| (n + self.params.eta) / denom)
            .collect())
    }

    /// The `n` most probable words of `topic`.
    pub fn top_words(&self, topic: usize, n: usize) -> Result<Vec<(String, f64)>, ModelError> {
        let dist = self.topic_word_dist(topic)?;
        Ok(rank_words(&self.corpus, &dist, n))
    }

    /// Tokens assigned to each topic slot.
    pub fn count_by_topic(&self) -> &[usize] {
        &self.token_counts
    }

    /// Log-likelihood per word under the trained distributions.
    pub fn ll_per_word(&self) -> f64 {
        ll_per_word(
            &self.corpus,
            &self.params,
            &self.tree,
            &self.paths,
            &self.doc_level,
        )
    }

    /// `exp(-ll_per_word)`.
    pub fn perplexity(&self) -> f64 {
        (-self.ll_per_word()).exp()
    }
}
