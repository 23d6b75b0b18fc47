//! End-to-end test infrastructure for the topic taxonomy engine.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the train -> assign -> taxonomy -> save -> load pipeline.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use topics_models::{
    EncodingOptions, FlatTrainingOptions, HierarchicalTrainingOptions, HldaParams, ModelSet,
    TopicCount, TrainingSchedule,
};
use topics_types::{AttributeId, Corpus, TermWeight};

/// Word pools of the synthetic report themes.
pub const THEMES: [&[&str]; 3] = [
    &["engine", "fire", "smoke", "cockpit", "warning", "shutdown"],
    &["gear", "tire", "runway", "brake", "landing", "skid"],
    &["fuel", "leak", "tank", "pump", "pressure", "valve"],
];

/// Attributes of the synthetic corpus.
pub const ATTRIBUTES: [&str; 2] = ["Narrative", "Cause"];

/// Shared test harness for E2E tests.
///
/// Owns a temp directory for model files and a seeded synthetic corpus.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Directory for model files
    pub model_dir: PathBuf,
    /// Corpus every model is trained on
    pub corpus: Corpus,
}

impl TestHarness {
    /// Create a new test harness with 8 documents per theme.
    pub fn new() -> Self {
        Self::with_corpus(synthetic_corpus(8, 7))
    }

    /// Harness around a given corpus.
    pub fn with_corpus(corpus: Corpus) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let model_dir = temp_dir.path().join("models");
        std::fs::create_dir_all(&model_dir).expect("Failed to create model dir");
        Self {
            _temp_dir: temp_dir,
            model_dir,
            corpus,
        }
    }

    /// Every attribute of the corpus.
    pub fn attributes(&self) -> Vec<AttributeId> {
        self.corpus.attribute_ids().cloned().collect()
    }

    /// Train flat models on every attribute.
    pub fn train_flat(&self, topics: usize) -> ModelSet {
        ModelSet::train_flat_models(&self.corpus, &self.attributes(), &flat_options(topics))
            .expect("Failed to train flat models")
    }

    /// Train hierarchical models on every attribute.
    pub fn train_hierarchical(&self, depth: usize) -> ModelSet {
        ModelSet::train_hierarchical_models(
            &self.corpus,
            &self.attributes(),
            &hierarchical_options(depth),
        )
        .expect("Failed to train hierarchical models")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a corpus of `docs_per_theme` documents per theme.
///
/// Document `i` belongs to theme `i % 3` in "Narrative" and to theme
/// `(i + 1) % 3` in "Cause"; each document draws 8 words from its theme.
pub fn synthetic_corpus(docs_per_theme: usize, seed: u64) -> Corpus {
    let mut rng = StdRng::seed_from_u64(seed);
    let total = docs_per_theme * THEMES.len();
    let doc_ids: Vec<String> = (0..total).map(|i| format!("ASRS-{i:04}")).collect();

    let mut draw = |theme: usize| -> Vec<String> {
        let pool = THEMES[theme];
        (0..8)
            .map(|_| pool[rng.random_range(0..pool.len())].to_string())
            .collect()
    };
    let narrative: Vec<Vec<String>> = (0..total).map(|i| draw(i % 3)).collect();
    let cause: Vec<Vec<String>> = (0..total).map(|i| draw((i + 1) % 3)).collect();

    Corpus::builder(doc_ids)
        .attribute(ATTRIBUTES[0], narrative)
        .attribute(ATTRIBUTES[1], cause)
        .build()
        .expect("Synthetic corpus is aligned")
}

fn encoding() -> EncodingOptions {
    EncodingOptions {
        ngrams: None,
        term_weight: TermWeight::One,
    }
}

fn schedule() -> TrainingSchedule {
    TrainingSchedule::new(150, 10).expect("Valid schedule")
}

/// Flat training options with a fixed topic count.
pub fn flat_options(topics: usize) -> FlatTrainingOptions {
    FlatTrainingOptions {
        topic_count: TopicCount::Fixed(topics),
        alpha: 0.1,
        eta: 0.01,
        seed: 42,
        schedule: schedule(),
        encoding: encoding(),
    }
}

/// Hierarchical training options.
pub fn hierarchical_options(depth: usize) -> HierarchicalTrainingOptions {
    HierarchicalTrainingOptions {
        params: HldaParams {
            depth,
            alpha: 0.1,
            eta: 0.01,
            gamma: 0.5,
            seed: 42,
        },
        schedule: schedule(),
        encoding: encoding(),
    }
}
