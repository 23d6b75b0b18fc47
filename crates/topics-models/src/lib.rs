//! # topics-models
//!
//! Topic models trained per text attribute, with the evaluation and
//! persistence around them.
//!
//! ## Features
//! - Corpus encoding with optional PMI collocation merging and IDF weighting
//! - Flat LDA and tree-structured hLDA trained by collapsed Gibbs sampling
//! - Topic coherence (u_mass, c_uci, c_npmi, c_v) and topic diversity
//! - Topic-count search over candidate counts
//! - Probability-thresholded document assignment
//! - Relevance-based topic labels
//! - Exact save/load of trained models
//! - Parallel training across attributes

pub mod assign;
pub mod coherence;
pub mod encoding;
pub mod error;
pub mod flat;
pub mod handle;
pub mod hierarchical;
pub mod labeling;
pub mod math;
pub mod model_set;
pub mod ngrams;
pub mod optimizer;
pub mod persistence;
pub mod training;

#[cfg(test)]
mod test_support;

pub use assign::{assign, AssignedTopic, SoftAssignments, TopicAssignment};
pub use coherence::{
    topic_diversity, CoherenceEvaluator, CoherenceReport, LevelCoherence, TopicCoherence,
};
pub use encoding::EncodedCorpus;
pub use error::ModelError;
pub use flat::{FlatModelState, FlatTopicModel, LdaParams, LdaSampler};
pub use handle::{DocumentDistribution, ModelHandle, ModelKind, TopicModelView};
pub use hierarchical::{
    HierarchicalModelState, HierarchicalTopicModel, HldaParams, HldaSampler, TopicNode, ROOT,
};
pub use labeling::{TopicLabeler, TopicLabels};
pub use model_set::{
    model_file_name, EncodingOptions, FlatTrainingOptions, HierarchicalTrainingOptions, ModelSet,
    TopicCount,
};
pub use ngrams::{Phrase, PhraseOptions, PhraseTable};
pub use optimizer::{
    find_topic_count, select_topic_count, CandidateScore, OptimizerConfig, TopicCountSelection,
};
pub use persistence::{load_model, save_model, ModelState, PersistedModel, FORMAT_VERSION};
pub use training::{run_schedule, GibbsSampler, StepReport, TrainingSchedule};
