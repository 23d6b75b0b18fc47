//! Configuration loading for the topic taxonomy engine.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/topic-taxonomy/config.toml.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// How each token contributes to topic counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TermWeight {
    /// Every token counts 1
    One,
    /// Tokens count `ln(N / df)` of their word
    #[default]
    Idf,
}

/// Coherence measure used to score topics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CoherenceMeasure {
    /// Document co-occurrence log-conditional probability
    #[serde(rename = "u_mass")]
    UMass,
    /// Point-wise mutual information over sliding windows
    #[serde(rename = "c_uci")]
    Uci,
    /// Normalized PMI over sliding windows
    #[serde(rename = "c_npmi")]
    Npmi,
    /// Cosine of NPMI context vectors over boolean sliding windows
    #[default]
    #[serde(rename = "c_v")]
    Cv,
}

impl CoherenceMeasure {
    /// Name used in configuration and reports.
    pub fn name(&self) -> &'static str {
        match self {
            CoherenceMeasure::UMass => "u_mass",
            CoherenceMeasure::Uci => "c_uci",
            CoherenceMeasure::Npmi => "c_npmi",
            CoherenceMeasure::Cv => "c_v",
        }
    }

    /// Sliding window size, `None` for document-level co-occurrence.
    pub fn window_size(&self) -> Option<usize> {
        match self {
            CoherenceMeasure::UMass => None,
            CoherenceMeasure::Uci | CoherenceMeasure::Npmi => Some(10),
            CoherenceMeasure::Cv => Some(110),
        }
    }
}

impl fmt::Display for CoherenceMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CoherenceMeasure {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "u_mass" => Ok(CoherenceMeasure::UMass),
            "c_uci" => Ok(CoherenceMeasure::Uci),
            "c_npmi" => Ok(CoherenceMeasure::Npmi),
            "c_v" => Ok(CoherenceMeasure::Cv),
            other => Err(TypesError::Config(format!(
                "unknown coherence measure: {other}"
            ))),
        }
    }
}

/// Iterative training schedule and sampler seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Total Gibbs iterations per model
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Iterations per training increment (progress is reported per step)
    #[serde(default = "default_step")]
    pub step: usize,

    /// Random seed for the samplers
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Token weighting scheme
    #[serde(default)]
    pub term_weight: TermWeight,
}

fn default_iterations() -> usize {
    1000
}
fn default_step() -> usize {
    10
}
fn default_seed() -> u64 {
    42
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            step: default_step(),
            seed: default_seed(),
            term_weight: TermWeight::default(),
        }
    }
}

impl TrainingSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.step == 0 {
            return Err("training.step must be > 0".to_string());
        }
        Ok(())
    }
}

/// Flat (LDA) model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatSettings {
    /// Explicit topic count; `None` runs the topic-count optimizer
    #[serde(default)]
    pub topic_count: Option<usize>,

    /// Largest candidate count tried by the optimizer
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,

    /// Coherence difference below which the optimizer stops
    #[serde(default = "default_optimizer_threshold")]
    pub optimizer_threshold: f64,

    /// Document-topic Dirichlet prior
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Topic-word Dirichlet prior
    #[serde(default = "default_eta")]
    pub eta: f64,
}

fn default_max_topics() -> usize {
    200
}
fn default_optimizer_threshold() -> f64 {
    0.005
}
fn default_alpha() -> f64 {
    0.1
}
fn default_eta() -> f64 {
    0.01
}

impl Default for FlatSettings {
    fn default() -> Self {
        Self {
            topic_count: None,
            max_topics: default_max_topics(),
            optimizer_threshold: default_optimizer_threshold(),
            alpha: default_alpha(),
            eta: default_eta(),
        }
    }
}

impl FlatSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.topic_count == Some(0) {
            return Err("flat.topic_count must be >= 1".to_string());
        }
        if self.topic_count.is_none() && self.max_topics == 0 {
            return Err("flat.max_topics must be >= 1".to_string());
        }
        if self.alpha <= 0.0 || self.eta <= 0.0 {
            return Err("flat.alpha and flat.eta must be > 0".to_string());
        }
        Ok(())
    }
}

/// Hierarchical (hLDA) model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalSettings {
    /// Tree depth including the root level
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Document-level Dirichlet prior
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Topic-word Dirichlet prior
    #[serde(default = "default_eta")]
    pub eta: f64,

    /// Nested CRP concentration
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

fn default_depth() -> usize {
    3
}
fn default_gamma() -> f64 {
    0.1
}

impl Default for HierarchicalSettings {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            alpha: default_alpha(),
            eta: default_eta(),
            gamma: default_gamma(),
        }
    }
}

impl HierarchicalSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.depth < 2 {
            return Err(format!("hierarchical.depth must be >= 2, got {}", self.depth));
        }
        if self.alpha <= 0.0 || self.eta <= 0.0 || self.gamma <= 0.0 {
            return Err("hierarchical.alpha, eta and gamma must be > 0".to_string());
        }
        Ok(())
    }
}

/// Collocation (n-gram) pre-pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgramSettings {
    /// Merge collocations into single tokens before training
    #[serde(default)]
    pub enabled: bool,

    /// Minimum collection frequency of a collocation
    #[serde(default = "default_ngram_min_cf")]
    pub min_cf: usize,

    /// Minimum document frequency of a collocation
    #[serde(default = "default_ngram_min_df")]
    pub min_df: usize,

    /// Maximum collocation length in words
    #[serde(default = "default_ngram_max_len")]
    pub max_len: usize,

    /// Maximum number of collocations kept
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Minimum normalized PMI score
    #[serde(default)]
    pub min_score: f64,
}

fn default_ngram_min_cf() -> usize {
    5
}
fn default_ngram_min_df() -> usize {
    3
}
fn default_ngram_max_len() -> usize {
    3
}
fn default_max_candidates() -> usize {
    5000
}

impl Default for NgramSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_cf: default_ngram_min_cf(),
            min_df: default_ngram_min_df(),
            max_len: default_ngram_max_len(),
            max_candidates: default_max_candidates(),
            min_score: 0.0,
        }
    }
}

impl NgramSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.max_len < 2 {
            return Err("ngrams.max_len must be >= 2".to_string());
        }
        Ok(())
    }
}

/// Soft topic assignment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSettings {
    /// Probability a topic must exceed to be significant
    #[serde(default = "default_assignment_threshold")]
    pub threshold: f64,
}

fn default_assignment_threshold() -> f64 {
    0.01
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            threshold: default_assignment_threshold(),
        }
    }
}

impl AssignmentSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!(
                "assignment.threshold must be 0.0-1.0, got {}",
                self.threshold
            ));
        }
        Ok(())
    }
}

/// Coherence scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceSettings {
    /// Measure name
    #[serde(default)]
    pub measure: CoherenceMeasure,

    /// Top words per topic fed to the measure
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize {
    10
}

impl Default for CoherenceSettings {
    fn default() -> Self {
        Self {
            measure: CoherenceMeasure::default(),
            top_n: default_top_n(),
        }
    }
}

impl CoherenceSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.top_n < 2 {
            return Err(format!(
                "coherence.top_n must be >= 2, got {}",
                self.top_n
            ));
        }
        Ok(())
    }
}

/// Taxonomy label generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomySettings {
    /// Topic words per label
    #[serde(default = "default_top_n")]
    pub num_words: usize,

    /// Use generated topic labels instead of raw topic words
    #[serde(default)]
    pub use_labels: bool,

    /// Word probability cutoff for topic tables
    #[serde(default = "default_p_threshold")]
    pub p_threshold: f64,
}

fn default_p_threshold() -> f64 {
    0.001
}

impl Default for TaxonomySettings {
    fn default() -> Self {
        Self {
            num_words: default_top_n(),
            use_labels: false,
            p_threshold: default_p_threshold(),
        }
    }
}

impl TaxonomySettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_words < 1 {
            return Err("taxonomy.num_words must be >= 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.p_threshold) {
            return Err(format!(
                "taxonomy.p_threshold must be 0.0-1.0, got {}",
                self.p_threshold
            ));
        }
        Ok(())
    }
}

/// Automatic topic labeling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelingSettings {
    /// Minimum collection frequency of a label candidate
    #[serde(default = "default_ngram_min_cf")]
    pub min_cf: usize,

    /// Minimum document frequency of a label candidate
    #[serde(default = "default_ngram_min_df")]
    pub min_df: usize,

    /// Maximum candidate length in words
    #[serde(default = "default_label_max_len")]
    pub max_len: usize,

    /// Maximum number of candidates
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Laplace smoothing for relevance scores
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,

    /// Discriminative coefficient
    #[serde(default = "default_mu")]
    pub mu: f64,

    /// Labels per topic
    #[serde(default = "default_label_top_n")]
    pub top_n: usize,
}

fn default_label_max_len() -> usize {
    5
}
fn default_smoothing() -> f64 {
    1e-2
}
fn default_mu() -> f64 {
    0.25
}
fn default_label_top_n() -> usize {
    3
}

impl Default for LabelingSettings {
    fn default() -> Self {
        Self {
            min_cf: default_ngram_min_cf(),
            min_df: default_ngram_min_df(),
            max_len: default_label_max_len(),
            max_candidates: default_max_candidates(),
            smoothing: default_smoothing(),
            mu: default_mu(),
            top_n: default_label_top_n(),
        }
    }
}

impl LabelingSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.top_n < 1 {
            return Err("labeling.top_n must be >= 1".to_string());
        }
        if self.max_len < 1 || self.max_candidates < 1 {
            return Err("labeling.max_len and labeling.max_candidates must be >= 1".to_string());
        }
        if !(self.smoothing > 0.0) {
            return Err(format!(
                "labeling.smoothing must be > 0, got {}",
                self.smoothing
            ));
        }
        if !(0.0..=1.0).contains(&self.mu) {
            return Err(format!("labeling.mu must be 0.0-1.0, got {}", self.mu));
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Training schedule
    #[serde(default)]
    pub training: TrainingSettings,

    /// Flat model settings
    #[serde(default)]
    pub flat: FlatSettings,

    /// Hierarchical model settings
    #[serde(default)]
    pub hierarchical: HierarchicalSettings,

    /// N-gram pre-pass settings
    #[serde(default)]
    pub ngrams: NgramSettings,

    /// Soft assignment settings
    #[serde(default)]
    pub assignment: AssignmentSettings,

    /// Coherence settings
    #[serde(default)]
    pub coherence: CoherenceSettings,

    /// Taxonomy settings
    #[serde(default)]
    pub taxonomy: TaxonomySettings,

    /// Topic labeling settings
    #[serde(default)]
    pub labeling: LabelingSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for model files and reports
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> String {
    "topic_model_results".to_string()
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/topic-taxonomy/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (TOPICS_*, nested keys split on `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "topic-taxonomy")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("output_dir", default_output_dir())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: TOPICS_LOG_LEVEL, TOPICS_TRAINING__ITERATIONS, TOPICS_FLAT__TOPIC_COUNT
        builder = builder.add_source(
            Environment::with_prefix("TOPICS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), TypesError> {
        self.training.validate().map_err(TypesError::Config)?;
        self.flat.validate().map_err(TypesError::Config)?;
        self.hierarchical.validate().map_err(TypesError::Config)?;
        self.ngrams.validate().map_err(TypesError::Config)?;
        self.assignment.validate().map_err(TypesError::Config)?;
        self.coherence.validate().map_err(TypesError::Config)?;
        self.taxonomy.validate().map_err(TypesError::Config)?;
        self.labeling.validate().map_err(TypesError::Config)?;
        Ok(())
    }

    /// Output directory as a path.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.training.iterations, 1000);
        assert_eq!(settings.training.step, 10);
        assert_eq!(settings.training.term_weight, TermWeight::Idf);
        assert_eq!(settings.flat.topic_count, None);
        assert_eq!(settings.flat.max_topics, 200);
        assert_eq!(settings.hierarchical.depth, 3);
        assert_eq!(settings.coherence.measure, CoherenceMeasure::Cv);
        assert!(!settings.ngrams.enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_cli_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topics.toml");
        std::fs::write(
            &path,
            "log_level = \"debug\"\n[hierarchical]\ndepth = 4\n[coherence]\nmeasure = \"u_mass\"\n",
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.hierarchical.depth, 4);
        assert_eq!(settings.coherence.measure, CoherenceMeasure::UMass);
        assert_eq!(settings.training.iterations, 1000);
    }

    #[test]
    fn test_invalid_depth_rejected() {
        let mut settings = Settings::default();
        settings.hierarchical.depth = 1;
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("depth"));
    }

    #[test]
    fn test_invalid_topic_count_rejected() {
        let mut settings = Settings::default();
        settings.flat.topic_count = Some(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_assignment_threshold_range() {
        let mut config = AssignmentSettings::default();
        assert!(config.validate().is_ok());
        config.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_coherence_top_n_rejected() {
        let mut settings = Settings::default();
        settings.coherence.top_n = 0;
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("coherence.top_n"));
        settings.coherence.top_n = 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_taxonomy_settings_validation() {
        let mut config = TaxonomySettings::default();
        assert!(config.validate().is_ok());
        config.num_words = 0;
        assert!(config.validate().is_err());

        let mut config = TaxonomySettings::default();
        config.p_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_labeling_settings_validation() {
        let mut settings = Settings::default();
        settings.labeling.mu = 1.5;
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("labeling.mu"));

        let mut config = LabelingSettings::default();
        assert!(config.validate().is_ok());
        config.smoothing = -0.01;
        assert!(config.validate().is_err());

        let mut config = LabelingSettings::default();
        config.top_n = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_measure_parsing() {
        assert_eq!("c_npmi".parse::<CoherenceMeasure>().unwrap(), CoherenceMeasure::Npmi);
        assert!("c_w2v".parse::<CoherenceMeasure>().is_err());
        assert_eq!(CoherenceMeasure::Cv.window_size(), Some(110));
        assert_eq!(CoherenceMeasure::UMass.window_size(), None);
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"measure\":\"c_v\""));
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.flat.max_topics, settings.flat.max_topics);
    }
}
