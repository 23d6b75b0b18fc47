//! Per-attribute model collections.
//!
//! Each attribute's model is independent: training runs one task per
//! attribute on the rayon pool, borrowing the corpus read-only, and each
//! task owns the model it produces.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use topics_types::{AttributeCorpus, AttributeId, Corpus, Settings, TermWeight};
use tracing::{info, instrument};

use crate::encoding::EncodedCorpus;
use crate::error::ModelError;
use crate::flat::{FlatTopicModel, LdaParams};
use crate::handle::{ModelHandle, ModelKind, TopicModelView};
use crate::hierarchical::{HierarchicalTopicModel, HldaParams};
use crate::ngrams::{PhraseOptions, PhraseTable};
use crate::optimizer::{find_topic_count, OptimizerConfig};
use crate::persistence::{load_model, save_model};
use crate::training::TrainingSchedule;

/// How the topic count of a flat model is chosen.
#[derive(Debug, Clone)]
pub enum TopicCount {
    /// Use exactly this many topics
    Fixed(usize),
    /// Search for a count first
    Optimize(OptimizerConfig),
}

/// Preprocessing shared by both model kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingOptions {
    /// Collocation pre-pass; `None` disables merging
    pub ngrams: Option<PhraseOptions>,
    /// Token weighting
    pub term_weight: TermWeight,
}

impl EncodingOptions {
    /// Encoding options from application settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            ngrams: settings
                .ngrams
                .enabled
                .then(|| PhraseOptions::from(&settings.ngrams)),
            term_weight: settings.training.term_weight,
        }
    }

    /// Encode one attribute, detecting collocations first when enabled.
    pub fn encode(&self, corpus: AttributeCorpus<'_>) -> Result<EncodedCorpus, ModelError> {
        let phrases = match &self.ngrams {
            Some(options) => PhraseTable::extract(corpus.texts(), options),
            None => PhraseTable::empty(),
        };
        EncodedCorpus::encode(corpus, phrases, self.term_weight)
    }
}

/// Options for training flat models.
#[derive(Debug, Clone)]
pub struct FlatTrainingOptions {
    /// Topic count or search
    pub topic_count: TopicCount,
    /// Document-topic prior
    pub alpha: f64,
    /// Topic-word prior
    pub eta: f64,
    /// Sampler seed
    pub seed: u64,
    /// Training schedule
    pub schedule: TrainingSchedule,
    /// Preprocessing
    pub encoding: EncodingOptions,
}

impl FlatTrainingOptions {
    /// Options from application settings; no explicit count means search.
    pub fn from_settings(settings: &Settings) -> Result<Self, ModelError> {
        let topic_count = match settings.flat.topic_count {
            Some(k) => TopicCount::Fixed(k),
            None => TopicCount::Optimize(OptimizerConfig::from_settings(settings)?),
        };
        Ok(Self {
            topic_count,
            alpha: settings.flat.alpha,
            eta: settings.flat.eta,
            seed: settings.training.seed,
            schedule: TrainingSchedule::try_from(&settings.training)?,
            encoding: EncodingOptions::from_settings(settings),
        })
    }

    fn params(&self, k: usize) -> LdaParams {
        LdaParams {
            k,
            alpha: self.alpha,
            eta: self.eta,
            seed: self.seed,
        }
    }
}

/// Options for training hierarchical models.
#[derive(Debug, Clone)]
pub struct HierarchicalTrainingOptions {
    /// Hyperparameters
    pub params: HldaParams,
    /// Training schedule
    pub schedule: TrainingSchedule,
    /// Preprocessing
    pub encoding: EncodingOptions,
}

impl HierarchicalTrainingOptions {
    /// Options from application settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ModelError> {
        Ok(Self {
            params: HldaParams::new(&settings.hierarchical, settings.training.seed),
            schedule: TrainingSchedule::try_from(&settings.training)?,
            encoding: EncodingOptions::from_settings(settings),
        })
    }
}

/// Trained models keyed by attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSet {
    models: BTreeMap<AttributeId, ModelHandle>,
}

impl ModelSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Train one flat model per attribute in parallel.
    ///
    /// # Errors
    ///
    /// Fails before any training if an attribute is unknown or a fixed
    /// topic count is 0, and otherwise with the first attribute's error.
    #[instrument(skip_all, fields(attributes = attributes.len()))]
    pub fn train_flat_models(
        corpus: &Corpus,
        attributes: &[AttributeId],
        options: &FlatTrainingOptions,
    ) -> Result<Self, ModelError> {
        if let TopicCount::Fixed(k) = options.topic_count {
            options.params(k).validate()?;
        }
        let slices = Self::slices(corpus, attributes)?;

        let trained: Vec<(AttributeId, ModelHandle)> = slices
            .into_par_iter()
            .map(|slice| {
                let encoded = options.encoding.encode(slice)?;
                let k = match &options.topic_count {
                    TopicCount::Fixed(k) => *k,
                    TopicCount::Optimize(config) => find_topic_count(&encoded, config)?.selected,
                };
                let model = FlatTopicModel::train(encoded, options.params(k), &options.schedule)?;
                Ok((slice.attribute().clone(), ModelHandle::Flat(model)))
            })
            .collect::<Result<_, ModelError>>()?;

        info!(models = trained.len(), "Trained flat models");
        Ok(Self {
            models: trained.into_iter().collect(),
        })
    }

    /// Train one hierarchical model per attribute in parallel.
    ///
    /// # Errors
    ///
    /// Fails before any training if an attribute is unknown or the depth is
    /// below 2, and otherwise with the first attribute's error.
    #[instrument(skip_all, fields(attributes = attributes.len()))]
    pub fn train_hierarchical_models(
        corpus: &Corpus,
        attributes: &[AttributeId],
        options: &HierarchicalTrainingOptions,
    ) -> Result<Self, ModelError> {
        options.params.validate()?;
        let slices = Self::slices(corpus, attributes)?;

        let trained: Vec<(AttributeId, ModelHandle)> = slices
            .into_par_iter()
            .map(|slice| {
                let encoded = options.encoding.encode(slice)?;
                let model =
                    HierarchicalTopicModel::train(encoded, options.params, &options.schedule)?;
                Ok((slice.attribute().clone(), ModelHandle::Hierarchical(model)))
            })
            .collect::<Result<_, ModelError>>()?;

        info!(models = trained.len(), "Trained hierarchical models");
        Ok(Self {
            models: trained.into_iter().collect(),
        })
    }

    fn slices<'a>(
        corpus: &'a Corpus,
        attributes: &[AttributeId],
    ) -> Result<Vec<AttributeCorpus<'a>>, ModelError> {
        attributes
            .iter()
            .map(|a| {
                let slice = corpus.attribute(a)?;
                slice.ensure_trainable()?;
                Ok(slice)
            })
            .collect()
    }

    /// Add or replace the model of its attribute.
    pub fn insert(&mut self, model: ModelHandle) -> Option<ModelHandle> {
        self.models.insert(model.attribute().clone(), model)
    }

    /// Model of `attribute`.
    pub fn get(&self, attribute: &AttributeId) -> Option<&ModelHandle> {
        self.models.get(attribute)
    }

    /// Model of `attribute`, or `NotFound`.
    pub fn require(&self, attribute: &AttributeId) -> Result<&ModelHandle, ModelError> {
        self.get(attribute)
            .ok_or_else(|| ModelError::NotFound(attribute.to_string()))
    }

    /// Models in attribute order.
    pub fn iter(&self) -> impl Iterator<Item = (&AttributeId, &ModelHandle)> {
        self.models.iter()
    }

    /// Attributes with a model.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeId> {
        self.models.keys()
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// True when no model is held.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Write every model to `dir` as `<attribute>.<lda|hlda>.json`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` before writing anything when two attributes
    /// sanitize to the same file name.
    pub fn save_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, ModelError> {
        let mut names: BTreeMap<String, &AttributeId> = BTreeMap::new();
        for (attribute, model) in &self.models {
            let name = model_file_name(attribute, model.kind());
            if let Some(other) = names.insert(name.clone(), attribute) {
                return Err(ModelError::InvalidConfig(format!(
                    "attributes '{other}' and '{attribute}' both save to {name}"
                )));
            }
        }

        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(names.len());
        for (name, attribute) in &names {
            let path = dir.join(name);
            save_model(&self.models[*attribute], &path)?;
            written.push(path);
        }
        info!(dir = %dir.display(), models = written.len(), "Saved models");
        Ok(written)
    }

    /// Load every model of `kind` from `dir`, checking each against `corpus`.
    pub fn load_dir(dir: &Path, corpus: &Corpus, kind: ModelKind) -> Result<Self, ModelError> {
        let suffix = format!(".{}.json", kind.tag());
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(&suffix))
            })
            .collect();
        paths.sort();

        let mut set = Self::new();
        for path in paths {
            let model = load_model(&path, corpus)?;
            if model.kind() == kind {
                set.insert(model);
            }
        }
        info!(dir = %dir.display(), models = set.len(), "Loaded models");
        Ok(set)
    }
}

impl FromIterator<ModelHandle> for ModelSet {
    fn from_iter<I: IntoIterator<Item = ModelHandle>>(iter: I) -> Self {
        let mut set = Self::new();
        for model in iter {
            set.insert(model);
        }
        set
    }
}

/// File name of a model; characters unsafe in file names become `_`.
pub fn model_file_name(attribute: &AttributeId, kind: ModelKind) -> String {
    let stem: String = attribute
        .as_str()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}.{}.json", kind.tag())
}
