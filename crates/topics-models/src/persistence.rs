//! Model files.
//!
//! A model file holds the integer state of a trained model (encoded
//! documents, vocabulary, phrase table, per-token assignments and, for
//! hierarchical models, the node table and document paths). Every count and
//! distribution is recomputed from that state on load, so a loaded model is
//! identical to the saved one.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use topics_types::Corpus;
use tracing::{debug, instrument};

use crate::error::ModelError;
use crate::flat::{FlatModelState, FlatTopicModel};
use crate::handle::ModelHandle;
use crate::hierarchical::{HierarchicalModelState, HierarchicalTopicModel};

/// Version written to new model files.
pub const FORMAT_VERSION: u32 = 1;

/// Persisted state of either model kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// Flat model state
    Flat(FlatModelState),
    /// Hierarchical model state
    Hierarchical(HierarchicalModelState),
}

/// Contents of a model file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedModel {
    /// File format version
    pub format_version: u32,
    /// When the file was written
    pub saved_at: DateTime<Utc>,
    /// Model state
    pub state: ModelState,
}

impl ModelHandle {
    /// Persisted state of the wrapped model.
    pub fn state(&self) -> ModelState {
        match self {
            ModelHandle::Flat(m) => ModelState::Flat(m.state()),
            ModelHandle::Hierarchical(m) => ModelState::Hierarchical(m.state()),
        }
    }

    /// Rebuild a model from persisted state.
    pub fn from_state(state: ModelState) -> Result<Self, ModelError> {
        Ok(match state {
            ModelState::Flat(s) => ModelHandle::Flat(FlatTopicModel::from_state(s)?),
            ModelState::Hierarchical(s) => {
                ModelHandle::Hierarchical(HierarchicalTopicModel::from_state(s)?)
            }
        })
    }
}

/// Write `model` to `path`, creating parent directories.
#[instrument(skip(model), fields(attribute = %model.view().attribute()))]
pub fn save_model(model: &ModelHandle, path: &Path) -> Result<(), ModelError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let persisted = PersistedModel {
        format_version: FORMAT_VERSION,
        saved_at: Utc::now(),
        state: model.state(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &persisted)?;
    writer.flush()?;
    debug!(path = %path.display(), "Saved model");
    Ok(())
}

/// Load a model and check it against the corpus it was trained on.
///
/// # Errors
///
/// Returns `Inconsistent` when the file's documents, IDs or vocabulary do
/// not match `corpus`, and `UnknownAttribute` when `corpus` lacks the
/// model's attribute.
#[instrument(skip(corpus))]
pub fn load_model(path: &Path, corpus: &Corpus) -> Result<ModelHandle, ModelError> {
    let reader = BufReader::new(File::open(path)?);
    let persisted: PersistedModel = serde_json::from_reader(reader)?;
    if persisted.format_version != FORMAT_VERSION {
        return Err(ModelError::InvalidConfig(format!(
            "unsupported model format version {} in {}",
            persisted.format_version,
            path.display()
        )));
    }

    let model = ModelHandle::from_state(persisted.state)?;
    let encoded = model.view().corpus();
    encoded.verify_against(corpus.attribute(encoded.attribute())?)?;
    debug!(
        attribute = %encoded.attribute(),
        saved_at = %persisted.saved_at,
        "Loaded model"
    );
    Ok(model)
}
