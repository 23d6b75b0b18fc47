//! Model error types.

use thiserror::Error;

/// Errors that can occur while training, scoring or persisting models.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Corpus or settings error
    #[error(transparent)]
    Types(#[from] topics_types::TypesError),

    /// Invalid configuration, rejected before training starts
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error while reading or writing model files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted model does not match the supplied corpus
    #[error("Model/corpus mismatch for {attribute}: {reason}")]
    Inconsistent {
        /// Attribute of the persisted model
        attribute: String,
        /// What differed
        reason: String,
    },

    /// Topic index outside the model
    #[error("Topic {topic} out of range (model has {slots} topic slots)")]
    TopicOutOfRange {
        /// Requested topic
        topic: usize,
        /// Number of topic slots
        slots: usize,
    },

    /// Model not found in a model set
    #[error("No model for attribute: {0}")]
    NotFound(String),
}
