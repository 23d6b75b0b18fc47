//! Error types shared by the topic taxonomy crates.

use thiserror::Error;

/// Errors raised while constructing corpora or loading settings.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Corpus or attribute has no documents or no tokens
    #[error("Empty corpus: {0}")]
    EmptyCorpus(String),

    /// Attribute not present in the corpus
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
