//! Taxonomy error types.

use thiserror::Error;

/// Errors that can occur while building label columns and tables.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    /// Model query failed
    #[error(transparent)]
    Model(#[from] topics_models::ModelError),

    /// Requested hierarchical level outside 1..depth
    #[error("Level {level} out of range for {attribute} (depth {depth})")]
    InvalidLevel {
        /// Attribute of the model
        attribute: String,
        /// Requested level
        level: usize,
        /// Depth of the model
        depth: usize,
    },

    /// Column requested from a model of the wrong kind
    #[error("Invalid column for {attribute}: {reason}")]
    InvalidColumn {
        /// Attribute of the model
        attribute: String,
        /// What was wrong
        reason: String,
    },

    /// A view selected no columns
    #[error("No label columns: {0}")]
    NoColumns(String),
}
