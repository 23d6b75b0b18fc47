//! # topics-taxonomy
//!
//! Document taxonomies and report tables built from trained topic models.
//!
//! ## Features
//! - Label columns from flat models, hierarchical levels, soft assignments
//!   or a curated mix of attributes
//! - Raw topic words or automatic labels as label strings
//! - Taxonomy rows grouped on interned composite keys, sorted per column
//! - Level-N views of hierarchical taxonomies
//! - Topic, coherence, document-topic and soft membership tables
//!
//! Every builder takes models by reference and returns new data; no model is
//! mutated.

pub mod builder;
pub mod error;
pub mod labels;
pub mod tables;

#[cfg(test)]
mod test_support;

pub use builder::{TaxonomyBuilder, TaxonomyRow, TaxonomyTable};
pub use error::TaxonomyError;
pub use labels::{
    empty_topic_label, flat_column, hierarchical_columns, hierarchical_level_column, level_column_name,
    mixed_columns, model_columns, soft_column, ColumnSpec, LabelColumn, Labeling, EMPTY_TOPIC_PREFIX,
    LABEL_DELIMITER, UNASSIGNED_LABEL,
};
pub use tables::{
    score_models, topic_table, CoherenceRow, CoherenceTable, DocumentTopicRow,
    DocumentTopicTable, SoftTopicMembership, SoftTopicRow, TopicRow, TopicTable,
};
