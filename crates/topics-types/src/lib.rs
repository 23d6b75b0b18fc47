//! # topics-types
//!
//! Shared domain types for the topic taxonomy engine.
//!
//! This crate defines the data structures every other crate works on:
//! - Identifiers: attributes (text columns) and documents
//! - Corpus: documents already tokenized per attribute, aligned by document ID
//! - Vocabulary: the word <-> index mapping owned by a trained model
//! - Settings: layered configuration for training, assignment and taxonomy output
//!
//! ## Usage
//!
//! ```rust
//! use topics_types::{AttributeId, Corpus};
//!
//! let corpus = Corpus::builder(vec!["d1".into(), "d2".into()])
//!     .attribute("Narrative", vec![
//!         vec!["engine".into(), "fire".into()],
//!         vec!["gear".into(), "collapse".into()],
//!     ])
//!     .build()
//!     .unwrap();
//! assert_eq!(corpus.len(), 2);
//! assert!(corpus.attribute(&AttributeId::from("Narrative")).is_ok());
//! ```

pub mod config;
pub mod corpus;
pub mod error;
pub mod vocabulary;

pub use config::{
    AssignmentSettings, CoherenceMeasure, CoherenceSettings, FlatSettings, HierarchicalSettings,
    LabelingSettings, NgramSettings, Settings, TaxonomySettings, TermWeight, TrainingSettings,
};
pub use corpus::{AttributeCorpus, AttributeId, Corpus, CorpusBuilder, DocumentId};
pub use error::TypesError;
pub use vocabulary::Vocabulary;
