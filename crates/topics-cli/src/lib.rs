//! Topic taxonomy command-line library.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (train, optimize, taxonomy, assign, report)

pub mod cli;
pub mod commands;

pub use cli::{AssignArgs, Cli, Commands, OptimizeArgs, ReportArgs, TaxonomyArgs, TrainArgs};
pub use commands::{
    apply_train_overrides, assign, build_taxonomy, init_logging, read_corpus, report, run, train,
};
