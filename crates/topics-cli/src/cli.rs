//! CLI argument parsing for the `topics` binary.
//!
//! Flags override every other configuration source.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use topics_taxonomy::ColumnSpec;

/// Topic taxonomy engine
///
/// Trains per-attribute topic models over tokenized documents and derives
/// document taxonomies from them.
#[derive(Parser, Debug)]
#[command(name = "topics")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/topic-taxonomy/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Engine commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train one model per attribute and save them
    Train(TrainArgs),

    /// Search for a topic count for one attribute
    Optimize(OptimizeArgs),

    /// Build a taxonomy from saved models
    Taxonomy(TaxonomyArgs),

    /// Soft-assign documents with a saved flat model
    Assign(AssignArgs),

    /// Topic, coherence and document-topic tables of saved models
    Report(ReportArgs),
}

/// Arguments of `train`
#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Corpus JSON file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory for model files (default: configured output_dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Train hierarchical models instead of flat ones
    #[arg(long)]
    pub hierarchical: bool,

    /// Fixed topic count for flat models
    #[arg(long, conflicts_with = "max_topics")]
    pub topics: Option<usize>,

    /// Search topic counts 1..=M for flat models
    #[arg(long)]
    pub max_topics: Option<usize>,

    /// Depth of hierarchical models
    #[arg(long)]
    pub depth: Option<usize>,

    /// Training iterations
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Iterations per training step
    #[arg(long)]
    pub step: Option<usize>,

    /// Merge collocations before training
    #[arg(long)]
    pub ngrams: bool,

    /// Attributes to train (default: all)
    #[arg(short, long = "attribute")]
    pub attributes: Vec<String>,
}

/// Arguments of `optimize`
#[derive(Args, Debug, Clone)]
pub struct OptimizeArgs {
    /// Corpus JSON file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Attribute to search
    #[arg(short, long)]
    pub attribute: String,

    /// Largest candidate topic count
    #[arg(long)]
    pub max_topics: Option<usize>,
}

/// Arguments of `taxonomy`
#[derive(Args, Debug, Clone)]
pub struct TaxonomyArgs {
    /// Corpus JSON file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory holding model files
    #[arg(short, long)]
    pub models: PathBuf,

    /// Use hierarchical models
    #[arg(long)]
    pub hierarchical: bool,

    /// Only the columns of this hierarchical level
    #[arg(long, requires = "hierarchical")]
    pub level: Option<usize>,

    /// Label topics automatically instead of listing words
    #[arg(long)]
    pub use_labels: bool,

    /// Group flat models by soft assignment at this threshold
    #[arg(long, conflicts_with = "hierarchical")]
    pub threshold: Option<f64>,

    /// Curated columns: ATTRIBUTE or ATTRIBUTE:LEVEL, in order
    #[arg(long = "column", value_parser = parse_column_spec, conflicts_with_all = ["hierarchical", "threshold"])]
    pub columns: Vec<ColumnSpec>,
}

/// Arguments of `assign`
#[derive(Args, Debug, Clone)]
pub struct AssignArgs {
    /// Corpus JSON file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory holding model files
    #[arg(short, long)]
    pub models: PathBuf,

    /// Attribute to assign
    #[arg(short, long)]
    pub attribute: String,

    /// Probability threshold (default from config)
    #[arg(long)]
    pub threshold: Option<f64>,
}

/// Arguments of `report`
#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Corpus JSON file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory holding model files
    #[arg(short, long)]
    pub models: PathBuf,

    /// Use hierarchical models
    #[arg(long)]
    pub hierarchical: bool,
}

/// Parse `ATTRIBUTE` or `ATTRIBUTE:LEVEL`.
pub fn parse_column_spec(value: &str) -> Result<ColumnSpec, String> {
    match value.rsplit_once(':') {
        Some((attribute, level)) if !attribute.is_empty() => {
            let level = level
                .parse::<usize>()
                .map_err(|_| format!("invalid level in column {value:?}"))?;
            Ok(ColumnSpec::Level(attribute.into(), level))
        }
        _ if value.is_empty() => Err("empty column".to_string()),
        _ => Ok(ColumnSpec::Attribute(value.into())),
    }
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_train_flags() {
        let cli = Cli::parse_from([
            "topics",
            "train",
            "--input",
            "corpus.json",
            "--topics",
            "8",
            "--ngrams",
            "-a",
            "Narrative",
            "-a",
            "Cause",
        ]);
        match cli.command {
            Commands::Train(args) => {
                assert_eq!(args.topics, Some(8));
                assert!(args.ngrams);
                assert!(!args.hierarchical);
                assert_eq!(args.attributes, vec!["Narrative", "Cause"]);
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_cli_topics_conflicts_with_max_topics() {
        let result = Cli::try_parse_from([
            "topics",
            "train",
            "--input",
            "c.json",
            "--topics",
            "3",
            "--max-topics",
            "10",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_with_config_and_log_level() {
        let cli = Cli::parse_from([
            "topics",
            "--config",
            "/path/to/config.toml",
            "--log-level",
            "debug",
            "optimize",
            "-i",
            "c.json",
            "-a",
            "Narrative",
        ]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Optimize(_)));
    }

    #[test]
    fn test_cli_taxonomy_level_requires_hierarchical() {
        let result =
            Cli::try_parse_from(["topics", "taxonomy", "-i", "c.json", "-m", "out", "--level", "1"]);
        assert!(result.is_err());

        let cli = Cli::parse_from([
            "topics",
            "taxonomy",
            "-i",
            "c.json",
            "-m",
            "out",
            "--hierarchical",
            "--level",
            "1",
        ]);
        match cli.command {
            Commands::Taxonomy(args) => assert_eq!(args.level, Some(1)),
            _ => panic!("Expected Taxonomy command"),
        }
    }

    #[test]
    fn test_cli_mixed_columns() {
        let cli = Cli::parse_from([
            "topics",
            "taxonomy",
            "-i",
            "c.json",
            "-m",
            "out",
            "--column",
            "Lessons",
            "--column",
            "Driving Event:1",
        ]);
        match cli.command {
            Commands::Taxonomy(args) => assert_eq!(
                args.columns,
                vec![
                    ColumnSpec::Attribute("Lessons".into()),
                    ColumnSpec::Level("Driving Event".into(), 1),
                ]
            ),
            _ => panic!("Expected Taxonomy command"),
        }
    }

    #[test]
    fn test_parse_column_spec_errors() {
        assert!(parse_column_spec("").is_err());
        assert!(parse_column_spec("Cause:x").is_err());
        assert_eq!(
            parse_column_spec(":2"),
            Ok(ColumnSpec::Attribute(":2".into()))
        );
    }
}
