//! Topic taxonomy engine
//!
//! Trains per-attribute topic models over tokenized documents and derives
//! document taxonomies from them.
//!
//! # Usage
//!
//! ```bash
//! topics train --input corpus.json --output models [--hierarchical] [--topics N | --max-topics M]
//! topics optimize --input corpus.json --attribute Narrative [--max-topics M]
//! topics taxonomy --input corpus.json --models models [--hierarchical [--level N]] [--use-labels]
//! topics assign --input corpus.json --models models --attribute Narrative [--threshold P]
//! topics report --input corpus.json --models models [--hierarchical]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/topic-taxonomy/config.toml)
//! 3. Environment variables (TOPICS_*)
//! 4. CLI flags

use anyhow::Result;

use topics_cli::{run, Cli};

fn main() -> Result<()> {
    run(Cli::parse_args())
}
