//! Command implementations for the `topics` binary.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::info;

use topics_models::{
    find_topic_count, model_file_name, CoherenceEvaluator, EncodingOptions, FlatTrainingOptions,
    HierarchicalTrainingOptions, ModelHandle, ModelKind, ModelSet, OptimizerConfig,
    SoftAssignments, TopicAssignment, TopicLabeler, TopicLabels, TopicModelView,
};
use topics_taxonomy::{
    mixed_columns, model_columns, score_models, soft_column, topic_table, ColumnSpec,
    CoherenceTable, DocumentTopicTable, LabelColumn, Labeling, SoftTopicMembership,
    TaxonomyBuilder, TaxonomyTable, TopicTable,
};
use topics_types::{AttributeId, Corpus, Settings};

use crate::cli::{AssignArgs, Cli, Commands, OptimizeArgs, ReportArgs, TaxonomyArgs, TrainArgs};

/// Run a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(log_level) = cli.log_level {
        settings.log_level = log_level;
    }
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Train(args) => handle_train(settings, args),
        Commands::Optimize(args) => handle_optimize(settings, args),
        Commands::Taxonomy(args) => handle_taxonomy(settings, args),
        Commands::Assign(args) => handle_assign(settings, args),
        Commands::Report(args) => handle_report(settings, args),
    }
}

/// Install the global tracing subscriber; `RUST_LOG` wins over `log_level`.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Read a corpus JSON file.
pub fn read_corpus(path: &Path) -> Result<Corpus> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Corpus::from_json(&bytes).with_context(|| format!("Invalid corpus in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

fn select_attributes(corpus: &Corpus, requested: &[String]) -> Vec<AttributeId> {
    if requested.is_empty() {
        corpus.attribute_ids().cloned().collect()
    } else {
        requested.iter().map(|a| AttributeId::from(a.as_str())).collect()
    }
}

/// Summary of one trained model.
#[derive(Debug, Serialize)]
pub struct TrainedModel {
    /// Attribute of the model
    pub attribute: AttributeId,
    /// Model kind
    pub kind: ModelKind,
    /// Reportable topics after training
    pub topics: usize,
    /// Log-likelihood per word
    pub ll_per_word: f64,
    /// Saved model file
    pub file: PathBuf,
}

/// Apply `train` flags on top of the loaded settings.
pub fn apply_train_overrides(settings: &mut Settings, args: &TrainArgs) -> Result<()> {
    if let Some(k) = args.topics {
        settings.flat.topic_count = Some(k);
    }
    if let Some(max) = args.max_topics {
        settings.flat.topic_count = None;
        settings.flat.max_topics = max;
    }
    if let Some(depth) = args.depth {
        settings.hierarchical.depth = depth;
    }
    if let Some(iterations) = args.iterations {
        settings.training.iterations = iterations;
    }
    if let Some(step) = args.step {
        settings.training.step = step;
    }
    if args.ngrams {
        settings.ngrams.enabled = true;
    }
    if let Some(output) = &args.output {
        settings.output_dir = output.to_string_lossy().into_owned();
    }
    settings.validate().context("Invalid configuration")?;
    Ok(())
}

/// Train and save one model per attribute.
pub fn train(settings: &Settings, args: &TrainArgs, corpus: &Corpus) -> Result<Vec<TrainedModel>> {
    let attributes = select_attributes(corpus, &args.attributes);
    let models = if args.hierarchical {
        let options = HierarchicalTrainingOptions::from_settings(settings)?;
        ModelSet::train_hierarchical_models(corpus, &attributes, &options)?
    } else {
        let options = FlatTrainingOptions::from_settings(settings)?;
        ModelSet::train_flat_models(corpus, &attributes, &options)?
    };

    let dir = settings.output_path();
    models
        .save_dir(&dir)
        .with_context(|| format!("Failed to save models to {}", dir.display()))?;

    Ok(models
        .iter()
        .map(|(attribute, model)| TrainedModel {
            attribute: attribute.clone(),
            kind: model.kind(),
            topics: model.reportable_topics().len(),
            ll_per_word: model.ll_per_word(),
            file: dir.join(model_file_name(attribute, model.kind())),
        })
        .collect())
}

fn handle_train(mut settings: Settings, args: TrainArgs) -> Result<()> {
    apply_train_overrides(&mut settings, &args)?;
    let corpus = read_corpus(&args.input)?;
    info!(documents = corpus.len(), hierarchical = args.hierarchical, "Training");
    let trained = train(&settings, &args, &corpus)?;
    print_json(&trained)
}

fn handle_optimize(mut settings: Settings, args: OptimizeArgs) -> Result<()> {
    if let Some(max) = args.max_topics {
        settings.flat.max_topics = max;
    }
    let corpus = read_corpus(&args.input)?;
    let slice = corpus.attribute(&AttributeId::from(args.attribute.as_str()))?;
    let encoded = EncodingOptions::from_settings(&settings).encode(slice)?;
    let config = OptimizerConfig::from_settings(&settings)?;
    let selection = find_topic_count(&encoded, &config)?;
    print_json(&selection)
}

fn load_models(dir: &Path, corpus: &Corpus, kind: ModelKind) -> Result<ModelSet> {
    let models = ModelSet::load_dir(dir, corpus, kind)
        .with_context(|| format!("Failed to load models from {}", dir.display()))?;
    if models.is_empty() {
        bail!("No {} models in {}", kind.tag(), dir.display());
    }
    Ok(models)
}

fn label_models(models: &ModelSet, settings: &Settings) -> Result<BTreeMap<AttributeId, TopicLabels>> {
    let labeler = TopicLabeler::new(settings.labeling.clone());
    models
        .iter()
        .map(|(attribute, model)| Ok((attribute.clone(), labeler.label_topics(model)?)))
        .collect()
}

/// Build the taxonomy requested by `args` from loaded models.
pub fn build_taxonomy(settings: &Settings, args: &TaxonomyArgs, corpus: &Corpus) -> Result<TaxonomyTable> {
    let models = if args.columns.is_empty() {
        let kind = if args.hierarchical {
            ModelKind::Hierarchical
        } else {
            ModelKind::Flat
        };
        load_models(&args.models, corpus, kind)?
    } else {
        load_mixed_models(&args.models, corpus, &args.columns)?
    };

    let labels = if args.use_labels || settings.taxonomy.use_labels {
        Some(label_models(&models, settings)?)
    } else {
        None
    };
    let labeling = match &labels {
        Some(labels) => Labeling::Labels(labels),
        None => Labeling::Words {
            num_words: settings.taxonomy.num_words,
        },
    };

    let columns: Vec<LabelColumn> = if !args.columns.is_empty() {
        mixed_columns(&models, &args.columns, labeling)?
    } else if let Some(threshold) = args.threshold {
        let mut columns = Vec::new();
        for (_, model) in models.iter() {
            if let ModelHandle::Flat(m) = model {
                let assignments = SoftAssignments::for_model(m, threshold);
                columns.push(soft_column(m, &assignments, labeling)?);
            }
        }
        columns
    } else {
        let mut columns = Vec::new();
        for (_, model) in models.iter() {
            columns.extend(model_columns(model, labeling)?);
        }
        columns
    };

    let builder = TaxonomyBuilder::new(corpus.doc_ids()).columns(columns);
    match args.level {
        Some(level) => Ok(builder.level_view(level)?),
        None => Ok(builder.build()),
    }
}

/// Flat and hierarchical models as needed by a curated column list.
///
/// An attribute resolves to one model; asking for it both as a level and
/// as a flat column is an error.
fn load_mixed_models(dir: &Path, corpus: &Corpus, specs: &[ColumnSpec]) -> Result<ModelSet> {
    let flat = ModelSet::load_dir(dir, corpus, ModelKind::Flat)?;
    let hierarchical = ModelSet::load_dir(dir, corpus, ModelKind::Hierarchical)?;
    let mut models = ModelSet::new();
    for spec in specs {
        let (attribute, model) = match spec {
            ColumnSpec::Level(attribute, _) => (attribute, hierarchical.get(attribute)),
            ColumnSpec::Attribute(attribute) => (
                attribute,
                flat.get(attribute).or_else(|| hierarchical.get(attribute)),
            ),
        };
        let Some(model) = model else {
            continue;
        };
        if let Some(existing) = models.get(attribute) {
            if existing.kind() != model.kind() {
                bail!(
                    "Attribute '{attribute}' requested as both {} and {} columns",
                    existing.kind().tag(),
                    model.kind().tag()
                );
            }
            continue;
        }
        models.insert(model.clone());
    }
    Ok(models)
}

fn handle_taxonomy(settings: Settings, args: TaxonomyArgs) -> Result<()> {
    let corpus = read_corpus(&args.input)?;
    let table = build_taxonomy(&settings, &args, &corpus)?;
    info!(rows = table.len(), excluded = table.excluded.len(), "Built taxonomy");
    print_json(&table)
}

/// Soft assignments of one attribute.
#[derive(Debug, Serialize)]
pub struct AssignOutput {
    /// Documents per significant topic
    pub membership: SoftTopicMembership,
    /// Assignment per document, in corpus order
    pub assignments: Vec<TopicAssignment>,
}

/// Soft-assign every document of one attribute with its saved flat model.
pub fn assign(settings: &Settings, args: &AssignArgs, corpus: &Corpus) -> Result<AssignOutput> {
    let threshold = args.threshold.unwrap_or(settings.assignment.threshold);
    let models = load_models(&args.models, corpus, ModelKind::Flat)?;
    let attribute = AttributeId::from(args.attribute.as_str());
    let Some(model) = models.require(&attribute)?.as_flat() else {
        bail!("Model for {attribute} is not a flat model");
    };
    let assignments = SoftAssignments::for_model(model, threshold);
    Ok(AssignOutput {
        membership: SoftTopicMembership::new(attribute, &assignments),
        assignments: assignments.assignments,
    })
}

fn handle_assign(settings: Settings, args: AssignArgs) -> Result<()> {
    let corpus = read_corpus(&args.input)?;
    let output = assign(&settings, &args, &corpus)?;
    print_json(&output)
}

/// Report tables of a model directory.
#[derive(Debug, Serialize)]
pub struct Report {
    /// One topic table per attribute
    pub topics: Vec<TopicTable>,
    /// Coherence per attribute and level
    pub coherence: CoherenceTable,
    /// Model output per document
    pub documents: DocumentTopicTable,
}

/// Topic, coherence and document-topic tables of every saved model.
pub fn report(settings: &Settings, args: &ReportArgs, corpus: &Corpus) -> Result<Report> {
    let kind = if args.hierarchical {
        ModelKind::Hierarchical
    } else {
        ModelKind::Flat
    };
    let models = load_models(&args.models, corpus, kind)?;
    let reports = score_models(&models, &CoherenceEvaluator::from(&settings.coherence))?;

    let topics = models
        .iter()
        .map(|(attribute, model)| {
            topic_table(model, reports.get(attribute), settings.taxonomy.p_threshold)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Report {
        topics,
        coherence: CoherenceTable::from_reports(&reports),
        documents: DocumentTopicTable::from_models(&models)?,
    })
}

fn handle_report(settings: Settings, args: ReportArgs) -> Result<()> {
    let corpus = read_corpus(&args.input)?;
    let report = report(&settings, &args, &corpus)?;
    print_json(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Corpus {
        let engine = "engine fire smoke engine fire cockpit smoke";
        let gear = "gear tire runway gear brake tire runway";
        let ids: Vec<String> = (0..8).map(|i| format!("r{i}")).collect();
        let texts: Vec<Vec<String>> = (0..8)
            .map(|i| {
                let text = if i % 2 == 0 { engine } else { gear };
                text.split_whitespace().map(str::to_string).collect()
            })
            .collect();
        Corpus::builder(ids)
            .attribute("Narrative", texts)
            .build()
            .unwrap()
    }

    fn train_args(output: &Path, hierarchical: bool) -> TrainArgs {
        TrainArgs {
            input: PathBuf::from("unused.json"),
            output: Some(output.to_path_buf()),
            hierarchical,
            topics: Some(2),
            max_topics: None,
            depth: Some(3),
            iterations: Some(30),
            step: Some(10),
            ngrams: false,
            attributes: Vec::new(),
        }
    }

    #[test]
    fn test_train_overrides_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        let args = train_args(dir.path(), false);
        apply_train_overrides(&mut settings, &args).unwrap();
        assert_eq!(settings.flat.topic_count, Some(2));
        assert_eq!(settings.training.iterations, 30);

        let trained = train(&settings, &args, &corpus()).unwrap();
        assert_eq!(trained.len(), 1);
        assert_eq!(trained[0].kind, ModelKind::Flat);
        assert!(trained[0].file.exists());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        let mut args = train_args(dir.path(), true);
        args.depth = Some(1);
        assert!(apply_train_overrides(&mut settings, &args).is_err());
    }

    #[test]
    fn test_taxonomy_assign_and_report_from_saved_models() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus();
        let mut settings = Settings::default();
        let args = train_args(dir.path(), false);
        apply_train_overrides(&mut settings, &args).unwrap();
        train(&settings, &args, &corpus).unwrap();

        let taxonomy_args = TaxonomyArgs {
            input: PathBuf::from("unused.json"),
            models: dir.path().to_path_buf(),
            hierarchical: false,
            level: None,
            use_labels: false,
            threshold: None,
            columns: Vec::new(),
        };
        let table = build_taxonomy(&settings, &taxonomy_args, &corpus).unwrap();
        assert_eq!(table.columns, vec!["Narrative".to_string()]);
        assert_eq!(table.grouped_documents(), 8);

        let assign_args = AssignArgs {
            input: PathBuf::from("unused.json"),
            models: dir.path().to_path_buf(),
            attribute: "Narrative".to_string(),
            threshold: Some(0.3),
        };
        let output = assign(&settings, &assign_args, &corpus).unwrap();
        assert_eq!(output.assignments.len(), 8);

        let report_args = ReportArgs {
            input: PathBuf::from("unused.json"),
            models: dir.path().to_path_buf(),
            hierarchical: false,
        };
        let report = report(&settings, &report_args, &corpus).unwrap();
        assert_eq!(report.topics.len(), 1);
        assert_eq!(report.documents.rows.len(), 8);
    }

    #[test]
    fn test_conflicting_column_kinds_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus();
        for hierarchical in [false, true] {
            let mut settings = Settings::default();
            let args = train_args(dir.path(), hierarchical);
            apply_train_overrides(&mut settings, &args).unwrap();
            train(&settings, &args, &corpus).unwrap();
        }

        let mut taxonomy_args = TaxonomyArgs {
            input: PathBuf::from("unused.json"),
            models: dir.path().to_path_buf(),
            hierarchical: false,
            level: None,
            use_labels: false,
            threshold: None,
            columns: vec![
                ColumnSpec::Level("Narrative".into(), 1),
                ColumnSpec::Attribute("Narrative".into()),
            ],
        };
        let err = build_taxonomy(&Settings::default(), &taxonomy_args, &corpus).unwrap_err();
        assert!(err.to_string().contains("both hlda and lda"));

        // The same kind twice is fine.
        taxonomy_args.columns = vec![
            ColumnSpec::Level("Narrative".into(), 1),
            ColumnSpec::Level("Narrative".into(), 2),
        ];
        let table = build_taxonomy(&Settings::default(), &taxonomy_args, &corpus).unwrap();
        assert_eq!(table.columns.len(), 2);
    }

    #[test]
    fn test_missing_model_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = AssignArgs {
            input: PathBuf::from("unused.json"),
            models: dir.path().to_path_buf(),
            attribute: "Narrative".to_string(),
            threshold: None,
        };
        let err = assign(&Settings::default(), &args, &corpus()).unwrap_err();
        assert!(err.to_string().contains("No lda models"));
    }
}
