//! End-to-end tests for the train -> assign -> taxonomy -> save -> load pipeline.
//!
//! Every test trains real models on the seeded synthetic corpus and goes
//! through the public APIs of the model and taxonomy crates.

use std::collections::BTreeSet;

use e2e_tests::{hierarchical_options, TestHarness, ATTRIBUTES};
use pretty_assertions::assert_eq;
use topics_models::{
    CoherenceEvaluator, ModelHandle, ModelKind, ModelSet, SoftAssignments, TopicModelView,
};
use topics_taxonomy::{
    hierarchical_columns, mixed_columns, model_columns, soft_column, topic_table, ColumnSpec,
    DocumentTopicTable, LabelColumn, Labeling, TaxonomyBuilder, TaxonomyTable, LABEL_DELIMITER,
};
use topics_types::{AttributeId, CoherenceMeasure};

const WORDS: Labeling<'static> = Labeling::Words { num_words: 3 };

fn columns_of(models: &ModelSet) -> Vec<LabelColumn> {
    models
        .iter()
        .flat_map(|(_, model)| model_columns(model, WORDS).unwrap())
        .collect()
}

fn taxonomy(harness: &TestHarness, models: &ModelSet) -> TaxonomyTable {
    TaxonomyBuilder::new(harness.corpus.doc_ids())
        .columns(columns_of(models))
        .build()
}

fn assert_partition(harness: &TestHarness, table: &TaxonomyTable) {
    let mut seen = BTreeSet::new();
    for row in &table.rows {
        assert_eq!(row.count, row.doc_ids.len());
        for id in &row.doc_ids {
            assert!(seen.insert(id.clone()), "{id} appears in two rows");
        }
    }
    for id in &table.excluded {
        assert!(seen.insert(id.clone()), "{id} is both grouped and excluded");
    }
    assert_eq!(seen.len(), harness.corpus.len());
}

/// Test: flat models survive a save/load cycle with an identical taxonomy.
#[test]
fn test_flat_pipeline_round_trip() {
    let harness = TestHarness::new();
    let models = harness.train_flat(3);
    assert_eq!(models.len(), ATTRIBUTES.len());

    let before = taxonomy(&harness, &models);
    assert_eq!(before.columns, vec!["Cause", "Narrative"]);
    assert_partition(&harness, &before);
    assert!(before.excluded.is_empty());

    let written = models.save_dir(&harness.model_dir).unwrap();
    assert_eq!(written.len(), 2);
    assert!(written.iter().all(|p| p.to_string_lossy().ends_with(".lda.json")));

    let reloaded = ModelSet::load_dir(&harness.model_dir, &harness.corpus, ModelKind::Flat).unwrap();
    assert_eq!(reloaded.len(), 2);
    let after = taxonomy(&harness, &reloaded);
    assert_eq!(before, after);

    for (attribute, model) in models.iter() {
        let other = reloaded.require(attribute).unwrap();
        assert_eq!(model.view().count_by_topic(), other.view().count_by_topic());
        for d in 0..harness.corpus.len() {
            assert_eq!(
                model.view().document_distribution(d),
                other.view().document_distribution(d)
            );
        }
    }
}

/// Test: hierarchical level views are unchanged after reload.
#[test]
fn test_hierarchical_level_view_survives_reload() {
    let harness = TestHarness::new();
    let models = harness.train_hierarchical(3);
    models.save_dir(&harness.model_dir).unwrap();

    let narrative = AttributeId::from("Narrative");
    let model = models.require(&narrative).unwrap().as_hierarchical().unwrap();
    let columns = hierarchical_columns(model, WORDS).unwrap();
    assert_eq!(
        columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        vec!["Narrative Level 1", "Narrative Level 2"]
    );
    let builder = TaxonomyBuilder::new(harness.corpus.doc_ids()).columns(columns);
    let level_one = builder.level_view(1).unwrap();
    assert_eq!(level_one.columns, vec!["Narrative Level 1"]);
    assert_partition(&harness, &level_one);
    assert!(builder.level_view(3).is_err());

    let reloaded =
        ModelSet::load_dir(&harness.model_dir, &harness.corpus, ModelKind::Hierarchical).unwrap();
    let model = reloaded.require(&narrative).unwrap().as_hierarchical().unwrap();
    let again = TaxonomyBuilder::new(harness.corpus.doc_ids())
        .columns(hierarchical_columns(model, WORDS).unwrap())
        .level_view(1)
        .unwrap();
    assert_eq!(level_one, again);

    // Flat and hierarchical files never shadow each other.
    let flat = ModelSet::load_dir(&harness.model_dir, &harness.corpus, ModelKind::Flat).unwrap();
    assert!(flat.is_empty());
}

/// Test: every path node of a document is a live topic one level deeper.
#[test]
fn test_hierarchical_paths_are_consistent() {
    let harness = TestHarness::new();
    let models = harness.train_hierarchical(3);

    for (_, handle) in models.iter() {
        let model = handle.as_hierarchical().unwrap();
        for d in 0..harness.corpus.len() {
            let path = model.path(d).unwrap();
            assert_eq!(path.len(), 3);
            for (level, &topic) in path.iter().enumerate() {
                assert!(model.is_live(topic));
                assert_eq!(model.level(topic).unwrap(), level);
                if level > 0 {
                    assert_eq!(model.parent_topic(topic).unwrap(), Some(path[level - 1]));
                }
            }
        }
    }
}

/// Test: a curated mix of flat and hierarchical columns keeps request order.
#[test]
fn test_mixed_taxonomy() {
    let harness = TestHarness::new();
    let flat = harness.train_flat(3);
    let hierarchical = ModelSet::train_hierarchical_models(
        &harness.corpus,
        &[AttributeId::from("Cause")],
        &hierarchical_options(3),
    )
    .unwrap();

    let mut models = ModelSet::new();
    models.insert(flat.require(&"Narrative".into()).unwrap().clone());
    for (_, model) in hierarchical.iter() {
        models.insert(model.clone());
    }

    let specs = vec![
        ColumnSpec::Level("Cause".into(), 2),
        ColumnSpec::Attribute("Narrative".into()),
    ];
    let columns = mixed_columns(&models, &specs, WORDS).unwrap();
    let table = TaxonomyBuilder::new(harness.corpus.doc_ids())
        .columns(columns)
        .build();
    assert_eq!(table.columns, vec!["Cause Level 2", "Narrative"]);
    assert_partition(&harness, &table);
    assert!(table.excluded.is_empty());

    let bad = vec![ColumnSpec::Level("Narrative".into(), 1)];
    assert!(mixed_columns(&models, &bad, WORDS).is_err());

    // A column without a model excludes every document.
    let missing = vec![ColumnSpec::Attribute("Lessons".into())];
    let table = TaxonomyBuilder::new(harness.corpus.doc_ids())
        .columns(mixed_columns(&models, &missing, WORDS).unwrap())
        .build();
    assert!(table.is_empty());
    assert_eq!(table.excluded.len(), harness.corpus.len());
}

/// Test: soft assignment after topic reduction labels every document.
#[test]
fn test_soft_assignment_after_reduction() {
    let harness = TestHarness::new();
    let models = harness.train_flat(4);
    let model = models.require(&"Narrative".into()).unwrap().as_flat().unwrap();

    let reduced = model.reduce_topics(2).unwrap();
    assert_eq!(reduced.num_topics(), 2);
    assert_eq!(
        reduced.count_by_topic().iter().sum::<usize>(),
        model.count_by_topic().iter().sum::<usize>()
    );

    let soft = SoftAssignments::for_model(&reduced, 0.3);
    assert_eq!(soft.assignments.len(), harness.corpus.len());
    for assignment in &soft.assignments {
        for topic in assignment.significant.iter().filter_map(|t| t.topic()) {
            assert!(topic < 2);
        }
    }

    let column = soft_column(&reduced, &soft, WORDS).unwrap();
    assert_eq!(column.labels.len(), harness.corpus.len());
    let table = TaxonomyBuilder::new(harness.corpus.doc_ids())
        .column(column)
        .build();
    assert_partition(&harness, &table);
    assert!(table.len() <= 3);
    for row in &table.rows {
        assert!(row.labels[0].split(LABEL_DELIMITER).count() <= 3);
    }
}

/// Test: topic and document-topic tables cover the trained models.
#[test]
fn test_report_tables() {
    let harness = TestHarness::new();
    let models = harness.train_flat(3);
    let evaluator = CoherenceEvaluator::new(CoherenceMeasure::Cv, 5);

    for (_, model) in models.iter() {
        let report = evaluator.score(model.view()).unwrap();
        let table = topic_table(model, Some(&report), 0.0).unwrap();
        assert_eq!(table.rows.len(), 3);
        let docs: usize = table.rows.iter().map(|r| r.num_docs).sum();
        assert_eq!(docs, harness.corpus.len());
        assert!(matches!(model, ModelHandle::Flat(_)));
    }

    let documents = DocumentTopicTable::from_models(&models).unwrap();
    assert_eq!(documents.rows.len(), harness.corpus.len());
}
