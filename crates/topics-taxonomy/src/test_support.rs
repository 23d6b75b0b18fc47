//! Small trained models shared by the unit tests.

use topics_models::{
    EncodedCorpus, FlatTopicModel, HierarchicalModelState, HierarchicalTopicModel, HldaParams,
    LdaParams, PhraseTable, TopicNode, TrainingSchedule, ROOT,
};
use topics_types::{Corpus, TermWeight};

/// Twelve documents on two themes, stored under "Narrative" and "Cause".
pub(crate) fn corpus() -> Corpus {
    let engine = "engine fire smoke engine fire cockpit smoke";
    let gear = "gear tire runway gear brake tire runway";
    let ids: Vec<String> = (0..12).map(|i| format!("doc{i}")).collect();
    let texts: Vec<Vec<String>> = (0..12)
        .map(|i| {
            let text = if i % 2 == 0 { engine } else { gear };
            text.split_whitespace().map(str::to_string).collect()
        })
        .collect();
    Corpus::builder(ids)
        .attribute("Narrative", texts.clone())
        .attribute("Cause", texts)
        .build()
        .unwrap()
}

fn encoded(attribute: &str) -> EncodedCorpus {
    let corpus = corpus();
    let slice = corpus.attribute(&attribute.into()).unwrap();
    EncodedCorpus::encode(slice, PhraseTable::empty(), TermWeight::One).unwrap()
}

pub(crate) fn flat_model() -> FlatTopicModel {
    let params = LdaParams {
        k: 2,
        alpha: 0.1,
        eta: 0.01,
        seed: 42,
    };
    let schedule = TrainingSchedule::new(200, 10).unwrap();
    FlatTopicModel::train(encoded("Narrative"), params, &schedule).unwrap()
}

pub(crate) fn hierarchical_model_for(attribute: &str) -> HierarchicalTopicModel {
    let params = HldaParams {
        depth: 3,
        alpha: 0.1,
        eta: 0.01,
        gamma: 0.1,
        seed: 42,
    };
    let schedule = TrainingSchedule::new(50, 10).unwrap();
    HierarchicalTopicModel::train(encoded(attribute), params, &schedule).unwrap()
}

pub(crate) fn hierarchical_model() -> HierarchicalTopicModel {
    hierarchical_model_for("Narrative")
}

/// Depth-3 tree over the "Narrative" documents with live leaves 4, 5 and 6
/// that hold no tokens.
///
/// Topics 1 and 2 split the engine and gear documents. Engine documents
/// `doc0, doc4, doc8` put every token on leaf 3; all other documents keep
/// their tokens on level 1, so their leaves stay empty.
pub(crate) fn hierarchical_model_with_empty_leaves() -> HierarchicalTopicModel {
    let node = |parent: usize, level: usize| TopicNode {
        parent: Some(parent),
        level,
    };
    let nodes = vec![
        TopicNode {
            parent: None,
            level: 0,
        },
        node(ROOT, 1),
        node(ROOT, 1),
        node(1, 2),
        node(1, 2),
        node(2, 2),
        node(2, 2),
    ];
    let corpus = encoded("Narrative");
    let mut paths = Vec::new();
    let mut levels = Vec::new();
    for (d, doc) in corpus.docs().iter().enumerate() {
        let (path, level) = match d % 4 {
            0 => (vec![ROOT, 1, 3], 2),
            2 => (vec![ROOT, 1, 4], 1),
            1 => (vec![ROOT, 2, 5], 1),
            _ => (vec![ROOT, 2, 6], 1),
        };
        paths.push(path);
        levels.push(vec![level; doc.len()]);
    }
    let state = HierarchicalModelState {
        params: HldaParams {
            depth: 3,
            alpha: 0.1,
            eta: 0.01,
            gamma: 0.1,
            seed: 42,
        },
        iterations: 0,
        corpus,
        nodes,
        paths,
        levels,
    };
    HierarchicalTopicModel::from_state(state).unwrap()
}
