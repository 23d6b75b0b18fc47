//! Small corpora shared by unit tests.

use topics_types::{Corpus, TermWeight};

use crate::encoding::EncodedCorpus;
use crate::ngrams::PhraseTable;

const ENGINE: &str = "engine fire smoke engine fire cockpit smoke";
const GEAR: &str = "gear tire runway gear brake tire runway";

/// Twelve documents alternating between two disjoint themes.
pub(crate) fn two_theme_raw() -> Corpus {
    let mut ids = Vec::new();
    let mut texts = Vec::new();
    for i in 0..12 {
        ids.push(format!("doc{i}"));
        let text = if i % 2 == 0 { ENGINE } else { GEAR };
        texts.push(text.split_whitespace().map(str::to_string).collect());
    }
    Corpus::builder(ids)
        .attribute("Narrative", texts)
        .build()
        .unwrap()
}

/// [`two_theme_raw`] encoded with unit term weights.
pub(crate) fn two_theme_corpus() -> EncodedCorpus {
    let corpus = two_theme_raw();
    EncodedCorpus::encode(
        corpus.attribute(&"Narrative".into()).unwrap(),
        PhraseTable::empty(),
        TermWeight::One,
    )
    .unwrap()
}
