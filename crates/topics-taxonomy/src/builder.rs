//! Taxonomy builder.
//!
//! Groups documents by the combination of their labels across the chosen
//! columns. Labels are interned per column in sorted order, so a row key is
//! a tuple of label IDs whose ordering is the lexicographic ordering of the
//! label strings, column by column.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use topics_types::DocumentId;
use tracing::{debug, instrument, warn};

use crate::error::TaxonomyError;
use crate::labels::LabelColumn;

/// Documents sharing one combination of labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyRow {
    /// One label per column, in column order
    pub labels: Vec<String>,
    /// Documents of the row, in corpus order
    pub doc_ids: Vec<DocumentId>,
    /// Number of documents
    pub count: usize,
}

/// Deduplicated grouping of documents by label combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyTable {
    /// Column headers
    pub columns: Vec<String>,
    /// Rows sorted by label values, column by column
    pub rows: Vec<TaxonomyRow>,
    /// Documents left out because a column had no label for them
    pub excluded: Vec<DocumentId>,
}

impl TaxonomyTable {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no document was grouped.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row holding `doc`.
    pub fn row_of(&self, doc: &str) -> Option<&TaxonomyRow> {
        self.rows
            .iter()
            .find(|row| row.doc_ids.iter().any(|id| id == doc))
    }

    /// Documents grouped into some row.
    pub fn grouped_documents(&self) -> usize {
        self.rows.iter().map(|row| row.count).sum()
    }
}

/// Per-column label interning.
struct LabelInterner<'c> {
    labels: Vec<&'c str>,
    ids: HashMap<&'c str, u32>,
}

impl<'c> LabelInterner<'c> {
    fn new(column: &'c LabelColumn) -> Self {
        let mut labels: Vec<&str> = column.labels.values().map(String::as_str).collect();
        labels.sort_unstable();
        labels.dedup();
        let ids = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| (label, i as u32))
            .collect();
        Self { labels, ids }
    }

    fn id(&self, label: &str) -> Option<u32> {
        self.ids.get(label).copied()
    }

    fn label(&self, id: u32) -> &'c str {
        self.labels[id as usize]
    }
}

/// Builds taxonomy tables over a fixed document list.
#[derive(Debug, Clone)]
pub struct TaxonomyBuilder<'a> {
    doc_ids: &'a [DocumentId],
    columns: Vec<LabelColumn>,
}

impl<'a> TaxonomyBuilder<'a> {
    /// Builder over `doc_ids`, in corpus order.
    pub fn new(doc_ids: &'a [DocumentId]) -> Self {
        Self {
            doc_ids,
            columns: Vec::new(),
        }
    }

    /// Append a column.
    pub fn column(mut self, column: LabelColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Append columns in order.
    pub fn columns(mut self, columns: impl IntoIterator<Item = LabelColumn>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Column headers in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Group every document over all columns.
    pub fn build(&self) -> TaxonomyTable {
        let columns: Vec<&LabelColumn> = self.columns.iter().collect();
        group(self.doc_ids, &columns)
    }

    /// Group every document over the columns of one hierarchical level.
    ///
    /// # Errors
    ///
    /// Returns `NoColumns` when no column belongs to `level`.
    pub fn level_view(&self, level: usize) -> Result<TaxonomyTable, TaxonomyError> {
        let columns: Vec<&LabelColumn> = self
            .columns
            .iter()
            .filter(|c| c.level == Some(level))
            .collect();
        if columns.is_empty() {
            return Err(TaxonomyError::NoColumns(format!("no column at level {level}")));
        }
        Ok(group(self.doc_ids, &columns))
    }
}

#[instrument(skip_all, fields(docs = doc_ids.len(), columns = columns.len()))]
fn group(doc_ids: &[DocumentId], columns: &[&LabelColumn]) -> TaxonomyTable {
    let interners: Vec<LabelInterner<'_>> = columns.iter().map(|c| LabelInterner::new(c)).collect();

    let mut groups: BTreeMap<Vec<u32>, Vec<DocumentId>> = BTreeMap::new();
    let mut excluded = Vec::new();
    for doc in doc_ids {
        let key: Option<Vec<u32>> = columns
            .iter()
            .zip(&interners)
            .map(|(column, interner)| column.label(doc).and_then(|l| interner.id(l)))
            .collect();
        match key {
            Some(key) => groups.entry(key).or_default().push(doc.clone()),
            None => excluded.push(doc.clone()),
        }
    }

    if !excluded.is_empty() {
        warn!(
            excluded = excluded.len(),
            "Documents without a label for every column left out of the taxonomy"
        );
    }

    let rows: Vec<TaxonomyRow> = groups
        .into_iter()
        .map(|(key, doc_ids)| TaxonomyRow {
            labels: key
                .iter()
                .zip(&interners)
                .map(|(&id, interner)| interner.label(id).to_string())
                .collect(),
            count: doc_ids.len(),
            doc_ids,
        })
        .collect();

    debug!(rows = rows.len(), "Built taxonomy");
    TaxonomyTable {
        columns: columns.iter().map(|c| c.name.clone()).collect(),
        rows,
        excluded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use topics_types::AttributeId;

    fn column(name: &str, level: Option<usize>, labels: &[(&str, &str)]) -> LabelColumn {
        let mut column = LabelColumn::new(name, AttributeId::from(name), level);
        for (doc, label) in labels {
            column.labels.insert(doc.to_string(), label.to_string());
        }
        column
    }

    fn ids(names: &[&str]) -> Vec<DocumentId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_groups_identical_label_combinations() {
        let doc_ids = ids(&["doc1", "doc2", "doc3"]);
        let a = column("A", None, &[("doc1", "x, y"), ("doc2", "x, y"), ("doc3", "z")]);
        let b = column("B", None, &[("doc1", "p"), ("doc2", "p"), ("doc3", "p")]);
        let table = TaxonomyBuilder::new(&doc_ids).column(a).column(b).build();

        assert_eq!(table.columns, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(
            table.rows,
            vec![
                TaxonomyRow {
                    labels: vec!["x, y".into(), "p".into()],
                    doc_ids: ids(&["doc1", "doc2"]),
                    count: 2,
                },
                TaxonomyRow {
                    labels: vec!["z".into(), "p".into()],
                    doc_ids: ids(&["doc3"]),
                    count: 1,
                },
            ]
        );
        assert!(table.excluded.is_empty());
    }

    #[test]
    fn test_rows_sorted_column_by_column() {
        let doc_ids = ids(&["d1", "d2", "d3", "d4"]);
        let a = column("A", None, &[("d1", "b"), ("d2", "a"), ("d3", "b"), ("d4", "a")]);
        let b = column("B", None, &[("d1", "y"), ("d2", "z"), ("d3", "x"), ("d4", "z")]);
        let table = TaxonomyBuilder::new(&doc_ids).columns([a, b]).build();

        let keys: Vec<Vec<String>> = table.rows.iter().map(|r| r.labels.clone()).collect();
        assert_eq!(
            keys,
            vec![
                vec!["a".to_string(), "z".to_string()],
                vec!["b".to_string(), "x".to_string()],
                vec!["b".to_string(), "y".to_string()],
            ]
        );
        assert_eq!(table.rows[0].doc_ids, ids(&["d2", "d4"]));
    }

    #[test]
    fn test_delimiters_in_labels_do_not_collide() {
        // Concatenated keys would make both documents "a\nb\nc".
        let doc_ids = ids(&["d1", "d2"]);
        let a = column("A", None, &[("d1", "a\nb"), ("d2", "a")]);
        let b = column("B", None, &[("d1", "c"), ("d2", "b\nc")]);
        let table = TaxonomyBuilder::new(&doc_ids).columns([a, b]).build();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rows_partition_documents() {
        let doc_ids: Vec<DocumentId> = (0..20).map(|i| format!("d{i}")).collect();
        let mut a = LabelColumn::new("A", "A".into(), None);
        let mut b = LabelColumn::new("B", "B".into(), None);
        for (i, id) in doc_ids.iter().enumerate() {
            a.labels.insert(id.clone(), format!("a{}", i % 3));
            if i % 7 != 0 {
                b.labels.insert(id.clone(), format!("b{}", i % 2));
            }
        }
        let table = TaxonomyBuilder::new(&doc_ids).columns([a, b]).build();

        let mut seen = HashSet::new();
        for row in &table.rows {
            assert_eq!(row.count, row.doc_ids.len());
            for id in &row.doc_ids {
                assert!(seen.insert(id.clone()), "{id} in two rows");
            }
        }
        assert_eq!(table.excluded, ids(&["d0", "d7", "d14"]));
        assert_eq!(seen.len() + table.excluded.len(), doc_ids.len());
        assert_eq!(table.grouped_documents(), 17);
    }

    #[test]
    fn test_missing_column_excludes_everything() {
        let doc_ids = ids(&["d1", "d2"]);
        let a = column("A", None, &[("d1", "x"), ("d2", "x")]);
        let missing = LabelColumn::new("B", "B".into(), None);
        let table = TaxonomyBuilder::new(&doc_ids).columns([a, missing]).build();
        assert!(table.is_empty());
        assert_eq!(table.excluded, doc_ids);
    }

    #[test]
    fn test_level_view_regroups_one_level() {
        let doc_ids = ids(&["d1", "d2", "d3"]);
        let l1 = column("N Level 1", Some(1), &[("d1", "a"), ("d2", "a"), ("d3", "a")]);
        let l2 = column("N Level 2", Some(2), &[("d1", "b"), ("d2", "c"), ("d3", "c")]);
        let builder = TaxonomyBuilder::new(&doc_ids).columns([l1, l2]);

        assert_eq!(builder.build().len(), 2);
        let level1 = builder.level_view(1).unwrap();
        assert_eq!(level1.columns, vec!["N Level 1".to_string()]);
        assert_eq!(level1.len(), 1);
        assert_eq!(level1.rows[0].count, 3);
        assert_eq!(level1.row_of("d2"), level1.rows.first());

        assert!(matches!(
            builder.level_view(3),
            Err(TaxonomyError::NoColumns(_))
        ));
    }

    #[test]
    fn test_build_is_deterministic() {
        let doc_ids = ids(&["d1", "d2", "d3"]);
        let a = column("A", None, &[("d1", "q"), ("d2", "p"), ("d3", "q")]);
        let builder = TaxonomyBuilder::new(&doc_ids).column(a);
        assert_eq!(builder.build(), builder.build());
    }
}
