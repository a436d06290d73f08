//! Benchmark utilities.

use lookup_core::{Desired, IdentityHint, Keyed};
use lookup_model::{FieldValue, Row, RowContent, RowId, TableId};
use rand::Rng;

/// Generate a random lowercase word of the specified length.
pub fn random_word(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// Generate `count` rows of one table with a name and a labelled field.
pub fn generate_rows(table_id: TableId, count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            Row::new("bench", table_id)
                .with_value("name", random_word(12))
                .with_values(
                    "label",
                    vec![FieldValue::new(random_word(8)).with_property("lang", "en")],
                )
                .with_attribute("size", i.to_string())
                .with_sort_key(i as i64)
        })
        .collect()
}

/// A snapshot row, optionally naming the row it replaces.
#[derive(Debug, Clone)]
pub struct Draft {
    /// Desired row content.
    pub row: Row,
    /// Persisted row this draft may replace.
    pub hint: Option<RowId>,
}

impl Keyed for Draft {
    type Key = RowContent;

    fn content_key(&self) -> RowContent {
        self.row.content_key()
    }
}

impl IdentityHint for Draft {
    type Id = RowId;

    fn identity_hint(&self) -> Option<RowId> {
        self.hint
    }
}

/// Builds a snapshot from persisted rows where roughly `changed` of every
/// hundred rows get a new name. Changed rows carry their old id as a hint.
pub fn snapshot_from(rows: &[Row], changed: u32) -> Vec<Desired<Draft, RowId>> {
    let mut rng = rand::thread_rng();
    rows.iter()
        .map(|row| {
            if rng.gen_range(0..100) < changed {
                let row = row.clone().with_value("name", random_word(12));
                Desired::Upsert(Draft {
                    hint: Some(row.id),
                    row,
                })
            } else {
                Desired::Upsert(Draft {
                    row: row.clone(),
                    hint: None,
                })
            }
        })
        .collect()
}
