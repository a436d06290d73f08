//! Legacy document store interface.

use crate::error::{StorageError, StorageResult};
use serde_json::{Map, Value};

/// A schemaless legacy document.
///
/// Always carries a string `_id` and a string `doc_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Wraps a JSON value, checking for `_id` and `doc_type`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidDocument`] if the value is not an object
    /// or lacks a string `_id` or `doc_type`.
    pub fn from_value(value: Value) -> StorageResult<Self> {
        let Value::Object(map) = value else {
            return Err(StorageError::InvalidDocument("not an object".into()));
        };
        for key in ["_id", "doc_type"] {
            if !map.get(key).is_some_and(Value::is_string) {
                return Err(StorageError::InvalidDocument(format!("missing string '{key}'")));
            }
        }
        Ok(Self(map))
    }

    /// Document id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.get_str("_id").unwrap_or_default()
    }

    /// Document type.
    #[must_use]
    pub fn doc_type(&self) -> &str {
        self.get_str("doc_type").unwrap_or_default()
    }

    /// Returns a string attribute.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Copies every attribute of `other` into this document.
    ///
    /// Attributes only present here (revision markers and the like) are kept.
    pub fn merge(&mut self, other: Document) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    /// Returns the document as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Consumes the document into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Per-document result of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Document id.
    pub id: String,
    /// Failure message, if the document was not written.
    pub error: Option<String>,
}

impl BulkOutcome {
    /// A successful outcome.
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: None,
        }
    }

    /// A failed outcome.
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: Some(error.into()),
        }
    }

    /// Returns true if the document was written.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Collapses bulk outcomes into a transport error if any document failed.
///
/// # Errors
///
/// Returns [`StorageError::Transport`] naming every failed document.
pub fn check_outcomes(outcomes: &[BulkOutcome]) -> StorageResult<()> {
    let mut failed = Vec::new();
    let mut message = None;
    for outcome in outcomes {
        if let Some(err) = &outcome.error {
            failed.push(outcome.id.clone());
            message.get_or_insert_with(|| err.clone());
        }
    }
    match message {
        None => Ok(()),
        Some(message) => Err(StorageError::Transport { failed, message }),
    }
}

/// A legacy document store.
///
/// # Invariants
///
/// - `bulk_save`, `bulk_delete` and `bulk_write` are one request each; a
///   failure of one document does not prevent the others from being written
/// - `iter_doc_type` returns documents sorted by id
/// - Stores must be `Send + Sync` for use from background jobs
///
/// # Implementors
///
/// - [`super::InMemoryDocumentStore`] - For tests and JSON dumps
pub trait DocumentStore: Send + Sync {
    /// Reads one document.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, id: &str) -> StorageResult<Option<Document>>;

    /// Reads several documents, skipping missing ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_many(&self, ids: &[String]) -> StorageResult<Vec<Document>> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.get(id)? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Saves one document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transport`] if the write is rejected.
    fn save(&self, doc: Document) -> StorageResult<()> {
        check_outcomes(&self.bulk_save(vec![doc])?)
    }

    /// Saves documents in one request.
    ///
    /// # Errors
    ///
    /// Returns an error only if the request as a whole failed; per-document
    /// failures are reported in the outcomes.
    fn bulk_save(&self, docs: Vec<Document>) -> StorageResult<Vec<BulkOutcome>>;

    /// Deletes documents in one request. Missing ids succeed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the request as a whole failed.
    fn bulk_delete(&self, ids: &[String]) -> StorageResult<Vec<BulkOutcome>>;

    /// Deletes and saves documents in one request.
    ///
    /// Outcomes list the deletes first, then the saves.
    ///
    /// # Errors
    ///
    /// Returns an error only if the request as a whole failed.
    fn bulk_write(&self, save: Vec<Document>, delete: &[String]) -> StorageResult<Vec<BulkOutcome>> {
        let mut outcomes = self.bulk_delete(delete)?;
        outcomes.extend(self.bulk_save(save)?);
        Ok(outcomes)
    }

    /// Returns every document of a type, sorted by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn iter_doc_type(&self, doc_type: &str) -> StorageResult<Vec<Document>>;

    /// Counts documents of a type.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn count_doc_type(&self, doc_type: &str) -> StorageResult<usize> {
        Ok(self.iter_doc_type(doc_type)?.len())
    }

    /// Returns documents of a type whose `domain` and `tag` match.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn view_by_domain_tag(
        &self,
        doc_type: &str,
        domain: &str,
        tag: &str,
    ) -> StorageResult<Vec<Document>> {
        Ok(self
            .iter_doc_type(doc_type)?
            .into_iter()
            .filter(|d| d.get_str("domain") == Some(domain) && d.get_str("tag") == Some(tag))
            .collect())
    }

    /// Returns documents of a type whose `table_id` matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn view_rows_by_table(&self, doc_type: &str, table_id: &str) -> StorageResult<Vec<Document>> {
        Ok(self
            .iter_doc_type(doc_type)?
            .into_iter()
            .filter(|d| d.get_str("table_id") == Some(table_id))
            .collect())
    }

    /// Returns documents of a type whose `row_id` matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn view_owners_by_row(&self, doc_type: &str, row_id: &str) -> StorageResult<Vec<Document>> {
        Ok(self
            .iter_doc_type(doc_type)?
            .into_iter()
            .filter(|d| d.get_str("row_id") == Some(row_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_requires_id_and_type() {
        assert!(Document::from_value(json!({"_id": "a", "doc_type": "T"})).is_ok());
        assert!(Document::from_value(json!({"_id": "a"})).is_err());
        assert!(Document::from_value(json!({"_id": 1, "doc_type": "T"})).is_err());
        assert!(Document::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn merge_keeps_unknown_keys() {
        let mut doc = Document::from_value(json!({"_id": "a", "doc_type": "T", "_rev": "1-x"})).unwrap();
        let update = Document::from_value(json!({"_id": "a", "doc_type": "T", "tag": "t"})).unwrap();
        doc.merge(update);
        assert_eq!(doc.get_str("_rev"), Some("1-x"));
        assert_eq!(doc.get_str("tag"), Some("t"));
    }

    #[test]
    fn check_outcomes_collects_failures() {
        let outcomes = vec![
            BulkOutcome::ok("a"),
            BulkOutcome::failed("b", "conflict"),
            BulkOutcome::failed("c", "timeout"),
        ];
        match check_outcomes(&outcomes) {
            Err(StorageError::Transport { failed, message }) => {
                assert_eq!(failed, vec!["b", "c"]);
                assert_eq!(message, "conflict");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(check_outcomes(&[BulkOutcome::ok("a")]).is_ok());
    }
}
