//! In-memory legacy document store.

use crate::document::{BulkOutcome, Document, DocumentStore};
use crate::error::StorageResult;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// An in-memory legacy document store.
///
/// This store keeps all documents in memory and is suitable for:
/// - Unit and integration tests
/// - Working on a JSON dump of a legacy database from the CLI
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use lookup_storage::{Document, DocumentStore, InMemoryDocumentStore};
/// use serde_json::json;
///
/// let store = InMemoryDocumentStore::new();
/// let doc = Document::from_value(json!({"_id": "a", "doc_type": "T"})).unwrap();
/// store.save(doc).unwrap();
/// assert_eq!(store.count_doc_type("T").unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<BTreeMap<String, Document>>,
    rejected: RwLock<HashSet<String>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given documents.
    #[must_use]
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        {
            let mut map = store.docs.write();
            for doc in docs {
                map.insert(doc.id().to_string(), doc);
            }
        }
        store
    }

    /// Loads a JSON array of documents from a file.
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not an array of
    /// valid documents.
    pub fn load_json(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path)?;
        let values: Vec<Value> = serde_json::from_str(&text)?;
        let docs = values
            .into_iter()
            .map(Document::from_value)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Self::with_documents(docs))
    }

    /// Writes all documents to a file as a JSON array sorted by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_json(&self, path: &Path) -> StorageResult<()> {
        let values: Vec<Value> = self.docs.read().values().map(Document::to_value).collect();
        fs::write(path, serde_json::to_string_pretty(&values)?)?;
        Ok(())
    }

    /// Makes writes of the given id fail until [`Self::allow_writes`].
    ///
    /// Useful for testing partial bulk failures.
    pub fn reject_writes(&self, id: impl Into<String>) {
        self.rejected.write().insert(id.into());
    }

    /// Re-enables writes of the given id.
    pub fn allow_writes(&self, id: &str) {
        self.rejected.write().remove(id);
    }

    /// Returns the number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Returns true if the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Returns a copy of every document.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.docs.read().values().cloned().collect()
    }

    fn is_rejected(&self, id: &str) -> bool {
        self.rejected.read().contains(id)
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, id: &str) -> StorageResult<Option<Document>> {
        Ok(self.docs.read().get(id).cloned())
    }

    fn bulk_save(&self, docs: Vec<Document>) -> StorageResult<Vec<BulkOutcome>> {
        self.bulk_write(docs, &[])
    }

    fn bulk_delete(&self, ids: &[String]) -> StorageResult<Vec<BulkOutcome>> {
        self.bulk_write(Vec::new(), ids)
    }

    fn bulk_write(&self, save: Vec<Document>, delete: &[String]) -> StorageResult<Vec<BulkOutcome>> {
        let mut map = self.docs.write();
        let mut outcomes = Vec::with_capacity(save.len() + delete.len());
        for id in delete {
            if self.is_rejected(id) {
                outcomes.push(BulkOutcome::failed(id.clone(), "delete rejected"));
                continue;
            }
            map.remove(id);
            outcomes.push(BulkOutcome::ok(id.clone()));
        }
        for doc in save {
            let id = doc.id().to_string();
            if self.is_rejected(&id) {
                outcomes.push(BulkOutcome::failed(id, "write rejected"));
                continue;
            }
            map.insert(id.clone(), doc);
            outcomes.push(BulkOutcome::ok(id));
        }
        Ok(outcomes)
    }

    fn iter_doc_type(&self, doc_type: &str) -> StorageResult<Vec<Document>> {
        Ok(self
            .docs
            .read()
            .values()
            .filter(|d| d.doc_type() == doc_type)
            .cloned()
            .collect())
    }
}
