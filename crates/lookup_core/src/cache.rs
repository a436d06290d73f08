//! Read cache port for table rows.
//!
//! Writers call [`TableCache::invalidate`] exactly once per logical
//! operation, after the relational store has committed.

use crate::error::CoreResult;
use lookup_model::{Row, TableId};
use lookup_storage::SqliteStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A cache of table contents keyed by domain and table.
pub trait TableCache: Send + Sync {
    /// Drops everything cached for a table.
    fn invalidate(&self, domain: &str, table_id: TableId);
}

/// A cache that holds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl TableCache for NoopCache {
    fn invalidate(&self, _domain: &str, _table_id: TableId) {}
}

/// Memoizes the rows of each table, loaded on first read.
#[derive(Debug, Default)]
pub struct MemoizedTableCache {
    rows: RwLock<HashMap<(String, TableId), Arc<Vec<Row>>>>,
    invalidations: RwLock<HashMap<(String, TableId), usize>>,
}

impl MemoizedTableCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rows of a table, reading the store on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn rows(&self, store: &SqliteStore, domain: &str, table_id: TableId) -> CoreResult<Arc<Vec<Row>>> {
        let key = (domain.to_string(), table_id);
        if let Some(rows) = self.rows.read().get(&key) {
            return Ok(Arc::clone(rows));
        }
        let rows = Arc::new(store.rows_for_table(table_id)?);
        self.rows.write().insert(key, Arc::clone(&rows));
        Ok(rows)
    }

    /// Returns true if the table's rows are cached.
    #[must_use]
    pub fn is_cached(&self, domain: &str, table_id: TableId) -> bool {
        self.rows.read().contains_key(&(domain.to_string(), table_id))
    }

    /// Returns how many times a table was invalidated.
    ///
    /// Useful for testing.
    #[must_use]
    pub fn invalidation_count(&self, domain: &str, table_id: TableId) -> usize {
        self.invalidations
            .read()
            .get(&(domain.to_string(), table_id))
            .copied()
            .unwrap_or_default()
    }
}

impl TableCache for MemoizedTableCache {
    fn invalidate(&self, domain: &str, table_id: TableId) {
        let key = (domain.to_string(), table_id);
        self.rows.write().remove(&key);
        *self.invalidations.write().entry(key).or_default() += 1;
        debug!(domain, table_id = %table_id, "table cache invalidated");
    }
}

impl<C: TableCache + ?Sized> TableCache for Arc<C> {
    fn invalidate(&self, domain: &str, table_id: TableId) {
        (**self).invalidate(domain, table_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_model::{FieldDef, Table};

    #[test]
    fn rows_are_memoized_until_invalidated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let table = Table::new("d", "states").with_field(FieldDef::new("name"));
        store.insert(&table).unwrap();
        store
            .insert(&Row::new("d", table.id).with_value("name", "Ohio"))
            .unwrap();

        let cache = MemoizedTableCache::new();
        assert_eq!(cache.rows(&store, "d", table.id).unwrap().len(), 1);
        assert!(cache.is_cached("d", table.id));

        store
            .insert(&Row::new("d", table.id).with_value("name", "Texas"))
            .unwrap();
        assert_eq!(cache.rows(&store, "d", table.id).unwrap().len(), 1);

        cache.invalidate("d", table.id);
        assert!(!cache.is_cached("d", table.id));
        assert_eq!(cache.rows(&store, "d", table.id).unwrap().len(), 2);
        assert_eq!(cache.invalidation_count("d", table.id), 1);
        assert_eq!(cache.invalidation_count("other", table.id), 0);
    }
}
