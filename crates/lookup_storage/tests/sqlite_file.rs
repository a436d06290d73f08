//! On-disk relational store tests.

use lookup_model::{FieldDef, OwnerType, Row, RowOwner, Table};
use lookup_storage::{SaveOutcome, SqliteStore};
use tempfile::tempdir;

#[test]
fn data_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lookup.sqlite");

    let table = Table::new("acme", "prices").with_field(FieldDef::new("amount"));
    let row = Row::new("acme", table.id).with_value("amount", "10");
    {
        let store = SqliteStore::open(&path).unwrap();
        store.insert(&table).unwrap();
        store.insert(&row).unwrap();
        store
            .insert(&RowOwner::new("acme", row.id, OwnerType::Group, "g1"))
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.require::<Table>(table.id).unwrap(), table);
    assert_eq!(store.rows_for_table(table.id).unwrap(), vec![row.clone()]);
    assert_eq!(store.owners_for_table(table.id).unwrap().len(), 1);
    assert_eq!(store.save(&row).unwrap(), SaveOutcome::Unchanged);
}

#[test]
fn foreign_keys_enforced_after_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lookup.sqlite");
    let table = Table::new("acme", "prices");
    {
        let store = SqliteStore::open(&path).unwrap();
        store.insert(&table).unwrap();
        store.insert(&Row::new("acme", table.id)).unwrap();
    }
    let store = SqliteStore::open(&path).unwrap();
    assert!(store.delete::<Table>(table.id).unwrap());
    assert_eq!(store.count::<Row>().unwrap(), 0);
}
