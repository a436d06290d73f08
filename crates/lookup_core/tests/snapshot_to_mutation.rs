//! Validating a snapshot and reconciling its rows against persisted rows.

use lookup_core::schema::{parse_data_row, validate, DataRow, Workbook, Worksheet};
use lookup_core::{
    Desired, IdentityHint, InMemoryDirectory, Keyed, OwnershipIndex, Principal, Reconciler,
};
use lookup_model::{FieldDef, OwnerType, Row, RowContent, RowId, Table};
use serde_json::{json, Value};

struct Draft {
    row: Row,
    hint: Option<RowId>,
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

fn sheet(title: &str, rows: Value) -> Worksheet {
    Worksheet {
        title: title.into(),
        rows: serde_json::from_value(rows).unwrap(),
    }
}

fn state_table() -> Table {
    Table::new("d", "state").with_field(FieldDef::new("name"))
}

fn drafts(table: &Table, rows: &[DataRow]) -> Vec<Desired<Draft, RowId>> {
    rows.iter()
        .enumerate()
        .filter_map(|(i, data)| {
            let hint = data.uid.as_deref().and_then(|u| RowId::parse(u).ok());
            if data.delete {
                return hint.map(Desired::Delete);
            }
            let mut row = Row::new(&table.domain, table.id).with_sort_key(i as i64);
            row.fields = data.fields.clone();
            row.item_attributes = data.item_attributes.clone();
            Some(Desired::Upsert(Draft { row, hint }))
        })
        .collect()
}

#[test]
fn ohio_is_kept_and_texas_created() {
    let table = state_table();
    let ohio = Row::new("d", table.id).with_value("name", "Ohio");

    let workbook = Workbook::new()
        .with_sheet(sheet("types", json!([{"table_id": "state", "field": ["name"]}])))
        .with_sheet(sheet(
            "state",
            json!([{"field": {"name": "Ohio"}}, {"field": {"name": "Texas"}}]),
        ));
    let snapshot = validate(&workbook, false).unwrap();
    let def = snapshot.table("state").unwrap();
    let data: Vec<DataRow> = workbook.sheet("state").unwrap().rows.iter().map(|r| parse_data_row(def, r)).collect();

    let mut merged = Vec::new();
    let mutation = Reconciler::new(vec![ohio.clone()]).run(drafts(&table, &data), |old, new| {
        merged.push((old.id, new.row.sort_key));
    });

    assert_eq!(merged, vec![(ohio.id, 0)]);
    assert!(mutation.to_delete.is_empty());
    assert_eq!(mutation.to_create.len(), 1);
    assert_eq!(mutation.to_create[0].row.scalar("name"), Some("Texas"));
    assert_eq!(mutation.to_create[0].row.sort_key, 1);
}

#[test]
fn replace_deletes_unmentioned_rows() {
    let table = state_table();
    let a = Row::new("d", table.id).with_value("name", "A");
    let b = Row::new("d", table.id).with_value("name", "B");
    let data = vec![DataRow {
        fields: a.fields.clone(),
        ..DataRow::default()
    }];

    let mutation = Reconciler::new(vec![a, b.clone()])
        .delete_missing(true)
        .run(drafts(&table, &data), |_, _| {});
    assert!(mutation.to_create.is_empty());
    assert_eq!(mutation.to_delete.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b.id]);
}

#[test]
fn uid_edit_recreates_the_row() {
    let table = state_table();
    let ohio = Row::new("d", table.id).with_value("name", "Ohio");
    let data = vec![DataRow {
        uid: Some(ohio.id.to_string()),
        fields: Row::new("d", table.id)
            .with_value("name", "Ohio River")
            .fields,
        ..DataRow::default()
    }];

    let mutation = Reconciler::new(vec![ohio.clone()]).run(drafts(&table, &data), |_, _| {});
    assert_eq!(mutation.to_delete.len(), 1);
    assert_eq!(mutation.to_delete[0].id, ohio.id);
    assert_eq!(mutation.to_create[0].row.scalar("name"), Some("Ohio River"));
}

#[test]
fn unknown_owner_still_yields_row_and_one_warning() {
    let directory = InMemoryDirectory::new();
    directory.add("d", OwnerType::User, Principal::new("u1", "alice"));

    let workbook = Workbook::new()
        .with_sheet(sheet("types", json!([{"table_id": "state", "field": ["name"]}])))
        .with_sheet(sheet(
            "state",
            json!([{"field": {"name": "Ohio"}, "user": ["alice", "mallory"]}]),
        ));
    let snapshot = validate(&workbook, false).unwrap();
    let data = parse_data_row(snapshot.table("state").unwrap(), &workbook.sheet("state").unwrap().rows[0]);

    let mut index = OwnershipIndex::new(&directory, "d");
    let resolved = index.resolve_spec(&data.owners);
    assert_eq!(resolved.ids[&OwnerType::User], vec!["u1"]);
    assert_eq!(resolved.warnings.len(), 1);

    let table = state_table();
    let mutation = Reconciler::<Row>::new(Vec::new()).run(drafts(&table, &[data]), |_, _| {});
    assert_eq!(mutation.to_create.len(), 1);
}
