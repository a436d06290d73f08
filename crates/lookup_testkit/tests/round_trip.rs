//! Generated tables survive import, export and re-import unchanged.

use lookup_core::{ImportConfig, NoProgress};
use lookup_model::Row;
use lookup_testkit::prelude::*;
use proptest::prelude::*;

fn contents(rows: &[Row]) -> Vec<lookup_model::RowContent> {
    rows.iter().map(Row::content_key).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn import_export_import_is_stable((table, rows) in table_with_rows_strategy(TEST_DOMAIN, 6)) {
        let stores = TestStores::memory();
        let config = ImportConfig::new();

        let first = stores.upload(TEST_DOMAIN, &workbook_for(&table, &rows), &config, &NoProgress).unwrap();
        prop_assert!(first.success, "{:?}", first.errors);
        prop_assert_eq!(first.created, rows.len());

        let stored = stores.table(TEST_DOMAIN, &table.tag).unwrap();
        prop_assert!(stored.same_definition(&table));
        let persisted = stores.adapter().relational().rows_for_table(stored.id).unwrap();
        prop_assert_eq!(contents(&persisted), contents(&rows));

        let exported = stores.export(TEST_DOMAIN, &[]).unwrap();
        let again = stores.upload(TEST_DOMAIN, &exported, &config, &NoProgress).unwrap();
        prop_assert!(again.success, "{:?}", again.errors);
        prop_assert_eq!((again.created, again.deleted), (0, 0));
        prop_assert_eq!(stores.export(TEST_DOMAIN, &[]).unwrap(), exported);
    }

    #[test]
    fn replace_import_matches_the_snapshot(
        (table, rows) in table_with_rows_strategy(TEST_DOMAIN, 6),
        keep in 0usize..6,
    ) {
        let stores = TestStores::memory();
        stores.upload(TEST_DOMAIN, &workbook_for(&table, &rows), &ImportConfig::new(), &NoProgress).unwrap();

        let kept: Vec<Row> = rows.iter().take(keep).cloned().collect();
        let result = stores
            .upload(TEST_DOMAIN, &workbook_for(&table, &kept), &ImportConfig::new().replace(true), &NoProgress)
            .unwrap();
        prop_assert!(result.success, "{:?}", result.errors);

        let stored = stores.table(TEST_DOMAIN, &table.tag).unwrap();
        let persisted = stores.adapter().relational().rows_for_table(stored.id).unwrap();
        prop_assert_eq!(contents(&persisted), contents(&kept));
        prop_assert_eq!(stores.legacy.len(), 1 + kept.len());
    }
}
