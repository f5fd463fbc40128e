//! Property tests for record merging and storage keys

use proptest::prelude::*;
use relay_runtime::storage_key::get_storage_key;
use relay_runtime::{Record, RecordSource, RecordSourceRead, Store};
use relay_types::{Argument, DataId, Variables};
use serde_json::json;
use std::collections::BTreeMap;

fn source_from(fields: &BTreeMap<(u8, String), i64>) -> RecordSource {
    let mut records: BTreeMap<u8, Record> = BTreeMap::new();
    for ((id, key), value) in fields {
        records
            .entry(*id)
            .or_insert_with(|| Record::new(DataId::new(id.to_string()), "Node"))
            .set_value(key.clone(), json!(value));
    }
    records.into_values().collect()
}

fn field_map() -> impl Strategy<Value = BTreeMap<(u8, String), i64>> {
    prop::collection::btree_map((0u8..4, "[a-e]"), any::<i64>(), 0..12)
}

proptest! {
    #[test]
    fn publishing_twice_changes_nothing(fields in field_map()) {
        let mut store = Store::default();
        store.publish(source_from(&fields));
        let summary = store.publish(source_from(&fields));
        prop_assert!(summary.is_empty());
    }

    #[test]
    fn disjoint_writes_commute(left in field_map(), right in field_map()) {
        let right: BTreeMap<_, _> = right
            .into_iter()
            .filter(|(key, _)| !left.contains_key(key))
            .collect();

        let mut forward = Store::default();
        forward.publish(source_from(&left));
        forward.publish(source_from(&right));

        let mut backward = Store::default();
        backward.publish(source_from(&right));
        backward.publish(source_from(&left));

        prop_assert_eq!(forward.get_source().to_json(), backward.get_source().to_json());
    }

    #[test]
    fn later_write_wins(fields in field_map(), value in any::<i64>()) {
        prop_assume!(!fields.is_empty());
        let mut store = Store::default();
        store.publish(source_from(&fields));

        let ((id, key), _) = fields.iter().next().unwrap();
        let mut overwrite = BTreeMap::new();
        overwrite.insert((*id, key.clone()), value);
        store.publish(source_from(&overwrite));

        let Some(record) = store.get_source().get(&DataId::new(id.to_string())) else {
            return Err(TestCaseError::fail("record missing after overwrite"));
        };
        prop_assert_eq!(record.get_value(key), Some(&json!(value)));
    }

    #[test]
    fn storage_key_ignores_argument_order(
        args in prop::collection::btree_map("[a-f]{1,3}", any::<i32>(), 1..5).prop_flat_map(|args| {
            let arguments: Vec<Argument> = args
                .into_iter()
                .map(|(name, value)| Argument::literal(name, json!(value)))
                .collect();
            (Just(arguments.clone()), Just(arguments).prop_shuffle())
        })
    ) {
        let (sorted, shuffled) = args;
        let variables = Variables::new();
        prop_assert_eq!(
            get_storage_key("field", None, &sorted, &variables),
            get_storage_key("field", None, &shuffled, &variables)
        );
    }
}
