//! Flat, normalized records
//!
//! A record maps field storage keys to scalar values or to references to
//! other records. References are plain identities, never pointers, so the
//! record graph may be cyclic without any ownership cycles.

use relay_types::{DataId, GraphQLError, CLIENT_ID_PREFIX};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Value stored under a field's storage key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Reference to a single record
    LinkedRecord {
        #[serde(rename = "__ref")]
        id: DataId,
    },
    /// Ordered references; `None` entries are null list items
    LinkedRecords {
        #[serde(rename = "__refs")]
        ids: Vec<Option<DataId>>,
    },
    /// Scalar, list of scalars, or explicit null
    Scalar(Value),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Scalar(Value::Null))
    }

    /// Every identity this value points at
    pub fn references(&self) -> impl Iterator<Item = &DataId> {
        let (single, many) = match self {
            FieldValue::LinkedRecord { id } => (Some(id), None),
            FieldValue::LinkedRecords { ids } => (None, Some(ids.iter().flatten())),
            FieldValue::Scalar(_) => (None, None),
        };
        single.into_iter().chain(many.into_iter().flatten())
    }
}

/// A normalized record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "__id")]
    id: DataId,

    #[serde(rename = "__typename")]
    typename: String,

    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,

    /// Field errors keyed by storage key
    #[serde(rename = "__errors", default, skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<String, Vec<GraphQLError>>,

    /// Write epoch at which the record was marked stale
    #[serde(rename = "__invalidated_at", default, skip_serializing_if = "Option::is_none")]
    invalidated_at: Option<u64>,
}

impl Record {
    pub fn new(id: DataId, typename: impl Into<String>) -> Self {
        Record {
            id,
            typename: typename.into(),
            fields: BTreeMap::new(),
            errors: BTreeMap::new(),
            invalidated_at: None,
        }
    }

    pub fn id(&self) -> &DataId {
        &self.id
    }

    pub fn typename(&self) -> &str {
        &self.typename
    }

    pub fn set_typename(&mut self, typename: impl Into<String>) {
        self.typename = typename.into();
    }

    pub fn get(&self, storage_key: &str) -> Option<&FieldValue> {
        self.fields.get(storage_key)
    }

    pub fn set(&mut self, storage_key: impl Into<String>, value: FieldValue) {
        self.fields.insert(storage_key.into(), value);
    }

    pub fn remove(&mut self, storage_key: &str) -> Option<FieldValue> {
        self.fields.remove(storage_key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Scalar value at a storage key; `None` when absent or when the field holds a reference
    pub fn get_value(&self, storage_key: &str) -> Option<&Value> {
        match self.fields.get(storage_key) {
            Some(FieldValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    pub fn set_value(&mut self, storage_key: impl Into<String>, value: Value) {
        self.set(storage_key, FieldValue::Scalar(value));
    }

    /// Linked identity at a storage key
    ///
    /// Outer `None`: field never fetched. `Some(None)`: explicitly null.
    pub fn get_linked_record_id(&self, storage_key: &str) -> Option<Option<&DataId>> {
        match self.fields.get(storage_key)? {
            FieldValue::LinkedRecord { id } => Some(Some(id)),
            FieldValue::Scalar(Value::Null) => Some(None),
            _ => None,
        }
    }

    pub fn set_linked_record_id(&mut self, storage_key: impl Into<String>, id: DataId) {
        self.set(storage_key, FieldValue::LinkedRecord { id });
    }

    /// Linked identities at a storage key, with the same absent/null split
    pub fn get_linked_record_ids(&self, storage_key: &str) -> Option<Option<&[Option<DataId>]>> {
        match self.fields.get(storage_key)? {
            FieldValue::LinkedRecords { ids } => Some(Some(ids)),
            FieldValue::Scalar(Value::Null) => Some(None),
            _ => None,
        }
    }

    pub fn set_linked_record_ids(&mut self, storage_key: impl Into<String>, ids: Vec<Option<DataId>>) {
        self.set(storage_key, FieldValue::LinkedRecords { ids });
    }

    pub fn errors(&self, storage_key: &str) -> Option<&[GraphQLError]> {
        self.errors.get(storage_key).map(Vec::as_slice)
    }

    pub fn set_errors(&mut self, storage_key: impl Into<String>, errors: Vec<GraphQLError>) {
        self.errors.insert(storage_key.into(), errors);
    }

    pub fn invalidated_at(&self) -> Option<u64> {
        self.invalidated_at
    }

    pub fn mark_invalidated(&mut self, epoch: u64) {
        self.invalidated_at = Some(epoch);
    }

    /// Every identity referenced by any field
    pub fn references(&self) -> impl Iterator<Item = &DataId> {
        self.fields.values().flat_map(|value| value.references())
    }

    /// Merges `next` into this record field by field
    ///
    /// Fields absent from `next` are preserved. Errors attached by `next`
    /// replace errors for the same keys, and a field written without errors
    /// clears stale errors for that key. Returns true if anything changed.
    pub fn update(&mut self, next: &Record) -> bool {
        let mut changed = false;

        if next.typename != self.typename {
            tracing::warn!(
                id = %self.id,
                previous = %self.typename,
                next = %next.typename,
                "record typename changed on merge"
            );
            self.typename = next.typename.clone();
            changed = true;
        }

        for (key, value) in &next.fields {
            if self.fields.get(key) != Some(value) {
                self.fields.insert(key.clone(), value.clone());
                changed = true;
            }
            if !next.errors.contains_key(key) && self.errors.remove(key).is_some() {
                changed = true;
            }
        }

        for (key, errors) in &next.errors {
            if self.errors.get(key) != Some(errors) {
                self.errors.insert(key.clone(), errors.clone());
                changed = true;
            }
        }

        if next.invalidated_at > self.invalidated_at {
            self.invalidated_at = next.invalidated_at;
            changed = true;
        }

        changed
    }
}

/// Synthesizes an identity for a record the server gave no id
///
/// The identity is a deterministic function of the path used to reach the
/// record: the parent identity, the field's storage key and, for list
/// items, the index.
pub fn generate_client_id(parent: &DataId, storage_key: &str, index: Option<usize>) -> DataId {
    let mut key = format!("{}:{}", parent.as_str(), storage_key);
    if let Some(index) = index {
        key.push(':');
        key.push_str(&index.to_string());
    }
    if !key.starts_with(CLIENT_ID_PREFIX) {
        key.insert_str(0, CLIENT_ID_PREFIX);
    }
    DataId(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_id_generation() {
        let root = DataId::root();
        assert_eq!(generate_client_id(&root, "viewer", None).as_str(), "client:root:viewer");
        assert_eq!(
            generate_client_id(&DataId::new("4"), "friends(first:10)", Some(2)).as_str(),
            "client:4:friends(first:10):2"
        );
    }

    #[test]
    fn test_linked_record_absent_vs_null() {
        let mut record = Record::new(DataId::new("1"), "User");
        assert_eq!(record.get_linked_record_id("bestFriend"), None);

        record.set_value("bestFriend", Value::Null);
        assert_eq!(record.get_linked_record_id("bestFriend"), Some(None));

        record.set_linked_record_id("bestFriend", DataId::new("2"));
        assert_eq!(record.get_linked_record_id("bestFriend"), Some(Some(&DataId::new("2"))));
    }

    #[test]
    fn test_update_preserves_unmentioned_fields() {
        let mut record = Record::new(DataId::new("1"), "User");
        record.set_value("a", json!(1));
        record.set_value("b", json!(2));

        let mut next = Record::new(DataId::new("1"), "User");
        next.set_value("b", json!(20));
        next.set_value("c", json!(30));

        assert!(record.update(&next));
        assert_eq!(record.get_value("a"), Some(&json!(1)));
        assert_eq!(record.get_value("b"), Some(&json!(20)));
        assert_eq!(record.get_value("c"), Some(&json!(30)));

        assert!(!record.update(&next));
    }

    #[test]
    fn test_record_json_format() {
        let mut record = Record::new(DataId::new("1"), "User");
        record.set_value("name", json!("Alice"));
        record.set_linked_record_id("bestFriend", DataId::new("2"));
        record.set_linked_record_ids("friends", vec![Some(DataId::new("2")), None]);

        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(
            encoded,
            json!({
                "__id": "1",
                "__typename": "User",
                "name": "Alice",
                "bestFriend": {"__ref": "2"},
                "friends": {"__refs": ["2", null]}
            })
        );

        let decoded: Record = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, record);
    }
}
