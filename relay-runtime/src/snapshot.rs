//! Read results
//!
//! [`Data`] is the immutable value tree a read produces. Objects and lists
//! sit behind `Arc`, so an unchanged subtree can be handed from one snapshot
//! to the next without copying and compared by pointer.

use crate::error::ReadError;
use crate::selector::{RequestDescriptor, SingularReaderSelector};
use relay_types::{DataId, GraphQLError, RequiredAction};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// A node of a read result
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Null,
    Scalar(Value),
    Object(Arc<BTreeMap<String, Data>>),
    List(Arc<Vec<Data>>),
    /// Value of a `@catch(to: RESULT)` field
    Result(Arc<Result<Data, Vec<GraphQLError>>>),
    /// Request that owns the fragment pointers of a read
    Owner(Arc<RequestDescriptor>),
}

impl Data {
    pub fn object(fields: BTreeMap<String, Data>) -> Self {
        Data::Object(Arc::new(fields))
    }

    pub fn list(items: Vec<Data>) -> Self {
        Data::List(Arc::new(items))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null | Data::Scalar(Value::Null))
    }

    /// Identity comparison: shared subtrees, or equal scalars
    pub fn ptr_eq(&self, other: &Data) -> bool {
        match (self, other) {
            (Data::Null, Data::Null) => true,
            (Data::Scalar(a), Data::Scalar(b)) => a == b,
            (Data::Object(a), Data::Object(b)) => Arc::ptr_eq(a, b),
            (Data::List(a), Data::List(b)) => Arc::ptr_eq(a, b),
            (Data::Result(a), Data::Result(b)) => Arc::ptr_eq(a, b),
            (Data::Owner(a), Data::Owner(b)) => Arc::ptr_eq(a, b) || a.identifier == b.identifier,
            _ => false,
        }
    }

    /// Field of an object node
    pub fn get(&self, key: &str) -> Option<&Data> {
        match self {
            Data::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Item of a list node
    pub fn index(&self, index: usize) -> Option<&Data> {
        match self {
            Data::List(items) => items.get(index),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Data>> {
        match self {
            Data::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Data]> {
        match self {
            Data::List(items) => Some(items),
            _ => None,
        }
    }

    /// Plain JSON rendering
    ///
    /// Caught results render as `{"ok": value}` or `{"ok": false, "errors": [...]}`
    /// and owners as their request identifier.
    pub fn to_json(&self) -> Value {
        match self {
            Data::Null => Value::Null,
            Data::Scalar(value) => value.clone(),
            Data::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
            Data::List(items) => Value::Array(items.iter().map(Data::to_json).collect()),
            Data::Result(result) => match result.as_ref() {
                Ok(value) => serde_json::json!({"ok": true, "value": value.to_json()}),
                Err(errors) => serde_json::json!({
                    "ok": false,
                    "errors": errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>()
                }),
            },
            Data::Owner(owner) => Value::String(owner.identifier.to_string()),
        }
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Data::Null,
            value => Data::Scalar(value),
        }
    }
}

/// Tri-state completeness of a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataAvailability {
    Complete,
    /// The root record exists but these field paths were never fetched
    MissingFields(Vec<String>),
    /// The root record itself was never fetched
    RecordAbsent,
}

/// A required field that was null or missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredFieldViolation {
    pub owner: String,
    pub path: String,
}

/// Required-field violations of a read, with the strongest action seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRequiredFields {
    pub action: RequiredAction,
    pub fields: Vec<RequiredFieldViolation>,
}

/// A server field error surfaced while reading
#[derive(Debug, Clone, PartialEq)]
pub struct FieldErrorEntry {
    pub owner: String,
    pub path: String,
    pub error: GraphQLError,
}

/// Result of reading a selector
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub data: Data,
    pub selector: SingularReaderSelector,
    /// Every record identity consulted, including ones that were absent
    pub seen_records: HashSet<DataId>,
    pub is_missing_data: bool,
    pub record_absent: bool,
    pub missing_fields: Vec<String>,
    pub missing_required_fields: Option<MissingRequiredFields>,
    pub field_errors: Vec<FieldErrorEntry>,
}

impl Snapshot {
    pub fn availability(&self) -> DataAvailability {
        if self.record_absent {
            DataAvailability::RecordAbsent
        } else if self.is_missing_data {
            DataAvailability::MissingFields(self.missing_fields.clone())
        } else {
            DataAvailability::Complete
        }
    }

    /// Raises THROW-level required violations and, for fragments that throw
    /// on field errors, the first uncaught field error
    ///
    /// Nothing is raised while data is still missing: the caller is expected
    /// to fetch first.
    pub fn check_errors(&self) -> Result<(), ReadError> {
        if self.is_missing_data {
            return Ok(());
        }
        if let Some(required) = &self.missing_required_fields {
            if required.action == RequiredAction::Throw {
                if let Some(field) = required.fields.first() {
                    return Err(ReadError::RequiredFieldMissing {
                        owner: field.owner.clone(),
                        path: field.path.clone(),
                    });
                }
            }
        }
        if self.selector.fragment.metadata.throw_on_field_error {
            if let Some(entry) = self.field_errors.first() {
                return Err(ReadError::FieldError {
                    owner: entry.owner.clone(),
                    path: entry.path.clone(),
                    message: entry.error.message.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Result of reading a plural selector
#[derive(Debug, Clone)]
pub struct PluralSnapshot {
    pub data: Data,
    pub snapshots: Vec<Snapshot>,
}

impl PluralSnapshot {
    pub fn is_missing_data(&self) -> bool {
        self.snapshots.iter().any(|snapshot| snapshot.is_missing_data)
    }

    pub fn seen_records(&self) -> HashSet<DataId> {
        self.snapshots
            .iter()
            .flat_map(|snapshot| snapshot.seen_records.iter().cloned())
            .collect()
    }
}
