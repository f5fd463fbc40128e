//! Record sources: arenas mapping identities to records
//!
//! Three states are distinguished for every identity: a present record, an
//! explicit tombstone ("known not to exist"), and absence ("never fetched").
//! Records are held behind `Arc` and copied on write, so a record handed out
//! earlier never observes later mutations.

use crate::record::Record;
use relay_types::DataId;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Availability of a record identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    Existent,
    Nonexistent,
    Unknown,
}

/// What a source holds for an identity it knows about
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEntry {
    Existent(Arc<Record>),
    Nonexistent,
}

/// Read access to a record source or a stack of sources
pub trait RecordSourceRead {
    fn entry(&self, id: &DataId) -> Option<&RecordEntry>;

    fn get(&self, id: &DataId) -> Option<&Record> {
        match self.entry(id) {
            Some(RecordEntry::Existent(record)) => Some(record),
            _ => None,
        }
    }

    fn status(&self, id: &DataId) -> RecordState {
        match self.entry(id) {
            Some(RecordEntry::Existent(_)) => RecordState::Existent,
            Some(RecordEntry::Nonexistent) => RecordState::Nonexistent,
            None => RecordState::Unknown,
        }
    }
}

/// A mutable mapping from identity to record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSource {
    records: HashMap<DataId, RecordEntry>,
}

impl RecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record
    pub fn set(&mut self, record: Record) {
        self.records
            .insert(record.id().clone(), RecordEntry::Existent(Arc::new(record)));
    }

    pub fn set_entry(&mut self, id: DataId, entry: RecordEntry) {
        self.records.insert(id, entry);
    }

    /// Records a tombstone: the identity is known not to exist
    pub fn delete(&mut self, id: &DataId) {
        self.records.insert(id.clone(), RecordEntry::Nonexistent);
    }

    /// Forgets an identity entirely, returning it to the unknown state
    pub fn remove(&mut self, id: &DataId) -> Option<RecordEntry> {
        self.records.remove(id)
    }

    /// Mutable access, cloning the record first if it is shared
    pub fn get_mut(&mut self, id: &DataId) -> Option<&mut Record> {
        match self.records.get_mut(id) {
            Some(RecordEntry::Existent(record)) => Some(Arc::make_mut(record)),
            _ => None,
        }
    }

    /// Mutable access to a record, creating an empty one if needed
    ///
    /// A tombstoned identity is revived as a fresh record.
    pub fn get_or_create_mut(&mut self, id: &DataId, typename: &str) -> &mut Record {
        let entry = self
            .records
            .entry(id.clone())
            .or_insert_with(|| RecordEntry::Existent(Arc::new(Record::new(id.clone(), typename))));
        if matches!(entry, RecordEntry::Nonexistent) {
            *entry = RecordEntry::Existent(Arc::new(Record::new(id.clone(), typename)));
        }
        match entry {
            RecordEntry::Existent(record) => Arc::make_mut(record),
            RecordEntry::Nonexistent => unreachable!("tombstone replaced above"),
        }
    }

    /// Folds `other` into this source field by field; tombstones replace
    pub fn merge(&mut self, other: &RecordSource) {
        for (id, entry) in other.iter() {
            match entry {
                RecordEntry::Existent(incoming) => match self.get_mut(id) {
                    Some(record) => {
                        record.update(incoming);
                    }
                    None => self.set(incoming.as_ref().clone()),
                },
                RecordEntry::Nonexistent => self.delete(id),
            }
        }
    }

    pub fn has(&self, id: &DataId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DataId> {
        self.records.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DataId, &RecordEntry)> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Serializes to `{id: record | null}` with identities in sorted order
    pub fn to_json(&self) -> Value {
        let ordered: BTreeMap<&DataId, Option<&Record>> = self
            .records
            .iter()
            .map(|(id, entry)| {
                let record = match entry {
                    RecordEntry::Existent(record) => Some(record.as_ref()),
                    RecordEntry::Nonexistent => None,
                };
                (id, record)
            })
            .collect();
        // Records serialize through derived impls over strings and JSON values only
        serde_json::to_value(ordered).unwrap_or(Value::Null)
    }

    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let decoded: BTreeMap<DataId, Option<Record>> = serde_json::from_value(value)?;
        let mut source = RecordSource::new();
        for (id, record) in decoded {
            match record {
                Some(record) => source.set(record),
                None => source.delete(&id),
            }
        }
        Ok(source)
    }
}

impl RecordSourceRead for RecordSource {
    fn entry(&self, id: &DataId) -> Option<&RecordEntry> {
        self.records.get(id)
    }
}

impl FromIterator<Record> for RecordSource {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut source = RecordSource::new();
        for record in iter {
            source.set(record);
        }
        source
    }
}

/// A read view that consults `top` before falling back to `base`
///
/// Records in `top` must be complete: a hit there shadows the whole record.
#[derive(Debug, Clone, Copy)]
pub struct LayeredSource<'a> {
    pub top: Option<&'a RecordSource>,
    pub base: &'a RecordSource,
}

impl<'a> LayeredSource<'a> {
    pub fn new(top: Option<&'a RecordSource>, base: &'a RecordSource) -> Self {
        LayeredSource { top, base }
    }
}

impl RecordSourceRead for LayeredSource<'_> {
    fn entry(&self, id: &DataId) -> Option<&RecordEntry> {
        self.top
            .and_then(|top| top.entry(id))
            .or_else(|| self.base.entry(id))
    }
}
