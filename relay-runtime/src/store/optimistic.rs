//! Optimistic layers
//!
//! Each layer is a source of partial records. The layers are folded in
//! order over copies of the base records they touch, giving a materialized
//! top source of complete records that reads consult before the base. The
//! fold is redone whenever a layer comes or goes or the base changes under
//! a touched record, so reverting a layer never disturbs the others.

use crate::record::Record;
use crate::record_source::{RecordEntry, RecordSource, RecordSourceRead};
use relay_types::DataId;
use std::collections::HashSet;

/// Handle returned by [`Store::apply_optimistic`](crate::Store::apply_optimistic)
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "an optimistic layer stays applied until reverted or committed"]
pub struct OptimisticHandle(pub(crate) u64);

#[derive(Debug)]
struct Layer {
    id: u64,
    source: RecordSource,
}

#[derive(Debug, Default)]
pub(crate) struct OptimisticLayers {
    layers: Vec<Layer>,
    next_id: u64,
    top: Option<RecordSource>,
}

impl OptimisticLayers {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn top(&self) -> Option<&RecordSource> {
        self.top.as_ref()
    }

    /// Identities shadowed by the current top
    pub fn touched(&self) -> HashSet<DataId> {
        self.top
            .as_ref()
            .map(|top| top.ids().cloned().collect())
            .unwrap_or_default()
    }

    /// Pushes a layer; returns its handle and the identities whose view changed
    pub fn push(&mut self, source: RecordSource, base: &RecordSource) -> (OptimisticHandle, HashSet<DataId>) {
        let id = self.next_id;
        self.next_id += 1;
        self.layers.push(Layer { id, source });
        (OptimisticHandle(id), self.rebuild(base))
    }

    /// Removes a layer, returning its records and the identities whose view changed
    ///
    /// # Panics
    ///
    /// Panics if the handle does not name an applied layer.
    pub fn remove(&mut self, handle: OptimisticHandle, base: &RecordSource) -> (RecordSource, HashSet<DataId>) {
        let Some(position) = self.layers.iter().position(|layer| layer.id == handle.0) else {
            panic!("optimistic layer {} is not applied", handle.0);
        };
        let layer = self.layers.remove(position);
        (layer.source, self.rebuild(base))
    }

    /// Refolds every layer over the current base
    ///
    /// Returns the identities shadowed before or after the fold.
    pub fn rebuild(&mut self, base: &RecordSource) -> HashSet<DataId> {
        let mut changed = self.touched();
        if self.layers.is_empty() {
            self.top = None;
            return changed;
        }

        let mut top = RecordSource::new();
        for layer in &self.layers {
            for (id, entry) in layer.source.iter() {
                match entry {
                    RecordEntry::Existent(delta) => {
                        let mut record = match top.get(id).or_else(|| base.get(id)) {
                            Some(current) => current.clone(),
                            None => Record::new(id.clone(), delta.typename()),
                        };
                        record.update(delta);
                        top.set(record);
                    }
                    RecordEntry::Nonexistent => top.delete(id),
                }
            }
        }
        changed.extend(top.ids().cloned());
        self.top = Some(top);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(name: &str) -> Record {
        let mut record = Record::new(DataId::new("4"), "User");
        record.set_value("name", json!(name));
        record
    }

    #[test]
    fn test_layers_fold_in_order() {
        let mut base = RecordSource::new();
        let mut original = user("Zuck");
        original.set_value("age", json!(30));
        base.set(original);

        let mut layers = OptimisticLayers::default();
        let (first, _) = layers.push([user("X")].into_iter().collect(), &base);
        let (_second, changed) = layers.push([user("Y")].into_iter().collect(), &base);
        assert!(changed.contains(&DataId::new("4")));

        let top = layers.top().unwrap().get(&DataId::new("4")).unwrap();
        assert_eq!(top.get_value("name"), Some(&json!("Y")));
        assert_eq!(top.get_value("age"), Some(&json!(30)));

        layers.remove(first, &base);
        let top = layers.top().unwrap().get(&DataId::new("4")).unwrap();
        assert_eq!(top.get_value("name"), Some(&json!("Y")));
        assert_eq!(base.get(&DataId::new("4")).unwrap().get_value("name"), Some(&json!("Zuck")));
    }

    #[test]
    fn test_removing_last_layer_clears_top() {
        let base = RecordSource::new();
        let mut layers = OptimisticLayers::default();
        let (handle, _) = layers.push([user("X")].into_iter().collect(), &base);

        let (source, changed) = layers.remove(handle, &base);
        assert!(layers.top().is_none());
        assert!(changed.contains(&DataId::new("4")));
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_tombstone_layer() {
        let mut base = RecordSource::new();
        base.set(user("Zuck"));
        let mut deletion = RecordSource::new();
        deletion.delete(&DataId::new("4"));

        let mut layers = OptimisticLayers::default();
        let _handle = layers.push(deletion, &base);
        assert_eq!(
            layers.top().unwrap().status(&DataId::new("4")),
            crate::record_source::RecordState::Nonexistent
        );
    }
}
