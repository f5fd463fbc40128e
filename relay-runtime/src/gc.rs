//! Garbage collection of unreachable records
//!
//! Retained operations are the roots. Each root is reference counted by its
//! request identifier; when the count drops to zero the root lingers in a
//! small release buffer before it stops protecting its records. Every record
//! identity also carries a count of the live roots whose marked set contained
//! it when they were retained.
//!
//! A collection is a mark-and-sweep pass: it re-marks every live root against
//! the current source, adds every identity with a positive count and any
//! extra roots supplied by the store, then removes everything else. Records
//! that only reference each other are therefore collected together.

use crate::marker::{mark, MarkMode};
use crate::record_source::RecordSource;
use crate::selector::{OperationDescriptor, RequestIdentifier};
use relay_types::DataId;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug)]
struct RootEntry {
    operation: OperationDescriptor,
    ref_count: usize,
    marked: HashSet<DataId>,
}

/// Result of releasing a root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Still retained elsewhere, or parked in the release buffer
    Retained,
    /// A root stopped protecting its records; a collection may free them
    Collectable,
}

#[derive(Debug)]
pub struct GarbageCollector {
    roots: HashMap<RequestIdentifier, RootEntry>,
    /// Released roots, most recent first
    release_buffer: VecDeque<RequestIdentifier>,
    release_buffer_size: usize,
    id_counts: HashMap<DataId, usize>,
    holds: usize,
}

impl GarbageCollector {
    pub fn new(release_buffer_size: usize) -> Self {
        GarbageCollector {
            roots: HashMap::new(),
            release_buffer: VecDeque::new(),
            release_buffer_size,
            id_counts: HashMap::new(),
            holds: 0,
        }
    }

    /// Adds a reference to the operation's root, creating it on first retain
    pub fn retain(&mut self, operation: &OperationDescriptor, source: &RecordSource) -> RequestIdentifier {
        let identifier = operation.request.identifier.clone();
        self.release_buffer.retain(|buffered| buffered != &identifier);

        if let Some(entry) = self.roots.get_mut(&identifier) {
            entry.ref_count += 1;
            return identifier;
        }

        let mut marked = HashSet::new();
        mark(source, &operation.root, &mut marked, MarkMode::Conservative);
        for id in &marked {
            *self.id_counts.entry(id.clone()).or_default() += 1;
        }
        self.roots.insert(
            identifier.clone(),
            RootEntry {
                operation: operation.clone(),
                ref_count: 1,
                marked,
            },
        );
        identifier
    }

    /// Drops a reference to a root
    ///
    /// # Panics
    ///
    /// Panics if the root is unknown or already fully released.
    pub fn release(&mut self, identifier: &RequestIdentifier) -> ReleaseOutcome {
        let entry = match self.roots.get_mut(identifier) {
            Some(entry) if entry.ref_count > 0 => entry,
            _ => panic!("released operation {} that is not retained", identifier),
        };
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return ReleaseOutcome::Retained;
        }

        if self.release_buffer_size == 0 {
            self.remove_root(identifier);
            return ReleaseOutcome::Collectable;
        }
        self.release_buffer.push_front(identifier.clone());
        if self.release_buffer.len() <= self.release_buffer_size {
            return ReleaseOutcome::Retained;
        }
        match self.release_buffer.pop_back() {
            Some(expired) => {
                self.remove_root(&expired);
                ReleaseOutcome::Collectable
            }
            None => ReleaseOutcome::Retained,
        }
    }

    fn remove_root(&mut self, identifier: &RequestIdentifier) {
        let Some(entry) = self.roots.remove(identifier) else {
            return;
        };
        for id in entry.marked {
            if let Some(count) = self.id_counts.get_mut(&id) {
                *count -= 1;
                if *count == 0 {
                    self.id_counts.remove(&id);
                }
            }
        }
    }

    pub fn is_retained(&self, identifier: &RequestIdentifier) -> bool {
        self.roots.contains_key(identifier)
    }

    /// Number of live roots whose marked set holds `id`
    pub fn ref_count(&self, id: &DataId) -> usize {
        self.id_counts.get(id).copied().unwrap_or(0)
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    pub fn hold(&mut self) {
        self.holds += 1;
    }

    /// Returns true when the last hold was released
    pub fn release_hold(&mut self) -> bool {
        self.holds = self.holds.saturating_sub(1);
        self.holds == 0
    }

    pub fn is_held(&self) -> bool {
        self.holds > 0
    }

    /// Evicts every record not reachable from a live root, a counted identity
    /// or `extra_roots`; returns the evicted identities
    pub fn collect<'a>(
        &self,
        source: &mut RecordSource,
        extra_roots: impl IntoIterator<Item = &'a DataId>,
    ) -> Vec<DataId> {
        let mut live: HashSet<DataId> = self.id_counts.keys().cloned().collect();
        live.extend(extra_roots.into_iter().cloned());
        for entry in self.roots.values() {
            mark(&*source, &entry.operation.root, &mut live, MarkMode::Conservative);
        }

        let evicted: Vec<DataId> = source.ids().filter(|id| !live.contains(*id)).cloned().collect();
        for id in &evicted {
            source.remove(id);
        }
        tracing::debug!(
            roots = self.roots.len(),
            live = live.len(),
            evicted = evicted.len(),
            "garbage collection"
        );
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::selector::create_operation_descriptor;
    use relay_types::{ConcreteRequest, LinkedField, Selection, Variables, ROOT_TYPE};
    use std::sync::Arc;

    fn operation(name: &str, field: &str) -> OperationDescriptor {
        let selections = vec![LinkedField::new(field, vec![Selection::scalar("id")])
            .concrete_type("Node")
            .into()];
        create_operation_descriptor(
            Arc::new(ConcreteRequest::new(name, vec![], selections)),
            &Variables::new(),
        )
    }

    fn cyclic_source() -> RecordSource {
        let mut root = Record::new(DataId::root(), ROOT_TYPE);
        root.set_linked_record_id("a", DataId::new("A"));
        root.set_linked_record_id("c", DataId::new("C"));
        let mut a = Record::new(DataId::new("A"), "Node");
        a.set_linked_record_id("peer", DataId::new("B"));
        let mut b = Record::new(DataId::new("B"), "Node");
        b.set_linked_record_id("peer", DataId::new("A"));
        let c = Record::new(DataId::new("C"), "Node");
        [root, a, b, c].into_iter().collect()
    }

    #[test]
    fn test_retained_roots_survive() {
        let mut source = cyclic_source();
        let mut gc = GarbageCollector::new(0);
        gc.retain(&operation("AQuery", "a"), &source);

        let evicted: HashSet<DataId> = gc.collect(&mut source, []).into_iter().collect();
        assert_eq!(evicted, HashSet::from([DataId::new("B"), DataId::new("C")]));
        assert!(source.has(&DataId::root()));
        assert!(source.has(&DataId::new("A")));
    }

    #[test]
    fn test_released_cycle_is_collected() {
        let mut source = cyclic_source();
        let mut gc = GarbageCollector::new(0);
        let op = operation("AQuery", "a");
        let identifier = gc.retain(&op, &source);
        assert_eq!(gc.ref_count(&DataId::new("A")), 1);

        assert_eq!(gc.release(&identifier), ReleaseOutcome::Collectable);
        let evicted = gc.collect(&mut source, []);
        assert_eq!(evicted.len(), 4);
        assert!(source.is_empty());
    }

    #[test]
    fn test_release_buffer_delays_collection() {
        let source = cyclic_source();
        let mut gc = GarbageCollector::new(1);
        let first = gc.retain(&operation("AQuery", "a"), &source);
        let second = gc.retain(&operation("CQuery", "c"), &source);

        assert_eq!(gc.release(&first), ReleaseOutcome::Retained);
        assert!(gc.is_retained(&first));
        assert_eq!(gc.release(&second), ReleaseOutcome::Collectable);
        assert!(!gc.is_retained(&first));
        assert!(gc.is_retained(&second));
    }

    #[test]
    fn test_retain_again_rescues_buffered_root() {
        let source = cyclic_source();
        let mut gc = GarbageCollector::new(1);
        let op = operation("AQuery", "a");
        let identifier = gc.retain(&op, &source);
        gc.release(&identifier);
        gc.retain(&op, &source);

        let other = gc.retain(&operation("CQuery", "c"), &source);
        gc.release(&other);
        assert!(gc.is_retained(&identifier));
    }

    #[test]
    #[should_panic(expected = "not retained")]
    fn test_double_release_panics() {
        let source = cyclic_source();
        let mut gc = GarbageCollector::new(0);
        let identifier = gc.retain(&operation("AQuery", "a"), &source);
        gc.release(&identifier);
        gc.release(&identifier);
    }
}
