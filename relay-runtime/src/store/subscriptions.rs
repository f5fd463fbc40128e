//! Subscriber bookkeeping
//!
//! Each subscription keeps the last snapshot delivered for its selector.
//! On notify only subscriptions whose seen records intersect the changed set
//! are re-read, and the callback fires only when the recycled data is no
//! longer the same tree.

use crate::reader::read;
use crate::record_source::RecordSourceRead;
use crate::recycle::recycle_nodes_into;
use crate::snapshot::Snapshot;
use relay_types::DataId;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Invoked with the new snapshot whenever the selected data changes
pub type SubscriptionCallback = Box<dyn FnMut(&Snapshot) + Send>;

/// Handle returned by [`Store::subscribe`](crate::Store::subscribe)
///
/// Consumed by [`Store::unsubscribe`](crate::Store::unsubscribe).
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle leaks the subscription"]
pub struct SubscriptionHandle(pub(crate) u64);

struct Subscription {
    snapshot: Snapshot,
    callback: SubscriptionCallback,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("selector", &self.snapshot.selector.fragment.name)
            .field("data_id", &self.snapshot.selector.data_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    entries: BTreeMap<u64, Subscription>,
    next_id: u64,
}

impl Subscriptions {
    pub fn insert(&mut self, snapshot: Snapshot, callback: SubscriptionCallback) -> SubscriptionHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, Subscription { snapshot, callback });
        SubscriptionHandle(id)
    }

    /// # Panics
    ///
    /// Panics if the handle does not belong to this store.
    pub fn remove(&mut self, handle: SubscriptionHandle) {
        if self.entries.remove(&handle.0).is_none() {
            panic!("unsubscribed unknown subscription {}", handle.0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn snapshot(&self, handle: &SubscriptionHandle) -> Option<&Snapshot> {
        self.entries.get(&handle.0).map(|entry| &entry.snapshot)
    }

    /// Identities read by any subscription; these stay alive across collections
    pub fn seen_records(&self) -> impl Iterator<Item = &DataId> {
        self.entries
            .values()
            .flat_map(|entry| entry.snapshot.seen_records.iter())
    }

    /// Re-reads affected subscriptions and returns how many callbacks fired
    pub fn notify<S: RecordSourceRead + ?Sized>(&mut self, source: &S, dirty: &HashSet<DataId>) -> usize {
        let mut fired = 0;
        for entry in self.entries.values_mut() {
            if entry.snapshot.seen_records.is_disjoint(dirty) {
                continue;
            }
            let mut next = read(source, &entry.snapshot.selector);
            next.data = recycle_nodes_into(&entry.snapshot.data, next.data);
            let changed = !next.data.ptr_eq(&entry.snapshot.data)
                || next.is_missing_data != entry.snapshot.is_missing_data;
            entry.snapshot = next;
            if changed {
                (entry.callback)(&entry.snapshot);
                fired += 1;
            }
        }
        fired
    }
}
