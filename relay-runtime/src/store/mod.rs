//! The record store
//!
//! [`Store`] owns the base record source and everything layered around it:
//! optimistic layers, subscriptions, retained roots for garbage collection,
//! pending incremental payloads and a snapshot cache.
//!
//! Writes only mark records dirty. Subscribers hear about them on the next
//! [`Store::notify`], which re-reads just the subscriptions whose seen records
//! intersect the dirty set.

mod incremental;
mod optimistic;
mod subscriptions;

pub use optimistic::OptimisticHandle;
pub use subscriptions::{SubscriptionCallback, SubscriptionHandle};

use crate::checker;
use crate::config::{GcPolicy, StoreConfig};
use crate::error::{Result, StoreError};
use crate::gc::{GarbageCollector, ReleaseOutcome};
use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::normalizer::{IncrementalPlaceholder, NormalizeOutput, Normalizer};
use crate::queue::{PublishQueue, QueuedPayload};
use crate::reader::{read, read_plural};
use crate::record::Record;
use crate::record_source::{LayeredSource, RecordEntry, RecordSource, RecordSourceRead, RecordState};
use crate::recycle::recycle_nodes_into;
use crate::selector::{
    OperationDescriptor, PluralReaderSelector, RequestIdentifier, SelectorKey, SingularReaderSelector,
};
use crate::snapshot::{PluralSnapshot, Snapshot};
use incremental::{IncrementalTracker, Resolution};
use lru::LruCache;
use optimistic::OptimisticLayers;
use parking_lot::Mutex;
use relay_types::{DataId, GraphQLResponse, ROOT_TYPE};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::time::Instant;
use subscriptions::Subscriptions;

/// Handle returned by [`Store::retain`]
#[derive(Debug, PartialEq, Eq)]
#[must_use = "the operation stays retained until the handle is released"]
pub struct RetainHandle {
    identifier: RequestIdentifier,
}

impl RetainHandle {
    pub fn identifier(&self) -> &RequestIdentifier {
        &self.identifier
    }
}

/// Handle returned by [`Store::hold_gc`]
#[derive(Debug)]
#[must_use = "garbage collection stays paused until the hold is released"]
pub struct GcHold(());

/// Whether an operation can be served from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationAvailability {
    /// Every selected field is present and fresh
    Available { fetch_time: Option<Instant> },
    /// Present, but invalidated or expired since it was written
    Stale,
    Missing,
}

/// Identities affected by one publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub created: BTreeSet<DataId>,
    pub updated: BTreeSet<DataId>,
    pub deleted: BTreeSet<DataId>,
}

impl PublishSummary {
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn changed(&self) -> impl Iterator<Item = &DataId> {
        self.created.iter().chain(&self.updated).chain(&self.deleted)
    }

    pub fn merge(&mut self, other: PublishSummary) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.deleted.extend(other.deleted);
    }
}

/// Outcome of draining a [`PublishQueue`]
#[derive(Debug, Default)]
pub struct QueueRunSummary {
    pub applied: usize,
    /// Payloads that were rejected; none of their records were written
    pub errors: Vec<StoreError>,
    /// Subscriber callbacks fired by the closing notify
    pub notified: usize,
}

#[derive(Debug, Clone, Copy)]
struct OperationWrite {
    epoch: u64,
    fetched_at: Instant,
}

#[derive(Debug)]
struct CachedSnapshot {
    revision: u64,
    snapshot: Snapshot,
}

#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    source: RecordSource,
    optimistic: OptimisticLayers,
    subscriptions: Subscriptions,
    gc: GarbageCollector,
    gc_pending: bool,
    incremental: IncrementalTracker,
    dirty: HashSet<DataId>,
    /// Advanced by every operation write and invalidation
    epoch: u64,
    global_invalidation: Option<u64>,
    operation_writes: HashMap<RequestIdentifier, OperationWrite>,
    lookup_cache: Mutex<LruCache<SelectorKey, CachedSnapshot>>,
    /// Advanced whenever visible data changes
    revision: u64,
    metrics: StoreMetrics,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_source(config, RecordSource::new())
    }

    /// Creates a store over existing records, adding the root record if absent
    pub fn with_source(config: StoreConfig, mut source: RecordSource) -> Self {
        if source.status(&DataId::root()) != RecordState::Existent {
            source.set(Record::new(DataId::root(), ROOT_TYPE));
        }
        let capacity = NonZeroUsize::new(config.lookup_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Store {
            gc: GarbageCollector::new(config.gc_release_buffer_size),
            lookup_cache: Mutex::new(LruCache::new(capacity)),
            config,
            source,
            optimistic: OptimisticLayers::default(),
            subscriptions: Subscriptions::default(),
            gc_pending: false,
            incremental: IncrementalTracker::default(),
            dirty: HashSet::new(),
            epoch: 0,
            global_invalidation: None,
            operation_writes: HashMap::new(),
            revision: 0,
            metrics: StoreMetrics::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The base records, without optimistic layers
    pub fn get_source(&self) -> &RecordSource {
        &self.source
    }

    /// What reads observe: optimistic layers over the base
    pub fn view(&self) -> LayeredSource<'_> {
        LayeredSource::new(self.optimistic.top(), &self.source)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ---- reads ----

    /// Reads a selector, reusing the cached snapshot when nothing changed
    ///
    /// Repeated lookups share unchanged subtrees with the previous result.
    pub fn lookup(&self, selector: &SingularReaderSelector) -> Snapshot {
        let key = selector.cache_key();
        let mut cache = self.lookup_cache.lock();
        if let Some(cached) = cache.get(&key) {
            if cached.revision == self.revision {
                self.metrics.record_cache_hit();
                return cached.snapshot.clone();
            }
        }

        let mut snapshot = read(&self.view(), selector);
        self.metrics.record_read();
        if let Some(previous) = cache.peek(&key) {
            snapshot.data = recycle_nodes_into(&previous.snapshot.data, snapshot.data);
        }
        cache.put(
            key,
            CachedSnapshot {
                revision: self.revision,
                snapshot: snapshot.clone(),
            },
        );
        snapshot
    }

    pub fn lookup_plural(&self, selector: &PluralReaderSelector) -> PluralSnapshot {
        self.metrics.record_read();
        read_plural(&self.view(), selector)
    }

    /// Reports whether an operation's data is present and fresh
    pub fn check(&self, operation: &OperationDescriptor) -> OperationAvailability {
        let result = checker::check(&self.view(), &operation.root);
        if result.is_missing_data {
            return OperationAvailability::Missing;
        }

        let write = self.operation_writes.get(&operation.request.identifier);
        let written_at = write.map(|write| write.epoch);
        let invalidated_since_write = |invalidated: Option<u64>| match (invalidated, written_at) {
            (Some(invalidated), Some(written)) => invalidated > written,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if invalidated_since_write(self.global_invalidation)
            || invalidated_since_write(result.latest_invalidation)
        {
            return OperationAvailability::Stale;
        }
        if let (Some(expiration), Some(write)) = (self.config.query_cache_expiration(), write) {
            if write.fetched_at.elapsed() > expiration {
                return OperationAvailability::Stale;
            }
        }
        OperationAvailability::Available {
            fetch_time: write.map(|write| write.fetched_at),
        }
    }

    // ---- subscriptions ----

    /// Registers `callback` for changes to the data `selector` reads
    ///
    /// The callback is not invoked for the current data, only on later
    /// notifies that change it.
    pub fn subscribe<F>(&mut self, selector: SingularReaderSelector, callback: F) -> SubscriptionHandle
    where
        F: FnMut(&Snapshot) + Send + 'static,
    {
        let snapshot = self.lookup(&selector);
        self.subscriptions.insert(snapshot, Box::new(callback))
    }

    /// # Panics
    ///
    /// Panics if the handle was not issued by this store.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.subscriptions.remove(handle);
    }

    /// Last snapshot delivered to a subscription
    pub fn subscription_snapshot(&self, handle: &SubscriptionHandle) -> Option<&Snapshot> {
        self.subscriptions.snapshot(handle)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Delivers pending changes to subscribers; returns the callbacks fired
    pub fn notify(&mut self) -> usize {
        let dirty = std::mem::take(&mut self.dirty);
        let fired = if dirty.is_empty() {
            0
        } else {
            let view = LayeredSource::new(self.optimistic.top(), &self.source);
            self.subscriptions.notify(&view, &dirty)
        };
        self.metrics.record_notifications(fired);
        tracing::debug!(dirty = dirty.len(), fired, "notified subscribers");

        if self.gc_pending && self.config.gc_policy == GcPolicy::Deferred {
            self.collect();
        }
        fired
    }

    // ---- writes ----

    /// Merges records into the base source
    ///
    /// Every field of an incoming record overwrites the stored one; fields
    /// it does not mention are kept. Tombstones replace whatever was stored.
    pub fn publish(&mut self, source: RecordSource) -> PublishSummary {
        let mut summary = PublishSummary::default();
        for (id, entry) in source.iter() {
            match entry {
                RecordEntry::Existent(incoming) => match self.source.get_mut(id) {
                    Some(record) => {
                        if record.update(incoming) {
                            summary.updated.insert(id.clone());
                        }
                    }
                    None => {
                        self.source.set(incoming.as_ref().clone());
                        summary.created.insert(id.clone());
                    }
                },
                RecordEntry::Nonexistent => {
                    if self.source.status(id) != RecordState::Nonexistent {
                        self.source.delete(id);
                        summary.deleted.insert(id.clone());
                    }
                }
            }
        }

        self.metrics.record_publish(summary.len());
        if !summary.is_empty() {
            let changed: HashSet<DataId> = summary.changed().cloned().collect();
            self.mark_dirty(changed);
            self.rebase_optimistic();
        }
        tracing::debug!(
            created = summary.created.len(),
            updated = summary.updated.len(),
            deleted = summary.deleted.len(),
            "published records"
        );
        summary
    }

    /// Normalizes a server response for `operation` and publishes it
    ///
    /// Incremental payloads are routed to [`Store::publish_incremental`]. A
    /// payload that fails to normalize writes nothing.
    pub fn publish_response(
        &mut self,
        operation: &OperationDescriptor,
        response: &GraphQLResponse,
    ) -> Result<PublishSummary> {
        if response.is_incremental() {
            return self.publish_incremental(operation, response);
        }
        let identifier = &operation.request.identifier;
        let data = match &response.data {
            Some(data) if !data.is_null() => data,
            _ => {
                return Err(StoreError::NoData {
                    operation: identifier.to_string(),
                    errors: response.errors.clone(),
                })
            }
        };

        let started = Instant::now();
        let normalized = Normalizer::new(&self.source, &self.config.id_field)
            .with_errors(&response.errors)
            .normalize(&operation.root, ROOT_TYPE, data);
        self.metrics.record_normalize(started.elapsed());
        let output = normalized.inspect_err(|error| {
            tracing::warn!(operation = %identifier, %error, "discarding malformed response");
        })?;

        let summary = self.apply_output(operation, output)?;
        self.record_write(identifier);
        if response.has_next == Some(false) {
            self.incremental.complete(identifier);
        }
        Ok(summary)
    }

    /// Applies a `@defer` or `@stream` follow-up payload
    ///
    /// A payload whose placeholder has not been seen yet is held back and
    /// applied once the placeholder arrives.
    pub fn publish_incremental(
        &mut self,
        operation: &OperationDescriptor,
        response: &GraphQLResponse,
    ) -> Result<PublishSummary> {
        let identifier = &operation.request.identifier;
        let summary = match self.incremental.resolve(identifier, response)? {
            Resolution::Buffered => {
                tracing::debug!(
                    operation = %identifier,
                    label = ?response.label,
                    "holding incremental payload until its placeholder arrives"
                );
                PublishSummary::default()
            }
            Resolution::Defer(placeholder) => match self.normalize_deferred(operation, &placeholder, response) {
                Ok(output) => self.apply_output(operation, output)?,
                Err(error) => {
                    self.incremental.restore(identifier, placeholder);
                    return Err(error);
                }
            },
            Resolution::Stream { placeholder, index } => {
                let output = self.normalize_stream_items(&placeholder, index, response)?;
                self.apply_output(operation, output)?
            }
        };
        if response.has_next == Some(false) {
            self.incremental.complete(identifier);
        }
        Ok(summary)
    }

    /// Deferred payloads still outstanding for an operation
    pub fn pending_incremental(&self, operation: &OperationDescriptor) -> usize {
        self.incremental.pending(&operation.request.identifier)
    }

    fn normalize_deferred(
        &self,
        operation: &OperationDescriptor,
        placeholder: &IncrementalPlaceholder,
        response: &GraphQLResponse,
    ) -> Result<NormalizeOutput> {
        let IncrementalPlaceholder::Defer {
            path,
            selector,
            type_name,
            ..
        } = placeholder
        else {
            return Ok(NormalizeOutput::default());
        };
        let Some(data) = &response.data else {
            return Err(StoreError::NoData {
                operation: operation.request.identifier.to_string(),
                errors: response.errors.clone(),
            });
        };
        if self.source.status(&selector.data_id) != RecordState::Existent {
            return Err(StoreError::MissingParentRecord(selector.data_id.clone()));
        }

        Ok(Normalizer::new(&self.source, &self.config.id_field)
            .with_errors(&response.errors)
            .at_path(path.clone())
            .normalize(selector, type_name, data)?)
    }

    /// Normalizes every item of a stream payload into one batch
    ///
    /// Each item sees the records staged by the items before it, so a
    /// malformed item rejects the whole payload before anything is published.
    fn normalize_stream_items(
        &self,
        placeholder: &IncrementalPlaceholder,
        index: usize,
        response: &GraphQLResponse,
    ) -> Result<NormalizeOutput> {
        let IncrementalPlaceholder::Stream { parent_id, .. } = placeholder else {
            return Ok(NormalizeOutput::default());
        };
        if self.source.status(parent_id) != RecordState::Existent {
            return Err(StoreError::MissingParentRecord(parent_id.clone()));
        }
        let items: Vec<&Value> = match (&response.items, &response.data) {
            (Some(items), _) => items.iter().collect(),
            (None, Some(item)) => vec![item],
            (None, None) => Vec::new(),
        };

        // Complete records touched so far, shadowing the base
        let mut staged = RecordSource::new();
        let mut batch = NormalizeOutput::default();
        for (offset, item) in items.into_iter().enumerate() {
            let view = LayeredSource::new(Some(&staged), &self.source);
            let output = Normalizer::new(&view, &self.config.id_field)
                .with_errors(&response.errors)
                .normalize_stream_item(placeholder, index + offset, item)?;
            for (id, entry) in output.source.iter() {
                if matches!(entry, RecordEntry::Existent(_)) && !staged.has(id) {
                    if let Some(existing) = self.source.get(id) {
                        staged.set(existing.clone());
                    }
                }
            }
            staged.merge(&output.source);
            batch.absorb(output);
        }
        Ok(batch)
    }

    /// Publishes normalized records, then files their placeholders and
    /// applies any held-back payloads they unblock
    fn apply_output(&mut self, operation: &OperationDescriptor, output: NormalizeOutput) -> Result<PublishSummary> {
        let mut summary = self.publish(output.source);
        let ready = self
            .incremental
            .register(&operation.request.identifier, output.placeholders);
        for response in ready {
            summary.merge(self.publish_incremental(operation, &response)?);
        }
        Ok(summary)
    }

    fn record_write(&mut self, identifier: &RequestIdentifier) {
        let epoch = self.next_epoch();
        self.operation_writes.insert(
            identifier.clone(),
            OperationWrite {
                epoch,
                fetched_at: Instant::now(),
            },
        );
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    fn mark_dirty(&mut self, ids: HashSet<DataId>) {
        if ids.is_empty() {
            return;
        }
        self.revision += 1;
        self.dirty.extend(ids);
    }

    /// Refolds optimistic layers after the base changed underneath them
    fn rebase_optimistic(&mut self) {
        if !self.optimistic.is_empty() {
            let touched = self.optimistic.rebuild(&self.source);
            self.mark_dirty(touched);
        }
    }

    /// Marks a record stale for every operation written before now
    pub fn invalidate_record(&mut self, id: &DataId) {
        let epoch = self.next_epoch();
        match self.source.get_mut(id) {
            Some(record) => record.mark_invalidated(epoch),
            None => {
                tracing::debug!(record = %id, "ignoring invalidation of absent record");
                return;
            }
        }
        self.rebase_optimistic();
    }

    /// Marks every operation written before now stale
    pub fn invalidate_store(&mut self) {
        self.global_invalidation = Some(self.next_epoch());
    }

    // ---- optimistic updates ----

    /// Layers records over the base until reverted or committed
    pub fn apply_optimistic(&mut self, source: RecordSource) -> OptimisticHandle {
        let (handle, changed) = self.optimistic.push(source, &self.source);
        self.mark_dirty(changed);
        tracing::debug!(layers = self.optimistic.len(), "applied optimistic layer");
        handle
    }

    /// Normalizes a predicted response and layers it over the base
    pub fn apply_optimistic_response(
        &mut self,
        operation: &OperationDescriptor,
        data: &Value,
    ) -> Result<OptimisticHandle> {
        let output = {
            let view = self.view();
            Normalizer::new(&view, &self.config.id_field).normalize(&operation.root, ROOT_TYPE, data)?
        };
        Ok(self.apply_optimistic(output.source))
    }

    /// Removes an optimistic layer; the layers above it stay applied
    ///
    /// # Panics
    ///
    /// Panics if the layer was already reverted or committed.
    pub fn revert_optimistic(&mut self, handle: OptimisticHandle) {
        let (_, changed) = self.optimistic.remove(handle, &self.source);
        self.mark_dirty(changed);
        self.resume_collection();
    }

    /// Moves an optimistic layer's records into the base
    pub fn commit_optimistic(&mut self, handle: OptimisticHandle) -> PublishSummary {
        let (layer, changed) = self.optimistic.remove(handle, &self.source);
        self.mark_dirty(changed);
        let summary = self.publish(layer);
        self.resume_collection();
        summary
    }

    pub fn optimistic_layer_count(&self) -> usize {
        self.optimistic.len()
    }

    // ---- retention and garbage collection ----

    /// Protects the records reachable from an operation from collection
    pub fn retain(&mut self, operation: &OperationDescriptor) -> RetainHandle {
        RetainHandle {
            identifier: self.gc.retain(operation, &self.source),
        }
    }

    /// # Panics
    ///
    /// Panics if the operation is no longer retained.
    pub fn release(&mut self, handle: RetainHandle) {
        if self.gc.release(&handle.identifier) == ReleaseOutcome::Collectable {
            match self.config.gc_policy {
                GcPolicy::Immediate => {
                    self.collect();
                }
                GcPolicy::Deferred => self.gc_pending = true,
                GcPolicy::Manual => {}
            }
        }
    }

    pub fn is_retained(&self, operation: &OperationDescriptor) -> bool {
        self.gc.is_retained(&operation.request.identifier)
    }

    /// Pauses collection until the hold is released
    pub fn hold_gc(&mut self) -> GcHold {
        self.gc.hold();
        GcHold(())
    }

    pub fn release_gc_hold(&mut self, _hold: GcHold) {
        if self.gc.release_hold() {
            self.resume_collection();
        }
    }

    /// Evicts unreachable records and returns how many were removed
    ///
    /// Postponed while optimistic layers are applied or collection is held.
    /// The root record and every record a subscription has read are kept.
    pub fn collect(&mut self) -> usize {
        if !self.optimistic.is_empty() || self.gc.is_held() {
            tracing::debug!(
                layers = self.optimistic.len(),
                held = self.gc.is_held(),
                "postponing garbage collection"
            );
            self.gc_pending = true;
            return 0;
        }
        self.gc_pending = false;

        let root = DataId::root();
        let extra_roots = self.subscriptions.seen_records().chain(std::iter::once(&root));
        let evicted = self.gc.collect(&mut self.source, extra_roots);
        if !evicted.is_empty() {
            self.revision += 1;
        }
        self.metrics.record_gc(evicted.len());
        evicted.len()
    }

    fn resume_collection(&mut self) {
        if self.gc_pending && self.config.gc_policy == GcPolicy::Immediate {
            self.collect();
        }
    }

    // ---- queued work ----

    /// Applies every queued payload in order, then notifies once
    pub fn run_queue(&mut self, queue: &PublishQueue) -> QueueRunSummary {
        let mut run = QueueRunSummary::default();
        for payload in queue.drain() {
            let outcome = match payload {
                QueuedPayload::Response {
                    operation,
                    response,
                } => self.publish_response(&operation, &response).map(|_| ()),
                QueuedPayload::Source(source) => {
                    self.publish(source);
                    Ok(())
                }
                QueuedPayload::InvalidateRecord(id) => {
                    self.invalidate_record(&id);
                    Ok(())
                }
                QueuedPayload::InvalidateStore => {
                    self.invalidate_store();
                    Ok(())
                }
            };
            match outcome {
                Ok(()) => run.applied += 1,
                Err(error) => {
                    tracing::warn!(%error, "dropping queued payload");
                    run.errors.push(error);
                }
            }
        }
        run.notified = self.notify();
        run
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
