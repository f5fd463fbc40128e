//! Publish queue
//!
//! Network callbacks and mutation code can run outside the owner of the
//! [`Store`](crate::Store). They enqueue work here; the owner drains the
//! queue with [`Store::run_queue`](crate::Store::run_queue), applying every
//! payload in arrival order and notifying subscribers once at the end.

use crate::record_source::RecordSource;
use crate::selector::OperationDescriptor;
use parking_lot::Mutex;
use relay_types::{DataId, GraphQLResponse};
use std::collections::VecDeque;
use std::sync::Arc;

/// A unit of work waiting to be applied to the store
#[derive(Debug, Clone)]
pub enum QueuedPayload {
    /// A server response for an operation, initial or incremental
    Response {
        operation: OperationDescriptor,
        response: GraphQLResponse,
    },
    /// Records written directly, e.g. by a local update
    Source(RecordSource),
    InvalidateRecord(DataId),
    InvalidateStore,
}

/// Thread-safe FIFO of pending store writes
///
/// Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct PublishQueue {
    pending: Arc<Mutex<VecDeque<QueuedPayload>>>,
}

impl PublishQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, payload: QueuedPayload) {
        self.pending.lock().push_back(payload);
    }

    pub fn enqueue_response(&self, operation: OperationDescriptor, response: GraphQLResponse) {
        self.enqueue(QueuedPayload::Response {
            operation,
            response,
        });
    }

    pub fn enqueue_source(&self, source: RecordSource) {
        self.enqueue(QueuedPayload::Source(source));
    }

    pub fn enqueue_invalidation(&self, id: DataId) {
        self.enqueue(QueuedPayload::InvalidateRecord(id));
    }

    pub fn enqueue_store_invalidation(&self) {
        self.enqueue(QueuedPayload::InvalidateStore);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Takes every pending payload, oldest first
    pub fn drain(&self) -> Vec<QueuedPayload> {
        self.pending.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clones_share_queue() {
        let queue = PublishQueue::new();
        let producer = queue.clone();
        producer.enqueue_invalidation(DataId::new("1"));
        producer.enqueue_store_invalidation();

        assert_eq!(queue.len(), 2);
        let drained = queue.drain();
        assert!(matches!(drained[0], QueuedPayload::InvalidateRecord(ref id) if id.as_str() == "1"));
        assert!(matches!(drained[1], QueuedPayload::InvalidateStore));
        assert!(producer.is_empty());
    }

    #[test]
    fn test_enqueue_from_threads() {
        let queue = PublishQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let queue = queue.clone();
                thread::spawn(move || queue.enqueue_invalidation(DataId::new(n.to_string())))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.drain().len(), 4);
    }
}
