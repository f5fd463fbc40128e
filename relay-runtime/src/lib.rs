//! Relay Record Store
//!
//! This crate is the client-side cache of a GraphQL client. Server responses
//! are flattened into normalized records keyed by identity, queries and
//! fragments are read back out as immutable snapshots, and records that no
//! live query can reach are garbage collected.
//!
//! # Architecture
//!
//! ```text
//! response ──normalize──▶ RecordSource ──publish──▶ Store ──notify──▶ subscribers
//!                                                    │
//!                                 lookup ◀──read─────┤
//!                                                    └──collect──▶ evicted records
//! ```
//!
//! - **Normalizer** walks a normalization selector alongside a payload and
//!   writes partial records into a scratch source, so a malformed payload
//!   never reaches the store.
//! - **Reader** walks a fragment's reader selections over the records and
//!   builds a snapshot, recording every identity it consulted.
//! - **Store** merges sources, tracks which records changed, and re-reads
//!   only the subscriptions that saw them. Optimistic layers sit over the
//!   base records until reverted or committed.
//! - **Garbage collector** marks from retained operations and sweeps the
//!   rest.
//!
//! The reader, the reference marker and the availability checker share one
//! traversal of the selection tree, in [`traversal`].
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_runtime::{create_operation_descriptor, Store, StoreConfig};
//! use relay_types::GraphQLResponse;
//!
//! let mut store = Store::new(StoreConfig::default());
//! let operation = create_operation_descriptor(request, &variables);
//!
//! let retain = store.retain(&operation);
//! store.publish_response(&operation, &GraphQLResponse::data(payload))?;
//! store.notify();
//!
//! let snapshot = store.lookup(&operation.fragment);
//! store.release(retain);
//! ```

#![warn(missing_debug_implementations)]

// Records and sources
pub mod record;
pub mod record_source;
pub mod storage_key;
pub mod selector;

// Traversals
pub mod traversal;
pub mod normalizer;
pub mod connection;
pub mod reader;
pub mod recycle;
pub mod marker;
pub mod checker;
pub mod snapshot;

// Store
pub mod store;
pub mod gc;
pub mod queue;
pub mod config;
pub mod metrics;
pub mod error;

// Re-export main types
pub use checker::{check, CheckResult};
pub use config::{GcPolicy, StoreConfig};
pub use error::{ConfigError, NormalizeError, ReadError, Result, StoreError};
pub use gc::GarbageCollector;
pub use marker::{mark, MarkMode};
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use normalizer::{IncrementalPlaceholder, NormalizeOutput, Normalizer};
pub use queue::{PublishQueue, QueuedPayload};
pub use reader::{read, read_plural, try_read};
pub use record::{generate_client_id, FieldValue, Record};
pub use record_source::{LayeredSource, RecordEntry, RecordSource, RecordSourceRead, RecordState};
pub use recycle::recycle_nodes_into;
pub use selector::{
    create_operation_descriptor, NormalizationSelector, OperationDescriptor, PluralReaderSelector,
    RequestDescriptor, RequestIdentifier, SingularReaderSelector,
};
pub use snapshot::{Data, DataAvailability, PluralSnapshot, Snapshot};
pub use store::{
    GcHold, OperationAvailability, OptimisticHandle, PublishSummary, QueueRunSummary, RetainHandle,
    Store, SubscriptionHandle,
};
pub use relay_types::{DataId, GraphQLError, GraphQLResponse, PathSegment, Variables};
