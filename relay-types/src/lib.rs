//! Shared types for the relay record store
//!
//! This crate holds the in-process interfaces the store consumes from its
//! collaborators: record identities and variables, the selection-tree
//! descriptors produced by the compiler, and the raw GraphQL response shape
//! delivered by the network layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod ast;
pub mod response;

pub use ast::{
    Argument, ArgumentDefinition, ArgumentValue, CatchField, CatchTo, ConcreteRequest, Condition,
    ConnectionMetadata, Defer, FragmentMetadata, FragmentSpread, InlineFragment, LinkedField,
    NormalizationOperation, ReaderFragment, RequestParameters, RequiredAction, ScalarField,
    Selection, Stream,
};
pub use response::{format_path, GraphQLError, GraphQLResponse, PathSegment};

/// Variable bindings for a query or fragment
///
/// Ordered so that serializing a set of variables is stable.
pub type Variables = BTreeMap<String, serde_json::Value>;

/// Prefix shared by every client-generated identity
pub const CLIENT_ID_PREFIX: &str = "client:";

/// Identity of the synthetic query root record
pub const ROOT_ID: &str = "client:root";

/// Type name of the synthetic query root record
pub const ROOT_TYPE: &str = "__Root";

/// Data identity of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataId(pub String);

impl DataId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity of the query root record
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for identities synthesized on the client rather than supplied by the server
    pub fn is_client_id(&self) -> bool {
        self.0.starts_with(CLIENT_ID_PREFIX)
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataId {
    fn from(id: &str) -> Self {
        DataId(id.to_string())
    }
}

impl From<String> for DataId {
    fn from(id: String) -> Self {
        DataId(id)
    }
}
