//! Selectors: a selection tree bound to a starting record and variables
//!
//! Reader selectors drive reads and subscriptions, normalization selectors
//! drive writes, marking and availability checks. An operation descriptor
//! bundles both views of one request with its resolved variables.

use crate::snapshot::Data;
use crate::storage_key::get_fragment_variables;
use blake3::Hasher;
use relay_types::{
    ConcreteRequest, DataId, ReaderFragment, RequestParameters, Selection, Variables,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Key under which a fragment pointer stores the record identity
pub const ID_KEY: &str = "__id";
/// Key under which a fragment pointer lists the spread fragments and their arguments
pub const FRAGMENTS_KEY: &str = "__fragments";
/// Key under which a fragment pointer stores the owning request
pub const FRAGMENT_OWNER_KEY: &str = "__fragmentOwner";

/// Identity of a request: operation id (or name) plus its variables
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestIdentifier(String);

impl RequestIdentifier {
    pub fn new(params: &RequestParameters, variables: &Variables) -> Self {
        let name = params.id.as_deref().unwrap_or(&params.name);
        RequestIdentifier(format!("{}{}", name, stable_json(variables)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Variables encoded with sorted keys
pub fn stable_json(variables: &Variables) -> String {
    let object: serde_json::Map<String, Value> = variables
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Value::Object(object).to_string()
}

/// A request together with the variables it was issued with
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub identifier: RequestIdentifier,
    pub node: Arc<ConcreteRequest>,
    pub variables: Variables,
}

impl RequestDescriptor {
    pub fn new(node: Arc<ConcreteRequest>, variables: Variables) -> Self {
        RequestDescriptor {
            identifier: RequestIdentifier::new(&node.params, &variables),
            node,
            variables,
        }
    }
}

impl PartialEq for RequestDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

/// Write-side selector: selections to walk from a record
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationSelector {
    pub data_id: DataId,
    pub selections: Arc<[Selection]>,
    pub variables: Variables,
}

impl NormalizationSelector {
    pub fn new(data_id: DataId, selections: Arc<[Selection]>, variables: Variables) -> Self {
        NormalizationSelector {
            data_id,
            selections,
            variables,
        }
    }
}

/// Read-side selector for a single record
#[derive(Debug, Clone, PartialEq)]
pub struct SingularReaderSelector {
    pub data_id: DataId,
    pub fragment: Arc<ReaderFragment>,
    pub variables: Variables,
    pub owner: RequestDescriptor,
}

impl SingularReaderSelector {
    pub fn new(
        data_id: DataId,
        fragment: Arc<ReaderFragment>,
        variables: Variables,
        owner: RequestDescriptor,
    ) -> Self {
        SingularReaderSelector {
            data_id,
            fragment,
            variables,
            owner,
        }
    }

    /// Rebuilds a selector from a fragment pointer produced by a parent read
    ///
    /// Returns `None` when the pointer does not carry `fragment`.
    pub fn from_fragment_ref(fragment: Arc<ReaderFragment>, pointer: &Data) -> Option<Self> {
        let id = match pointer.get(ID_KEY)? {
            Data::Scalar(Value::String(id)) => DataId::new(id.clone()),
            _ => return None,
        };
        let arguments = match pointer.get(FRAGMENTS_KEY)?.get(&fragment.name)? {
            Data::Scalar(Value::Object(args)) => args
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            _ => Variables::new(),
        };
        let owner = match pointer.get(FRAGMENT_OWNER_KEY)? {
            Data::Owner(owner) => owner.as_ref().clone(),
            _ => return None,
        };
        let variables =
            get_fragment_variables(&fragment.argument_definitions, &owner.variables, &arguments);
        Some(SingularReaderSelector::new(id, fragment, variables, owner))
    }

    /// Digest identifying this read for snapshot caching
    pub fn cache_key(&self) -> SelectorKey {
        let mut hasher = Hasher::new();
        hasher.update(self.fragment.name.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.data_id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(stable_json(&self.variables).as_bytes());
        hasher.update(&[0]);
        hasher.update(self.owner.identifier.as_str().as_bytes());
        SelectorKey(*hasher.finalize().as_bytes())
    }
}

/// Read-side selector over several records sharing one plural fragment
#[derive(Debug, Clone, PartialEq)]
pub struct PluralReaderSelector {
    pub selectors: Vec<SingularReaderSelector>,
}

/// Blake3 digest of a reader selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectorKey(pub [u8; 32]);

/// Read and write views of one executed request
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    pub fragment: SingularReaderSelector,
    pub request: RequestDescriptor,
    pub root: NormalizationSelector,
}

/// Binds a compiled request to variables, applying argument defaults
pub fn create_operation_descriptor(
    request: Arc<ConcreteRequest>,
    variables: &Variables,
) -> OperationDescriptor {
    let operation_variables = request.operation_variables(variables);
    let descriptor = RequestDescriptor::new(request.clone(), operation_variables.clone());
    let root_id = DataId::root();

    OperationDescriptor {
        fragment: SingularReaderSelector::new(
            root_id.clone(),
            Arc::new(request.fragment.clone()),
            operation_variables.clone(),
            descriptor.clone(),
        ),
        root: NormalizationSelector::new(
            root_id,
            request.operation.selections.clone().into(),
            operation_variables,
        ),
        request: descriptor,
    }
}
