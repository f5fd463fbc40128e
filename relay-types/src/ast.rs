//! Selection-tree descriptors
//!
//! These are the immutable, serializable artifacts emitted by the compiler.
//! A single `Selection` tagged union serves both the reader and the
//! normalization forms: fragment spreads carry their inlined selections for
//! the write path, while the read path masks them behind fragment pointers.

use crate::Variables;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node in a selection tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Selection {
    ScalarField(ScalarField),
    LinkedField(LinkedField),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
    Condition(Condition),
    Defer(Defer),
    Stream(Stream),
    CatchField(CatchField),
}

impl Selection {
    /// Shorthand for an argument-free scalar field
    pub fn scalar(name: impl Into<String>) -> Self {
        Selection::ScalarField(ScalarField::new(name))
    }

    /// Shorthand for a singular linked field
    pub fn linked(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Selection::LinkedField(LinkedField::new(name, selections))
    }
}

/// What happens when a field annotated as required is null or missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequiredAction {
    /// Null the nearest nullable ancestor silently
    None,
    /// Null the nearest nullable ancestor and log the violation
    Log,
    /// Raise to the caller of the reader
    Throw,
}

/// Target representation of a caught field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CatchTo {
    /// Wrap the value in a typed result
    Result,
    /// Replace the value with null when an error is caught
    Null,
}

/// A field argument, bound either to a literal or to a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: ArgumentValue,
}

impl Argument {
    pub fn literal(name: impl Into<String>, value: Value) -> Self {
        Argument {
            name: name.into(),
            value: ArgumentValue::Literal { value },
        }
    }

    pub fn variable(name: impl Into<String>, variable_name: impl Into<String>) -> Self {
        Argument {
            name: name.into(),
            value: ArgumentValue::Variable {
                variable_name: variable_name.into(),
            },
        }
    }
}

/// The value side of an argument binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum ArgumentValue {
    Literal { value: Value },
    Variable { variable_name: String },
    ObjectValue { fields: Vec<Argument> },
    ListValue { items: Vec<ArgumentValue> },
}

/// A leaf field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarField {
    #[serde(default)]
    pub alias: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    /// Precomputed key when every argument is a literal
    #[serde(default)]
    pub storage_key: Option<String>,
    #[serde(default)]
    pub required: Option<RequiredAction>,
}

impl ScalarField {
    pub fn new(name: impl Into<String>) -> Self {
        ScalarField {
            alias: None,
            name: name.into(),
            args: Vec::new(),
            storage_key: None,
            required: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, argument: Argument) -> Self {
        self.args.push(argument);
        self
    }

    pub fn required(mut self, action: RequiredAction) -> Self {
        self.required = Some(action);
        self
    }

    /// Key under which the field appears in responses and read results
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl From<ScalarField> for Selection {
    fn from(field: ScalarField) -> Self {
        Selection::ScalarField(field)
    }
}

/// Marks a linked field as a paginated connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    /// Connection name, unique per parent record
    pub key: String,
    /// Arguments that identify distinct connections (cursor arguments excluded)
    #[serde(default)]
    pub filters: Vec<String>,
}

/// A field pointing at another record (or a list of records)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedField {
    #[serde(default)]
    pub alias: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default)]
    pub storage_key: Option<String>,
    /// Known concrete type; `None` means the payload must carry `__typename`
    #[serde(default)]
    pub concrete_type: Option<String>,
    #[serde(default)]
    pub plural: bool,
    pub selections: Vec<Selection>,
    #[serde(default)]
    pub required: Option<RequiredAction>,
    #[serde(default)]
    pub connection: Option<ConnectionMetadata>,
}

impl LinkedField {
    pub fn new(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        LinkedField {
            alias: None,
            name: name.into(),
            args: Vec::new(),
            storage_key: None,
            concrete_type: None,
            plural: false,
            selections,
            required: None,
            connection: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, argument: Argument) -> Self {
        self.args.push(argument);
        self
    }

    pub fn plural(mut self) -> Self {
        self.plural = true;
        self
    }

    pub fn concrete_type(mut self, type_name: impl Into<String>) -> Self {
        self.concrete_type = Some(type_name.into());
        self
    }

    pub fn required(mut self, action: RequiredAction) -> Self {
        self.required = Some(action);
        self
    }

    pub fn connection(mut self, key: impl Into<String>, filters: Vec<String>) -> Self {
        self.connection = Some(ConnectionMetadata {
            key: key.into(),
            filters,
        });
        self
    }

    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl From<LinkedField> for Selection {
    fn from(field: LinkedField) -> Self {
        Selection::LinkedField(field)
    }
}

/// A named fragment spread
///
/// `selections` holds the fragment body inlined for the write path; the
/// reader never descends into it and emits a fragment pointer instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpread {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default)]
    pub selections: Vec<Selection>,
}

/// A type-conditional group of selections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    pub type_condition: String,
    /// Set when the condition names an interface or union; the payload then
    /// carries this key to signal that the concrete type implements it
    #[serde(default)]
    pub abstract_key: Option<String>,
    pub selections: Vec<Selection>,
}

/// `@include` / `@skip` bound to a boolean variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub condition: String,
    pub passing_value: bool,
    pub selections: Vec<Selection>,
}

/// `@defer` placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defer {
    pub label: String,
    #[serde(default, rename = "if")]
    pub if_condition: Option<String>,
    pub selections: Vec<Selection>,
}

/// `@stream` placeholder wrapping a plural linked field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub label: String,
    #[serde(default, rename = "if")]
    pub if_condition: Option<String>,
    pub selections: Vec<Selection>,
}

/// `@catch` wrapper around a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchField {
    pub field: Box<Selection>,
    pub to: CatchTo,
}

/// Declared argument of a fragment or operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum ArgumentDefinition {
    LocalArgument {
        name: String,
        #[serde(default)]
        default_value: Value,
    },
    RootArgument {
        name: String,
    },
}

impl ArgumentDefinition {
    pub fn name(&self) -> &str {
        match self {
            ArgumentDefinition::LocalArgument { name, .. } => name,
            ArgumentDefinition::RootArgument { name } => name,
        }
    }
}

/// Per-fragment read contract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentMetadata {
    #[serde(default)]
    pub plural: bool,
    /// Field errors raise instead of being logged
    #[serde(default)]
    pub throw_on_field_error: bool,
}

/// Read-side descriptor of a fragment or of an operation's root selections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderFragment {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub metadata: FragmentMetadata,
    #[serde(default)]
    pub argument_definitions: Vec<ArgumentDefinition>,
    pub selections: Vec<Selection>,
}

impl ReaderFragment {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, selections: Vec<Selection>) -> Self {
        ReaderFragment {
            name: name.into(),
            type_name: type_name.into(),
            metadata: FragmentMetadata::default(),
            argument_definitions: Vec::new(),
            selections,
        }
    }
}

/// Write-side descriptor of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationOperation {
    pub name: String,
    #[serde(default)]
    pub argument_definitions: Vec<ArgumentDefinition>,
    pub selections: Vec<Selection>,
}

/// Identifying parameters of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParameters {
    pub name: String,
    /// Persisted query id, when available
    #[serde(default)]
    pub id: Option<String>,
}

/// A compiled operation: its read view and its normalization view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteRequest {
    pub params: RequestParameters,
    pub fragment: ReaderFragment,
    pub operation: NormalizationOperation,
}

impl ConcreteRequest {
    /// Builds a request whose read and write views share one selection list
    pub fn new(name: impl Into<String>, argument_definitions: Vec<ArgumentDefinition>, selections: Vec<Selection>) -> Self {
        let name = name.into();
        ConcreteRequest {
            params: RequestParameters {
                name: name.clone(),
                id: None,
            },
            fragment: ReaderFragment {
                name: name.clone(),
                type_name: crate::ROOT_TYPE.to_string(),
                metadata: FragmentMetadata::default(),
                argument_definitions: argument_definitions.clone(),
                selections: selections.clone(),
            },
            operation: NormalizationOperation {
                name,
                argument_definitions,
                selections,
            },
        }
    }

    /// Applies declared defaults to the supplied variables
    pub fn operation_variables(&self, variables: &Variables) -> Variables {
        let mut resolved = Variables::new();
        for definition in &self.operation.argument_definitions {
            let name = definition.name();
            let value = match (variables.get(name), definition) {
                (Some(value), _) => value.clone(),
                (None, ArgumentDefinition::LocalArgument { default_value, .. }) => default_value.clone(),
                (None, ArgumentDefinition::RootArgument { .. }) => Value::Null,
            };
            resolved.insert(name.to_string(), value);
        }
        resolved
    }
}
