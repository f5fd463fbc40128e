//! Field storage keys and variable resolution
//!
//! A storage key is the field name plus its resolved, non-null arguments
//! sorted by name: `friends(first:10,orderBy:"name")`. The same field
//! fetched with different arguments therefore lands under distinct keys of
//! the same record.

use relay_types::{
    Argument, ArgumentDefinition, ArgumentValue, ConnectionMetadata, LinkedField, ScalarField,
    Variables,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Resolves argument bindings against a variables mapping
///
/// Unbound variables resolve to null.
pub fn get_argument_values(args: &[Argument], variables: &Variables) -> BTreeMap<String, Value> {
    args.iter()
        .map(|arg| (arg.name.clone(), resolve_value(&arg.value, variables)))
        .collect()
}

fn resolve_value(value: &ArgumentValue, variables: &Variables) -> Value {
    match value {
        ArgumentValue::Literal { value } => value.clone(),
        ArgumentValue::Variable { variable_name } => {
            variables.get(variable_name).cloned().unwrap_or(Value::Null)
        }
        ArgumentValue::ObjectValue { fields } => {
            let object: Map<String, Value> = fields
                .iter()
                .map(|field| (field.name.clone(), resolve_value(&field.value, variables)))
                .collect();
            Value::Object(object)
        }
        ArgumentValue::ListValue { items } => {
            Value::Array(items.iter().map(|item| resolve_value(item, variables)).collect())
        }
    }
}

/// Formats `name(arg:json,...)`, omitting null arguments
///
/// `serde_json` objects keep their keys sorted, so nested input objects
/// encode identically regardless of the order they were written in.
pub fn format_storage_key(name: &str, args: &BTreeMap<String, Value>) -> String {
    let rendered: Vec<String> = args
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| format!("{}:{}", key, value))
        .collect();
    if rendered.is_empty() {
        name.to_string()
    } else {
        format!("{}({})", name, rendered.join(","))
    }
}

/// Storage key for a field, preferring a precomputed static key
pub fn get_storage_key(
    name: &str,
    static_key: Option<&str>,
    args: &[Argument],
    variables: &Variables,
) -> String {
    if let Some(key) = static_key {
        return key.to_string();
    }
    if args.is_empty() {
        return name.to_string();
    }
    format_storage_key(name, &get_argument_values(args, variables))
}

pub fn scalar_storage_key(field: &ScalarField, variables: &Variables) -> String {
    get_storage_key(&field.name, field.storage_key.as_deref(), &field.args, variables)
}

pub fn linked_storage_key(field: &LinkedField, variables: &Variables) -> String {
    get_storage_key(&field.name, field.storage_key.as_deref(), &field.args, variables)
}

/// Storage key of the client-side connection record for a paginated field
///
/// Only the arguments listed as filters participate, so every page of the
/// same connection maps to one key regardless of its cursor arguments.
pub fn get_handle_storage_key(
    connection: &ConnectionMetadata,
    args: &[Argument],
    variables: &Variables,
) -> String {
    let handle = format!("__{}_connection", connection.key);
    let filters: BTreeMap<String, Value> = get_argument_values(args, variables)
        .into_iter()
        .filter(|(name, _)| connection.filters.iter().any(|filter| filter == name))
        .collect();
    format_storage_key(&handle, &filters)
}

/// Variables in scope for a fragment body
///
/// Arguments passed at the spread win; local definitions otherwise fall back
/// to their defaults and root definitions to the operation's variables.
pub fn get_fragment_variables(
    definitions: &[ArgumentDefinition],
    root_variables: &Variables,
    arguments: &Variables,
) -> Variables {
    let mut variables = arguments.clone();
    for definition in definitions {
        let name = definition.name();
        if arguments.contains_key(name) {
            continue;
        }
        match definition {
            ArgumentDefinition::LocalArgument { default_value, .. } => {
                variables.insert(name.to_string(), default_value.clone());
            }
            ArgumentDefinition::RootArgument { .. } => {
                if let Some(value) = root_variables.get(name) {
                    variables.insert(name.to_string(), value.clone());
                }
            }
        }
    }
    variables
}

/// Variables visible inside an inlined fragment spread
///
/// Spread arguments shadow the enclosing scope.
pub fn spread_variables(args: &[Argument], variables: &Variables) -> Variables {
    if args.is_empty() {
        return variables.clone();
    }
    let mut scoped = variables.clone();
    scoped.extend(get_argument_values(args, variables));
    scoped
}
