//! Normalization of response payloads into records
//!
//! The normalizer walks a normalization selector in lockstep with a raw
//! payload. It reads the existing source only to reuse links and extend
//! connections; every write goes to a scratch [`RecordSource`] of partial
//! records. The caller merges that scratch source into its own storage only
//! when normalization succeeds, so a malformed payload never leaves half of
//! its records behind.

use crate::connection;
use crate::error::{NormalizeError, NormalizeResult};
use crate::record::{generate_client_id, Record};
use crate::record_source::{RecordSource, RecordSourceRead, RecordState};
use crate::selector::NormalizationSelector;
use crate::storage_key::{linked_storage_key, scalar_storage_key, spread_variables};
use crate::traversal::evaluate_condition;
use relay_types::{
    format_path, DataId, GraphQLError, LinkedField, PathSegment, ScalarField, Selection, Variables,
};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Work left behind by a `@defer` or `@stream` whose data arrives later
#[derive(Debug, Clone, PartialEq)]
pub enum IncrementalPlaceholder {
    Defer {
        label: String,
        /// Response path of the record the deferred selections apply to
        path: Vec<PathSegment>,
        selector: NormalizationSelector,
        type_name: String,
    },
    Stream {
        label: String,
        /// Response path of the record holding the streamed list
        path: Vec<PathSegment>,
        parent_id: DataId,
        field: LinkedField,
        variables: Variables,
    },
}

impl IncrementalPlaceholder {
    pub fn label(&self) -> &str {
        match self {
            IncrementalPlaceholder::Defer { label, .. } => label,
            IncrementalPlaceholder::Stream { label, .. } => label,
        }
    }

    pub fn path(&self) -> &[PathSegment] {
        match self {
            IncrementalPlaceholder::Defer { path, .. } => path,
            IncrementalPlaceholder::Stream { path, .. } => path,
        }
    }
}

/// Records written by one normalization
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutput {
    /// Partial records holding only the fields this payload wrote
    pub source: RecordSource,
    /// Identities that did not exist before this write
    pub created: BTreeSet<DataId>,
    /// Identities that already existed and were written to
    pub updated: BTreeSet<DataId>,
    pub placeholders: Vec<IncrementalPlaceholder>,
}

impl NormalizeOutput {
    /// Appends a later normalization of the same payload
    pub fn absorb(&mut self, other: NormalizeOutput) {
        self.source.merge(&other.source);
        self.updated
            .extend(other.updated.into_iter().filter(|id| !self.created.contains(id)));
        self.created.extend(other.created);
        self.placeholders.extend(other.placeholders);
    }
}

/// Configured entry point for normalizing payloads against a source
#[derive(Debug)]
pub struct Normalizer<'a, S: ?Sized> {
    base: &'a S,
    id_field: &'a str,
    errors: &'a [GraphQLError],
    path: Vec<PathSegment>,
}

impl<'a, S: RecordSourceRead + ?Sized> Normalizer<'a, S> {
    pub fn new(base: &'a S, id_field: &'a str) -> Self {
        Normalizer {
            base,
            id_field,
            errors: &[],
            path: Vec::new(),
        }
    }

    /// Response errors to attach to the fields at their paths
    pub fn with_errors(mut self, errors: &'a [GraphQLError]) -> Self {
        self.errors = errors;
        self
    }

    /// Response path of the starting record, for incremental payloads
    pub fn at_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// Normalizes `data` into the selector's record
    pub fn normalize(
        self,
        selector: &NormalizationSelector,
        type_name: &str,
        data: &Value,
    ) -> NormalizeResult<NormalizeOutput> {
        let Value::Object(object) = data else {
            return Err(NormalizeError::InvalidRoot {
                found: kind_of(data).to_string(),
            });
        };
        let mut writer = Writer::new(self.base, self.id_field, self.errors, self.path, &selector.variables);
        writer.write_record(&selector.data_id, type_name, object, &selector.selections)?;
        Ok(writer.finish())
    }

    /// Normalizes one streamed list item and splices it into the parent's list
    ///
    /// The parent list is padded with nulls when the item lands past its end.
    pub fn normalize_stream_item(
        self,
        placeholder: &IncrementalPlaceholder,
        index: usize,
        item: &Value,
    ) -> NormalizeResult<NormalizeOutput> {
        let IncrementalPlaceholder::Stream {
            path,
            parent_id,
            field,
            variables,
            ..
        } = placeholder
        else {
            return Ok(NormalizeOutput::default());
        };
        let Some(parent) = self.base.get(parent_id) else {
            return Ok(NormalizeOutput::default());
        };
        let parent_type = parent.typename().to_string();
        let storage_key = linked_storage_key(field, variables);
        let mut ids: Vec<Option<DataId>> = parent
            .get_linked_record_ids(&storage_key)
            .flatten()
            .map(<[Option<DataId>]>::to_vec)
            .unwrap_or_default();

        let mut writer = Writer::new(self.base, self.id_field, self.errors, path.clone(), variables);
        writer.path.push(PathSegment::Key(field.response_key().to_string()));
        writer.path.push(PathSegment::Index(index));

        let id = match item {
            Value::Null => None,
            Value::Object(object) => {
                let previous = ids.get(index).cloned().flatten();
                Some(writer.write_item(parent_id, &storage_key, Some(index), field, object, previous)?)
            }
            other => return Err(writer.shape_error("object", other)),
        };

        if ids.len() <= index {
            ids.resize(index + 1, None);
        }
        ids[index] = id;
        writer
            .sink_record(parent_id, &parent_type)
            .set_linked_record_ids(storage_key, ids);
        Ok(writer.finish())
    }
}

struct Writer<'a, S: ?Sized> {
    base: &'a S,
    id_field: &'a str,
    errors: HashMap<Vec<PathSegment>, Vec<GraphQLError>>,
    path: Vec<PathSegment>,
    variables: Variables,
    sink: RecordSource,
    created: BTreeSet<DataId>,
    placeholders: Vec<IncrementalPlaceholder>,
}

impl<'a, S: RecordSourceRead + ?Sized> Writer<'a, S> {
    fn new(
        base: &'a S,
        id_field: &'a str,
        errors: &[GraphQLError],
        path: Vec<PathSegment>,
        variables: &Variables,
    ) -> Self {
        let mut by_path: HashMap<Vec<PathSegment>, Vec<GraphQLError>> = HashMap::new();
        for error in errors {
            if let Some(path) = &error.path {
                by_path.entry(path.clone()).or_default().push(error.clone());
            }
        }
        Writer {
            base,
            id_field,
            errors: by_path,
            path,
            variables: variables.clone(),
            sink: RecordSource::new(),
            created: BTreeSet::new(),
            placeholders: Vec::new(),
        }
    }

    fn finish(self) -> NormalizeOutput {
        let updated = self
            .sink
            .ids()
            .filter(|id| !self.created.contains(*id))
            .cloned()
            .collect();
        NormalizeOutput {
            source: self.sink,
            created: self.created,
            updated,
            placeholders: self.placeholders,
        }
    }

    fn sink_record(&mut self, id: &DataId, type_name: &str) -> &mut Record {
        self.sink.get_or_create_mut(id, type_name)
    }

    fn shape_error(&self, expected: &'static str, found: &Value) -> NormalizeError {
        NormalizeError::PayloadShape {
            path: format_path(&self.path),
            expected,
            found: kind_of(found).to_string(),
        }
    }

    fn write_record(
        &mut self,
        id: &DataId,
        type_name: &str,
        data: &Map<String, Value>,
        selections: &[Selection],
    ) -> NormalizeResult<()> {
        if !self.sink.has(id) && self.base.status(id) != RecordState::Existent {
            self.created.insert(id.clone());
        }
        let record = self.sink_record(id, type_name);
        if record.typename() != type_name {
            record.set_typename(type_name);
        }
        self.write_selections(id, type_name, data, selections)
    }

    fn write_selections(
        &mut self,
        id: &DataId,
        type_name: &str,
        data: &Map<String, Value>,
        selections: &[Selection],
    ) -> NormalizeResult<()> {
        for selection in selections {
            match selection {
                Selection::ScalarField(field) => self.write_scalar(id, type_name, field, data)?,
                Selection::LinkedField(field) => self.write_linked(id, type_name, field, data)?,
                Selection::CatchField(catch) => {
                    self.write_selections(id, type_name, data, std::slice::from_ref(catch.field.as_ref()))?
                }
                Selection::FragmentSpread(spread) => {
                    let scoped = spread_variables(&spread.args, &self.variables);
                    let outer = std::mem::replace(&mut self.variables, scoped);
                    let result = self.write_selections(id, type_name, data, &spread.selections);
                    self.variables = outer;
                    result?
                }
                Selection::InlineFragment(fragment) => match &fragment.abstract_key {
                    Some(abstract_key) => {
                        let implements = data.contains_key(abstract_key);
                        self.sink_record(id, type_name)
                            .set_value(abstract_key.clone(), Value::Bool(implements));
                        if implements {
                            self.write_selections(id, type_name, data, &fragment.selections)?
                        }
                    }
                    None => {
                        if fragment.type_condition == type_name {
                            self.write_selections(id, type_name, data, &fragment.selections)?
                        }
                    }
                },
                Selection::Condition(condition) => {
                    if evaluate_condition(condition, &self.variables) {
                        self.write_selections(id, type_name, data, &condition.selections)?
                    }
                }
                Selection::Defer(defer) => {
                    let deferred = is_incremental(defer.if_condition.as_deref(), &self.variables);
                    if !deferred || has_response_keys(&defer.selections, data) {
                        self.write_selections(id, type_name, data, &defer.selections)?
                    } else {
                        self.placeholders.push(IncrementalPlaceholder::Defer {
                            label: defer.label.clone(),
                            path: self.path.clone(),
                            selector: NormalizationSelector::new(
                                id.clone(),
                                defer.selections.clone().into(),
                                self.variables.clone(),
                            ),
                            type_name: type_name.to_string(),
                        });
                    }
                }
                Selection::Stream(stream) => {
                    self.write_selections(id, type_name, data, &stream.selections)?;
                    if is_incremental(stream.if_condition.as_deref(), &self.variables) {
                        for selection in &stream.selections {
                            if let Selection::LinkedField(field) = selection {
                                self.placeholders.push(IncrementalPlaceholder::Stream {
                                    label: stream.label.clone(),
                                    path: self.path.clone(),
                                    parent_id: id.clone(),
                                    field: field.clone(),
                                    variables: self.variables.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn attach_errors(&mut self, id: &DataId, type_name: &str, storage_key: &str) {
        if self.errors.is_empty() {
            return;
        }
        if let Some(errors) = self.errors.get(&self.path).cloned() {
            self.sink_record(id, type_name).set_errors(storage_key, errors);
        }
    }

    fn write_scalar(
        &mut self,
        id: &DataId,
        type_name: &str,
        field: &ScalarField,
        data: &Map<String, Value>,
    ) -> NormalizeResult<()> {
        if field.name == "__typename" || field.name == "__id" {
            return Ok(());
        }
        let key = field.response_key();
        let Some(value) = data.get(key) else {
            return Ok(());
        };

        let depth = self.path.len();
        self.path.push(PathSegment::Key(key.to_string()));
        if let Some((index, found)) = object_within(value) {
            self.path.extend(index.map(PathSegment::Index));
            let err = self.shape_error("scalar", found);
            self.path.truncate(depth);
            return Err(err);
        }
        let storage_key = scalar_storage_key(field, &self.variables);
        self.attach_errors(id, type_name, &storage_key);
        self.sink_record(id, type_name).set_value(storage_key, value.clone());
        self.path.pop();
        Ok(())
    }

    fn write_linked(
        &mut self,
        id: &DataId,
        type_name: &str,
        field: &LinkedField,
        data: &Map<String, Value>,
    ) -> NormalizeResult<()> {
        let key = field.response_key();
        let Some(value) = data.get(key) else {
            return Ok(());
        };
        let storage_key = linked_storage_key(field, &self.variables);

        self.path.push(PathSegment::Key(key.to_string()));
        self.attach_errors(id, type_name, &storage_key);
        let result = match value {
            Value::Null => {
                self.sink_record(id, type_name).set_value(storage_key.clone(), Value::Null);
                Ok(())
            }
            Value::Object(object) if !field.plural => {
                self.write_singular(id, type_name, field, &storage_key, object)
            }
            Value::Array(items) if field.plural => {
                self.write_plural(id, type_name, field, &storage_key, items)
            }
            other if field.plural => Err(self.shape_error("list", other)),
            other => Err(self.shape_error("object", other)),
        };
        self.path.pop();
        result?;

        if field.connection.is_some() && !value.is_null() {
            connection::update(self.base, &mut self.sink, id, field, &storage_key, &self.variables);
        }
        Ok(())
    }

    fn write_singular(
        &mut self,
        parent_id: &DataId,
        parent_type: &str,
        field: &LinkedField,
        storage_key: &str,
        object: &Map<String, Value>,
    ) -> NormalizeResult<()> {
        let previous = self.existing_link(parent_id, storage_key);
        let next_id = self.write_item(parent_id, storage_key, None, field, object, previous)?;
        self.sink_record(parent_id, parent_type)
            .set_linked_record_id(storage_key, next_id);
        Ok(())
    }

    fn write_plural(
        &mut self,
        parent_id: &DataId,
        parent_type: &str,
        field: &LinkedField,
        storage_key: &str,
        items: &[Value],
    ) -> NormalizeResult<()> {
        let previous = self.existing_links(parent_id, storage_key);
        let mut ids = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            self.path.push(PathSegment::Index(index));
            let next = match item {
                Value::Null => Ok(None),
                Value::Object(object) => {
                    let previous_id = previous.get(index).cloned().flatten();
                    self.write_item(parent_id, storage_key, Some(index), field, object, previous_id)
                        .map(Some)
                }
                other => Err(self.shape_error("object", other)),
            };
            self.path.pop();
            ids.push(next?);
        }
        self.sink_record(parent_id, parent_type)
            .set_linked_record_ids(storage_key, ids);
        Ok(())
    }

    /// Writes one linked object and returns its identity
    fn write_item(
        &mut self,
        parent_id: &DataId,
        storage_key: &str,
        index: Option<usize>,
        field: &LinkedField,
        object: &Map<String, Value>,
        previous: Option<DataId>,
    ) -> NormalizeResult<DataId> {
        let next_id = self.resolve_id(parent_id, storage_key, index, object, previous)?;
        let next_type = self.resolve_typename(field, object)?;
        self.write_record(&next_id, &next_type, object, &field.selections)?;
        Ok(next_id)
    }

    /// Link already stored at `storage_key`, preferring this write's records
    fn existing_link(&self, id: &DataId, storage_key: &str) -> Option<DataId> {
        self.sink
            .get(id)
            .and_then(|record| record.get_linked_record_id(storage_key))
            .or_else(|| {
                self.base
                    .get(id)
                    .and_then(|record| record.get_linked_record_id(storage_key))
            })
            .flatten()
            .cloned()
    }

    fn existing_links(&self, id: &DataId, storage_key: &str) -> Vec<Option<DataId>> {
        self.sink
            .get(id)
            .and_then(|record| record.get_linked_record_ids(storage_key))
            .or_else(|| {
                self.base
                    .get(id)
                    .and_then(|record| record.get_linked_record_ids(storage_key))
            })
            .flatten()
            .map(<[Option<DataId>]>::to_vec)
            .unwrap_or_default()
    }

    /// Server id from the payload, else a previously stored link, else a client id
    fn resolve_id(
        &self,
        parent_id: &DataId,
        storage_key: &str,
        index: Option<usize>,
        object: &Map<String, Value>,
        previous: Option<DataId>,
    ) -> NormalizeResult<DataId> {
        match object.get(self.id_field) {
            Some(Value::String(id)) => Ok(DataId::new(id.clone())),
            Some(Value::Number(id)) => Ok(DataId::new(id.to_string())),
            None | Some(Value::Null) => {
                Ok(previous.unwrap_or_else(|| generate_client_id(parent_id, storage_key, index)))
            }
            Some(other) => Err(NormalizeError::InvalidId {
                path: format_path(&self.path),
                found: other.to_string(),
            }),
        }
    }

    fn resolve_typename(&self, field: &LinkedField, object: &Map<String, Value>) -> NormalizeResult<String> {
        if let Some(concrete) = &field.concrete_type {
            return Ok(concrete.clone());
        }
        match object.get("__typename") {
            Some(Value::String(name)) => Ok(name.clone()),
            _ => Err(NormalizeError::MissingTypename {
                path: format_path(&self.path),
            }),
        }
    }
}

/// Whether a `@defer`/`@stream` with this `if` binding is actually incremental
fn is_incremental(if_condition: Option<&str>, variables: &Variables) -> bool {
    match if_condition {
        None => true,
        Some(name) => variables.get(name) != Some(&Value::Bool(false)),
    }
}

/// True when the payload already carries any field of `selections`
///
/// Servers may resolve a deferred fragment eagerly and inline its fields.
fn has_response_keys(selections: &[Selection], data: &Map<String, Value>) -> bool {
    selections.iter().any(|selection| match selection {
        Selection::ScalarField(field) => {
            field.name != "__typename" && data.contains_key(field.response_key())
        }
        Selection::LinkedField(field) => data.contains_key(field.response_key()),
        Selection::FragmentSpread(spread) => has_response_keys(&spread.selections, data),
        Selection::InlineFragment(fragment) => has_response_keys(&fragment.selections, data),
        Selection::Condition(condition) => has_response_keys(&condition.selections, data),
        Selection::CatchField(catch) => has_response_keys(std::slice::from_ref(catch.field.as_ref()), data),
        Selection::Defer(_) | Selection::Stream(_) => false,
    })
}

/// An object where a scalar belongs, with its index if it sits in a list
fn object_within(value: &Value) -> Option<(Option<usize>, &Value)> {
    match value {
        Value::Object(_) => Some((None, value)),
        Value::Array(items) => items
            .iter()
            .position(|item| object_within(item).is_some())
            .map(|index| (Some(index), &items[index])),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use relay_types::{Defer, InlineFragment, ROOT_TYPE};
    use serde_json::json;
    use std::sync::Arc;

    fn root_selector(selections: Vec<Selection>) -> NormalizationSelector {
        NormalizationSelector::new(DataId::root(), Arc::from(selections), Variables::new())
    }

    fn normalize(base: &RecordSource, selections: Vec<Selection>, data: Value) -> NormalizeResult<NormalizeOutput> {
        Normalizer::new(base, "id").normalize(&root_selector(selections), ROOT_TYPE, &data)
    }

    fn viewer_selections() -> Vec<Selection> {
        vec![LinkedField::new(
            "viewer",
            vec![Selection::scalar("id"), Selection::scalar("name")],
        )
        .concrete_type("User")
        .into()]
    }

    #[test]
    fn test_writes_records_and_links() {
        let base = RecordSource::new();
        let output = normalize(
            &base,
            viewer_selections(),
            json!({"viewer": {"id": "4", "name": "Alice"}}),
        )
        .unwrap();

        let root = output.source.get(&DataId::root()).unwrap();
        assert_eq!(root.get_linked_record_id("viewer"), Some(Some(&DataId::new("4"))));
        let viewer = output.source.get(&DataId::new("4")).unwrap();
        assert_eq!(viewer.typename(), "User");
        assert_eq!(viewer.get_value("name"), Some(&json!("Alice")));
        assert!(output.created.contains(&DataId::new("4")));
    }

    #[test]
    fn test_client_ids_for_objects_without_id() {
        let base = RecordSource::new();
        let selections = vec![LinkedField::new("settings", vec![Selection::scalar("theme")])
            .concrete_type("Settings")
            .into()];
        let output = normalize(&base, selections, json!({"settings": {"theme": "dark"}})).unwrap();
        assert!(output.source.has(&DataId::new("client:root:settings")));
    }

    #[test]
    fn test_scalar_shape_mismatch_is_an_error() {
        let base = RecordSource::new();
        let err = normalize(
            &base,
            viewer_selections(),
            json!({"viewer": {"id": "4", "name": {"first": "Alice"}}}),
        )
        .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::PayloadShape {
                path: "viewer.name".to_string(),
                expected: "scalar",
                found: "object".to_string(),
            }
        );
    }

    #[test]
    fn test_objects_inside_scalar_lists_are_rejected() {
        let base = RecordSource::new();
        let selections = vec![LinkedField::new("viewer", vec![Selection::scalar("id"), Selection::scalar("tags")])
            .concrete_type("User")
            .into()];
        let err = normalize(
            &base,
            selections.clone(),
            json!({"viewer": {"id": "4", "tags": ["a", {"x": 1}]}}),
        )
        .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::PayloadShape {
                path: "viewer.tags.1".to_string(),
                expected: "scalar",
                found: "object".to_string(),
            }
        );

        let output = normalize(&base, selections, json!({"viewer": {"id": "4", "tags": ["a", "b"]}})).unwrap();
        let viewer = output.source.get(&DataId::new("4")).unwrap();
        assert_eq!(viewer.get_value("tags"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_plural_items_and_nulls() {
        let base = RecordSource::new();
        let selections = vec![LinkedField::new("users", vec![Selection::scalar("id")])
            .plural()
            .concrete_type("User")
            .into()];
        let output = normalize(
            &base,
            selections,
            json!({"users": [{"id": "1"}, null, {"id": "2"}]}),
        )
        .unwrap();
        let root = output.source.get(&DataId::root()).unwrap();
        assert_eq!(
            root.get("users"),
            Some(&FieldValue::LinkedRecords {
                ids: vec![Some(DataId::new("1")), None, Some(DataId::new("2"))]
            })
        );
    }

    #[test]
    fn test_missing_typename_for_abstract_field() {
        let base = RecordSource::new();
        let selections = vec![Selection::linked("node", vec![Selection::scalar("id")])];
        let err = normalize(&base, selections, json!({"node": {"id": "1"}})).unwrap_err();
        assert_eq!(err, NormalizeError::MissingTypename { path: "node".to_string() });
    }

    #[test]
    fn test_abstract_key_recorded() {
        let base = RecordSource::new();
        let selections = vec![Selection::linked(
            "node",
            vec![
                Selection::scalar("id"),
                Selection::InlineFragment(InlineFragment {
                    type_condition: "Actor".to_string(),
                    abstract_key: Some("__isActor".to_string()),
                    selections: vec![Selection::scalar("name")],
                }),
            ],
        )];
        let output = normalize(
            &base,
            selections,
            json!({"node": {"__typename": "User", "id": "1", "__isActor": "User", "name": "A"}}),
        )
        .unwrap();
        let node = output.source.get(&DataId::new("1")).unwrap();
        assert_eq!(node.get_value("__isActor"), Some(&json!(true)));
        assert_eq!(node.get_value("name"), Some(&json!("A")));
    }

    #[test]
    fn test_defer_leaves_placeholder() {
        let base = RecordSource::new();
        let selections = vec![LinkedField::new(
            "viewer",
            vec![
                Selection::scalar("id"),
                Selection::Defer(Defer {
                    label: "Viewer$defer$bio".to_string(),
                    if_condition: None,
                    selections: vec![Selection::scalar("bio")],
                }),
            ],
        )
        .concrete_type("User")
        .into()];
        let output = normalize(&base, selections, json!({"viewer": {"id": "4"}})).unwrap();

        assert_eq!(output.placeholders.len(), 1);
        let placeholder = &output.placeholders[0];
        assert_eq!(placeholder.label(), "Viewer$defer$bio");
        assert_eq!(placeholder.path(), &[PathSegment::Key("viewer".to_string())]);
        assert_eq!(output.source.get(&DataId::new("4")).unwrap().get("bio"), None);
    }

    #[test]
    fn test_field_errors_attach_by_path() {
        let base = RecordSource::new();
        let errors = vec![GraphQLError::new("denied").at(vec!["viewer".into(), "name".into()])];
        let output = Normalizer::new(&base, "id")
            .with_errors(&errors)
            .normalize(
                &root_selector(viewer_selections()),
                ROOT_TYPE,
                &json!({"viewer": {"id": "4", "name": null}}),
            )
            .unwrap();
        let viewer = output.source.get(&DataId::new("4")).unwrap();
        assert_eq!(viewer.errors("name").unwrap()[0].message, "denied");
    }
}
