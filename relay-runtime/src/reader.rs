//! Reading selectors out of a record source
//!
//! The reader is the mirror image of the normalizer: it walks a reader
//! fragment against stored records and builds the requested data tree,
//! tracking every record it consults and every field it could not find.
//!
//! Required fields bubble null to the nearest nullable ancestor. A walk of
//! a selection list stops at the first required violation, and the object
//! being built is replaced by null in its parent.

use crate::record::FieldValue;
use crate::record::Record;
use crate::record_source::{RecordEntry, RecordSourceRead};
use crate::selector::{
    PluralReaderSelector, RequestDescriptor, SingularReaderSelector, FRAGMENTS_KEY,
    FRAGMENT_OWNER_KEY, ID_KEY,
};
use crate::snapshot::{
    Data, FieldErrorEntry, MissingRequiredFields, PluralSnapshot, RequiredFieldViolation, Snapshot,
};
use crate::storage_key::{
    get_argument_values, get_handle_storage_key, linked_storage_key, scalar_storage_key,
};
use crate::traversal::{traverse, SelectionVisitor, TypeMatch};
use crate::error::ReadError;
use relay_types::{
    CatchField, CatchTo, DataId, FragmentSpread, GraphQLError, InlineFragment, LinkedField,
    RequiredAction, ScalarField, Selection, Variables,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;

/// Reads a selector; never fails, violations are recorded on the snapshot
pub fn read<S: RecordSourceRead + ?Sized>(source: &S, selector: &SingularReaderSelector) -> Snapshot {
    let mut reader = Reader::new(source, selector);
    let data = match reader.read_record(&selector.data_id, &selector.fragment.selections) {
        Outcome::Value(data) => data,
        Outcome::Missing => {
            reader.record_absent = true;
            Data::Null
        }
        Outcome::Bubble => Data::Null,
    };
    reader.into_snapshot(data, selector.clone())
}

/// Reads a selector and raises THROW-level violations to the caller
pub fn try_read<S: RecordSourceRead + ?Sized>(
    source: &S,
    selector: &SingularReaderSelector,
) -> Result<Snapshot, ReadError> {
    let snapshot = read(source, selector);
    snapshot.check_errors()?;
    Ok(snapshot)
}

/// Reads every selector of a plural fragment, in order
pub fn read_plural<S: RecordSourceRead + ?Sized>(
    source: &S,
    selector: &PluralReaderSelector,
) -> PluralSnapshot {
    let snapshots: Vec<Snapshot> = selector
        .selectors
        .iter()
        .map(|item| read(source, item))
        .collect();
    let data = Data::list(snapshots.iter().map(|snapshot| snapshot.data.clone()).collect());
    PluralSnapshot { data, snapshots }
}

enum Outcome {
    Value(Data),
    /// Never fetched; already recorded as missing
    Missing,
    /// A required field below was null; the caller substitutes null
    Bubble,
}

struct Reader<'a, S: ?Sized> {
    source: &'a S,
    variables: &'a Variables,
    owner: Arc<RequestDescriptor>,
    fragment_name: &'a str,
    throw_on_field_error: bool,
    frames: Vec<BTreeMap<String, Data>>,
    path: Vec<String>,
    seen_records: HashSet<DataId>,
    is_missing_data: bool,
    record_absent: bool,
    missing_fields: Vec<String>,
    missing_required: Option<MissingRequiredFields>,
    field_errors: Vec<FieldErrorEntry>,
    catch_scopes: Vec<Vec<GraphQLError>>,
}

impl<'a, S: RecordSourceRead + ?Sized> Reader<'a, S> {
    fn new(source: &'a S, selector: &'a SingularReaderSelector) -> Self {
        Reader {
            source,
            variables: &selector.variables,
            owner: Arc::new(selector.owner.clone()),
            fragment_name: &selector.fragment.name,
            throw_on_field_error: selector.fragment.metadata.throw_on_field_error,
            frames: Vec::new(),
            path: Vec::new(),
            seen_records: HashSet::new(),
            is_missing_data: false,
            record_absent: false,
            missing_fields: Vec::new(),
            missing_required: None,
            field_errors: Vec::new(),
            catch_scopes: Vec::new(),
        }
    }

    fn into_snapshot(self, data: Data, selector: SingularReaderSelector) -> Snapshot {
        Snapshot {
            data,
            selector,
            seen_records: self.seen_records,
            is_missing_data: self.is_missing_data || self.record_absent,
            record_absent: self.record_absent,
            missing_fields: self.missing_fields,
            missing_required_fields: self.missing_required,
            field_errors: self.field_errors,
        }
    }

    fn current_path(&self, key: &str) -> String {
        let mut segments = self.path.clone();
        segments.push(key.to_string());
        segments.join(".")
    }

    fn mark_missing(&mut self, key: &str) {
        self.is_missing_data = true;
        let path = self.current_path(key);
        self.missing_fields.push(path);
    }

    fn read_record(&mut self, id: &DataId, selections: &[Selection]) -> Outcome {
        self.seen_records.insert(id.clone());
        let source = self.source;
        match source.entry(id) {
            None => Outcome::Missing,
            Some(RecordEntry::Nonexistent) => Outcome::Value(Data::Null),
            Some(RecordEntry::Existent(record)) => {
                self.frames.push(BTreeMap::new());
                let flow = traverse(self, record, selections);
                let fields = self.frames.pop().unwrap_or_default();
                match flow {
                    ControlFlow::Continue(()) => Outcome::Value(Data::object(fields)),
                    ControlFlow::Break(()) => Outcome::Bubble,
                }
            }
        }
    }

    fn insert(&mut self, key: &str, value: Data) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(key.to_string(), value);
        }
    }

    /// Stores a field value, applying its required action when null
    fn finish_field(
        &mut self,
        key: &str,
        value: Option<Data>,
        required: Option<RequiredAction>,
    ) -> ControlFlow<()> {
        let is_null = value.as_ref().map_or(true, Data::is_null);
        if is_null {
            if let Some(action) = required {
                self.report_required(key, action);
                return ControlFlow::Break(());
            }
        }
        if let Some(value) = value {
            self.insert(key, value);
        }
        ControlFlow::Continue(())
    }

    fn report_required(&mut self, key: &str, action: RequiredAction) {
        let path = self.current_path(key);
        match action {
            RequiredAction::None => {}
            RequiredAction::Log => {
                tracing::warn!(fragment = self.fragment_name, path = %path, "missing @required value");
                self.push_required(action, path);
            }
            RequiredAction::Throw => {
                if let Some(scope) = self.catch_scopes.last_mut() {
                    scope.push(GraphQLError::new(format!(
                        "Missing @required value at path '{}' in '{}'",
                        path, self.fragment_name
                    )));
                } else {
                    self.push_required(action, path);
                }
            }
        }
    }

    fn push_required(&mut self, action: RequiredAction, path: String) {
        let violation = RequiredFieldViolation {
            owner: self.fragment_name.to_string(),
            path,
        };
        match &mut self.missing_required {
            Some(existing) => {
                if action == RequiredAction::Throw && existing.action != RequiredAction::Throw {
                    existing.action = RequiredAction::Throw;
                    existing.fields.clear();
                }
                if action == existing.action {
                    existing.fields.push(violation);
                }
            }
            None => {
                self.missing_required = Some(MissingRequiredFields {
                    action,
                    fields: vec![violation],
                });
            }
        }
    }

    fn handle_field_errors(&mut self, record: &Record, storage_key: &str, key: &str) {
        let Some(errors) = record.errors(storage_key) else {
            return;
        };
        if let Some(scope) = self.catch_scopes.last_mut() {
            scope.extend(errors.iter().cloned());
            return;
        }
        let path = self.current_path(key);
        for error in errors {
            if !self.throw_on_field_error {
                tracing::warn!(
                    fragment = self.fragment_name,
                    path = %path,
                    message = %error.message,
                    "field error while reading"
                );
            }
            self.field_errors.push(FieldErrorEntry {
                owner: self.fragment_name.to_string(),
                path: path.clone(),
                error: error.clone(),
            });
        }
    }

    fn read_plural_link(&mut self, key: &str, ids: &[Option<DataId>], field: &LinkedField) -> Data {
        let mut items = Vec::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            self.path.push(key.to_string());
            let item = match id {
                None => Data::Null,
                Some(id) => {
                    self.path.push(index.to_string());
                    let outcome = self.read_record(id, &field.selections);
                    self.path.pop();
                    match outcome {
                        Outcome::Value(data) => data,
                        Outcome::Missing => {
                            self.mark_missing(&index.to_string());
                            Data::Null
                        }
                        Outcome::Bubble => Data::Null,
                    }
                }
            };
            self.path.pop();
            items.push(item);
        }
        Data::list(items)
    }
}

impl<S: RecordSourceRead + ?Sized> SelectionVisitor for Reader<'_, S> {
    type Break = ();

    fn variables(&self) -> &Variables {
        self.variables
    }

    fn scalar(&mut self, record: &Record, field: &ScalarField) -> ControlFlow<()> {
        let key = field.response_key();
        let value = match field.name.as_str() {
            "__typename" => Some(Data::Scalar(Value::String(record.typename().to_string()))),
            "__id" => Some(Data::Scalar(Value::String(record.id().to_string()))),
            _ => {
                let storage_key = scalar_storage_key(field, self.variables);
                self.handle_field_errors(record, &storage_key, key);
                match record.get(&storage_key) {
                    Some(FieldValue::Scalar(value)) => Some(Data::from(value.clone())),
                    Some(_) => Some(Data::Null),
                    None => {
                        self.mark_missing(key);
                        None
                    }
                }
            }
        };
        self.finish_field(key, value, field.required)
    }

    fn linked(&mut self, record: &Record, field: &LinkedField) -> ControlFlow<()> {
        let key = field.response_key();
        let storage_key = match &field.connection {
            Some(connection) => get_handle_storage_key(connection, &field.args, self.variables),
            None => linked_storage_key(field, self.variables),
        };
        self.handle_field_errors(record, &storage_key, key);

        let value = if field.plural {
            match record.get_linked_record_ids(&storage_key) {
                Some(Some(ids)) => Some(self.read_plural_link(key, ids, field)),
                Some(None) => Some(Data::Null),
                None => {
                    self.mark_missing(key);
                    None
                }
            }
        } else {
            match record.get_linked_record_id(&storage_key) {
                Some(Some(id)) => {
                    self.path.push(key.to_string());
                    let outcome = self.read_record(id, &field.selections);
                    self.path.pop();
                    match outcome {
                        Outcome::Value(data) => Some(data),
                        Outcome::Missing => {
                            self.mark_missing(key);
                            None
                        }
                        Outcome::Bubble => Some(Data::Null),
                    }
                }
                Some(None) => Some(Data::Null),
                None => {
                    self.mark_missing(key);
                    None
                }
            }
        };
        self.finish_field(key, value, field.required)
    }

    fn fragment_spread(&mut self, record: &Record, spread: &FragmentSpread) -> ControlFlow<()> {
        let args: Map<String, Value> = get_argument_values(&spread.args, self.variables)
            .into_iter()
            .collect();
        let owner = self.owner.clone();
        let Some(frame) = self.frames.last_mut() else {
            return ControlFlow::Continue(());
        };

        frame.insert(
            ID_KEY.to_string(),
            Data::Scalar(Value::String(record.id().to_string())),
        );
        let fragments = frame
            .entry(FRAGMENTS_KEY.to_string())
            .or_insert_with(|| Data::object(BTreeMap::new()));
        if let Data::Object(map) = fragments {
            Arc::make_mut(map).insert(spread.name.clone(), Data::Scalar(Value::Object(args)));
        }
        frame.insert(FRAGMENT_OWNER_KEY.to_string(), Data::Owner(owner));
        ControlFlow::Continue(())
    }

    fn inline_fragment(
        &mut self,
        record: &Record,
        fragment: &InlineFragment,
        matched: TypeMatch,
    ) -> ControlFlow<()> {
        match matched {
            TypeMatch::Matches => traverse(self, record, &fragment.selections),
            TypeMatch::DoesNotMatch => ControlFlow::Continue(()),
            TypeMatch::Unknown => {
                let key = fragment.abstract_key.as_deref().unwrap_or(&fragment.type_condition);
                self.mark_missing(key);
                ControlFlow::Continue(())
            }
        }
    }

    fn catch_field(&mut self, record: &Record, catch: &CatchField) -> ControlFlow<()> {
        let key = match catch.field.as_ref() {
            Selection::ScalarField(field) => field.response_key().to_string(),
            Selection::LinkedField(field) => field.response_key().to_string(),
            _ => return traverse(self, record, std::slice::from_ref(catch.field.as_ref())),
        };

        self.catch_scopes.push(Vec::new());
        let flow = traverse(self, record, std::slice::from_ref(catch.field.as_ref()));
        let errors = self.catch_scopes.pop().unwrap_or_default();

        let value = self
            .frames
            .last_mut()
            .and_then(|frame| frame.remove(&key));
        let bubbled = matches!(flow, ControlFlow::Break(()));

        let caught = match catch.to {
            CatchTo::Result if !errors.is_empty() => Some(Data::Result(Arc::new(Err(errors)))),
            CatchTo::Result => value
                .or(if bubbled { Some(Data::Null) } else { None })
                .map(|value| Data::Result(Arc::new(Ok(value)))),
            CatchTo::Null if !errors.is_empty() || bubbled => Some(Data::Null),
            CatchTo::Null => value,
        };
        if let Some(caught) = caught {
            self.insert(&key, caught);
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_source::RecordSource;
    use crate::selector::create_operation_descriptor;
    use relay_types::{ConcreteRequest, FragmentMetadata, ReaderFragment};
    use serde_json::json;

    fn user(id: &str, name: Option<&str>) -> Record {
        let mut record = Record::new(DataId::new(id), "User");
        if let Some(name) = name {
            record.set_value("name", json!(name));
        }
        record
    }

    fn source_with_viewer(viewer: Record) -> RecordSource {
        let mut root = Record::new(DataId::root(), "__Root");
        root.set_linked_record_id("viewer", viewer.id().clone());
        [root, viewer].into_iter().collect()
    }

    fn query(selections: Vec<Selection>) -> SingularReaderSelector {
        let request = Arc::new(ConcreteRequest::new("TestQuery", vec![], selections));
        create_operation_descriptor(request, &Variables::new()).fragment
    }

    #[test]
    fn test_reads_linked_and_scalar_fields() {
        let source = source_with_viewer(user("4", Some("Alice")));
        let selector = query(vec![Selection::linked(
            "viewer",
            vec![Selection::scalar("name"), Selection::scalar("__typename")],
        )]);

        let snapshot = read(&source, &selector);
        assert!(!snapshot.is_missing_data);
        assert_eq!(
            snapshot.data.to_json(),
            json!({"viewer": {"name": "Alice", "__typename": "User"}})
        );
        assert!(snapshot.seen_records.contains(&DataId::new("4")));
        assert!(snapshot.seen_records.contains(&DataId::root()));
    }

    #[test]
    fn test_missing_field_is_scoped() {
        let source = source_with_viewer(user("4", None));
        let selector = query(vec![Selection::linked("viewer", vec![Selection::scalar("name")])]);

        let snapshot = read(&source, &selector);
        assert_eq!(
            snapshot.availability(),
            crate::snapshot::DataAvailability::MissingFields(vec!["viewer.name".to_string()])
        );
    }

    #[test]
    fn test_record_absent() {
        let source = RecordSource::new();
        let selector = query(vec![Selection::scalar("name")]);
        let snapshot = read(&source, &selector);
        assert_eq!(
            snapshot.availability(),
            crate::snapshot::DataAvailability::RecordAbsent
        );
    }

    #[test]
    fn test_tombstone_reads_as_null() {
        let mut source = source_with_viewer(user("4", Some("Alice")));
        source.delete(&DataId::new("4"));
        let selector = query(vec![Selection::linked("viewer", vec![Selection::scalar("name")])]);

        let snapshot = read(&source, &selector);
        assert!(!snapshot.is_missing_data);
        assert_eq!(snapshot.data.to_json(), json!({"viewer": null}));
    }

    #[test]
    fn test_required_bubbles_to_nullable_parent() {
        let mut viewer = user("4", None);
        viewer.set_value("name", Value::Null);
        let source = source_with_viewer(viewer);
        let selector = query(vec![Selection::linked(
            "viewer",
            vec![
                Selection::scalar("__typename"),
                ScalarField::new("name").required(RequiredAction::Log).into(),
            ],
        )]);

        let snapshot = read(&source, &selector);
        assert_eq!(snapshot.data.to_json(), json!({"viewer": null}));
        let required = snapshot.missing_required_fields.as_ref().unwrap();
        assert_eq!(required.action, RequiredAction::Log);
        assert_eq!(required.fields[0].path, "viewer.name");
        assert!(snapshot.check_errors().is_ok());
    }

    #[test]
    fn test_required_throw_raises() {
        let mut viewer = user("4", None);
        viewer.set_value("name", Value::Null);
        let source = source_with_viewer(viewer);
        let selector = query(vec![Selection::linked(
            "viewer",
            vec![ScalarField::new("name").required(RequiredAction::Throw).into()],
        )]);

        let err = try_read(&source, &selector).unwrap_err();
        assert_eq!(
            err,
            ReadError::RequiredFieldMissing {
                owner: "TestQuery".to_string(),
                path: "viewer.name".to_string()
            }
        );
    }

    #[test]
    fn test_catch_wraps_field_errors() {
        let mut viewer = user("4", None);
        viewer.set_value("name", Value::Null);
        viewer.set_errors("name", vec![GraphQLError::new("boom")]);
        let source = source_with_viewer(viewer);
        let selector = query(vec![Selection::linked(
            "viewer",
            vec![Selection::CatchField(CatchField {
                field: Box::new(Selection::scalar("name")),
                to: CatchTo::Result,
            })],
        )]);

        let snapshot = read(&source, &selector);
        assert!(snapshot.field_errors.is_empty());
        let Some(Data::Result(result)) = snapshot.data.get("viewer").and_then(|v| v.get("name")) else {
            panic!("expected a caught result");
        };
        let Err(errors) = result.as_ref() else {
            panic!("expected caught errors");
        };
        assert_eq!(errors[0].message, "boom");
    }

    #[test]
    fn test_field_error_throws_when_fragment_opts_in() {
        let mut viewer = user("4", None);
        viewer.set_value("name", Value::Null);
        viewer.set_errors("name", vec![GraphQLError::new("boom")]);
        let source = source_with_viewer(viewer);

        let mut selector = query(vec![Selection::linked("viewer", vec![Selection::scalar("name")])]);
        assert!(try_read(&source, &selector).is_ok());

        let mut fragment = selector.fragment.as_ref().clone();
        fragment.metadata = FragmentMetadata {
            plural: false,
            throw_on_field_error: true,
        };
        selector.fragment = Arc::new(fragment);
        assert!(matches!(
            try_read(&source, &selector),
            Err(ReadError::FieldError { .. })
        ));
    }

    #[test]
    fn test_fragment_pointer_round_trip() {
        let source = source_with_viewer(user("4", Some("Alice")));
        let selector = query(vec![Selection::linked(
            "viewer",
            vec![Selection::FragmentSpread(FragmentSpread {
                name: "UserName".to_string(),
                args: vec![],
                selections: vec![Selection::scalar("name")],
            })],
        )]);
        let snapshot = read(&source, &selector);
        let pointer = snapshot.data.get("viewer").unwrap();
        assert!(pointer.get("name").is_none());

        let fragment = Arc::new(ReaderFragment::new("UserName", "User", vec![Selection::scalar("name")]));
        let child = SingularReaderSelector::from_fragment_ref(fragment, pointer).unwrap();
        assert_eq!(child.data_id, DataId::new("4"));
        assert_eq!(read(&source, &child).data.to_json(), json!({"name": "Alice"}));
    }

    #[test]
    fn test_plural_items_preserve_order() {
        let mut root = Record::new(DataId::root(), "__Root");
        root.set_linked_record_ids(
            "users",
            vec![Some(DataId::new("2")), None, Some(DataId::new("1"))],
        );
        let source: RecordSource = [root, user("1", Some("A")), user("2", Some("B"))]
            .into_iter()
            .collect();
        let selector = query(vec![
            LinkedField::new("users", vec![Selection::scalar("name")]).plural().into()
        ]);

        let snapshot = read(&source, &selector);
        assert_eq!(
            snapshot.data.to_json(),
            json!({"users": [{"name": "B"}, null, {"name": "A"}]})
        );
    }
}
