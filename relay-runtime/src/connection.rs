//! Paginated connection merging
//!
//! Each page of a `@connection` field is normalized under its own storage
//! key like any linked field. Alongside it a client-side connection record,
//! linked from the parent under the handle key, accumulates the edges of
//! every page:
//!
//! - a page fetched with `after` is appended when `after` matches the
//!   current end cursor
//! - a page fetched with `before` is prepended when `before` matches the
//!   current start cursor
//! - a page fetched without cursors replaces the edges
//!
//! Edges pointing at a node already in the connection are dropped.

use crate::record::{generate_client_id, FieldValue};
use crate::record_source::{RecordSource, RecordSourceRead};
use crate::storage_key::{get_argument_values, get_handle_storage_key};
use relay_types::{DataId, LinkedField, Variables};
use serde_json::Value;
use std::collections::HashSet;

pub const EDGES: &str = "edges";
pub const NODE: &str = "node";
pub const PAGE_INFO: &str = "pageInfo";
pub const PAGE_INFO_TYPE: &str = "PageInfo";
pub const END_CURSOR: &str = "endCursor";
pub const START_CURSOR: &str = "startCursor";
pub const HAS_NEXT_PAGE: &str = "hasNextPage";
pub const HAS_PREVIOUS_PAGE: &str = "hasPreviousPage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
    Refetch,
}

/// Reads fields of records written in this pass, falling back to the base
struct Overlay<'a, S: ?Sized> {
    base: &'a S,
    sink: &'a RecordSource,
}

impl<S: RecordSourceRead + ?Sized> Overlay<'_, S> {
    fn field(&self, id: &DataId, key: &str) -> Option<&FieldValue> {
        self.sink
            .get(id)
            .and_then(|record| record.get(key))
            .or_else(|| self.base.get(id).and_then(|record| record.get(key)))
    }

    fn linked_id(&self, id: &DataId, key: &str) -> Option<DataId> {
        match self.field(id, key)? {
            FieldValue::LinkedRecord { id } => Some(id.clone()),
            _ => None,
        }
    }

    fn linked_ids(&self, id: &DataId, key: &str) -> Option<Vec<Option<DataId>>> {
        match self.field(id, key)? {
            FieldValue::LinkedRecords { ids } => Some(ids.clone()),
            _ => None,
        }
    }

    fn value(&self, id: &DataId, key: &str) -> Option<Value> {
        match self.field(id, key)? {
            FieldValue::Scalar(value) => Some(value.clone()),
            _ => None,
        }
    }

    fn typename(&self, id: &DataId) -> Option<String> {
        self.sink
            .get(id)
            .or_else(|| self.base.get(id))
            .map(|record| record.typename().to_string())
    }

    /// Concatenates edge lists, skipping null edges and repeated nodes
    fn merge_edges(&self, first: &[Option<DataId>], second: &[Option<DataId>]) -> Vec<Option<DataId>> {
        let mut seen_nodes = HashSet::new();
        let mut merged = Vec::with_capacity(first.len() + second.len());
        for edge in first.iter().chain(second).flatten() {
            if let Some(node) = self.linked_id(edge, NODE) {
                if !seen_nodes.insert(node) {
                    continue;
                }
            }
            merged.push(Some(edge.clone()));
        }
        merged
    }
}

/// Identity of the client connection record for `field` on `parent_id`
pub fn connection_id(parent_id: &DataId, field: &LinkedField, variables: &Variables) -> Option<DataId> {
    let connection = field.connection.as_ref()?;
    let handle_key = get_handle_storage_key(connection, &field.args, variables);
    Some(generate_client_id(parent_id, &handle_key, None))
}

/// Folds the page just written at `server_key` into the client connection
pub(crate) fn update<S: RecordSourceRead + ?Sized>(
    base: &S,
    sink: &mut RecordSource,
    parent_id: &DataId,
    field: &LinkedField,
    server_key: &str,
    variables: &Variables,
) {
    let Some(connection) = &field.connection else {
        return;
    };
    let handle_key = get_handle_storage_key(connection, &field.args, variables);
    let client_id = generate_client_id(parent_id, &handle_key, None);
    let page_info_id = generate_client_id(&client_id, PAGE_INFO, None);

    let args = get_argument_values(&field.args, variables);
    let after = args.get("after").filter(|cursor| !cursor.is_null());
    let before = args.get("before").filter(|cursor| !cursor.is_null());

    let view = Overlay { base, sink: &*sink };
    let Some(server_id) = view.linked_id(parent_id, server_key) else {
        return;
    };
    let server_edges = view.linked_ids(&server_id, EDGES).unwrap_or_default();
    let server_page_info = view.linked_id(&server_id, PAGE_INFO);
    let connection_type = view
        .typename(&server_id)
        .unwrap_or_else(|| connection.key.clone());
    let parent_type = view.typename(parent_id).unwrap_or_default();

    let (edges, direction) = match view.linked_ids(&client_id, EDGES) {
        None => (view.merge_edges(&server_edges, &[]), Direction::Refetch),
        Some(previous) => {
            if let Some(after) = after {
                let end_cursor = view.value(&page_info_id, END_CURSOR);
                if end_cursor.as_ref() != Some(after) {
                    tracing::warn!(
                        connection = %client_id,
                        after = %after,
                        end_cursor = ?end_cursor,
                        "ignoring page fetched after a cursor that is not the connection end"
                    );
                    return;
                }
                (view.merge_edges(&previous, &server_edges), Direction::Forward)
            } else if let Some(before) = before {
                let start_cursor = view.value(&page_info_id, START_CURSOR);
                if start_cursor.as_ref() != Some(before) {
                    tracing::warn!(
                        connection = %client_id,
                        before = %before,
                        start_cursor = ?start_cursor,
                        "ignoring page fetched before a cursor that is not the connection start"
                    );
                    return;
                }
                (view.merge_edges(&server_edges, &previous), Direction::Backward)
            } else {
                (view.merge_edges(&server_edges, &[]), Direction::Refetch)
            }
        }
    };

    let page_fields: &[&str] = match direction {
        Direction::Forward => &[END_CURSOR, HAS_NEXT_PAGE],
        Direction::Backward => &[START_CURSOR, HAS_PREVIOUS_PAGE],
        Direction::Refetch => &[END_CURSOR, HAS_NEXT_PAGE, START_CURSOR, HAS_PREVIOUS_PAGE],
    };
    let page_values: Vec<(&str, Value)> = server_page_info
        .as_ref()
        .map(|page_info| {
            page_fields
                .iter()
                .filter_map(|key| view.value(page_info, key).map(|value| (*key, value)))
                .collect()
        })
        .unwrap_or_default();
    let page_info_type = server_page_info
        .as_ref()
        .and_then(|page_info| view.typename(page_info))
        .unwrap_or_else(|| PAGE_INFO_TYPE.to_string());

    // Scalars on the page (totalCount and the like) mirror the latest page
    let page_scalars: Vec<(String, Value)> = sink
        .get(&server_id)
        .map(|record| {
            record
                .fields()
                .filter_map(|(key, value)| match value {
                    FieldValue::Scalar(value) if key != EDGES && key != PAGE_INFO => {
                        Some((key.clone(), value.clone()))
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    tracing::debug!(
        connection = %client_id,
        direction = ?direction,
        edges = edges.len(),
        "updated connection"
    );

    let record = sink.get_or_create_mut(&client_id, &connection_type);
    for (key, value) in page_scalars {
        record.set_value(key, value);
    }
    record.set_linked_record_ids(EDGES, edges);
    record.set_linked_record_id(PAGE_INFO, page_info_id.clone());

    let page_info = sink.get_or_create_mut(&page_info_id, &page_info_type);
    for (key, value) in page_values {
        page_info.set_value(key, value);
    }

    sink.get_or_create_mut(parent_id, &parent_type)
        .set_linked_record_id(handle_key, client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{create_operation_descriptor, OperationDescriptor};
    use crate::snapshot::Data;
    use crate::store::Store;
    use relay_types::{Argument, ArgumentDefinition, ConcreteRequest, GraphQLResponse, Selection};
    use serde_json::json;
    use std::sync::Arc;

    fn local(name: &str, default_value: Value) -> ArgumentDefinition {
        ArgumentDefinition::LocalArgument {
            name: name.to_string(),
            default_value,
        }
    }

    fn friends_query() -> Arc<ConcreteRequest> {
        let node = LinkedField::new("node", vec![Selection::scalar("id"), Selection::scalar("name")])
            .concrete_type("User");
        let edges = LinkedField::new("edges", vec![Selection::scalar("cursor"), node.into()])
            .plural()
            .concrete_type("FriendsEdge");
        let page_info = LinkedField::new(
            "pageInfo",
            vec![
                Selection::scalar(END_CURSOR),
                Selection::scalar(HAS_NEXT_PAGE),
                Selection::scalar(START_CURSOR),
                Selection::scalar(HAS_PREVIOUS_PAGE),
            ],
        )
        .concrete_type(PAGE_INFO_TYPE);
        let friends = LinkedField::new("friends", vec![edges.into(), page_info.into()])
            .arg(Argument::variable("first", "first"))
            .arg(Argument::variable("after", "after"))
            .arg(Argument::variable("before", "before"))
            .concrete_type("FriendsConnection")
            .connection("Viewer_friends", vec![]);
        let viewer = LinkedField::new("viewer", vec![Selection::scalar("id"), friends.into()])
            .concrete_type("User");
        Arc::new(ConcreteRequest::new(
            "FriendsQuery",
            vec![
                local("first", json!(2)),
                local("after", Value::Null),
                local("before", Value::Null),
            ],
            vec![viewer.into()],
        ))
    }

    fn operation(after: Option<&str>, before: Option<&str>) -> OperationDescriptor {
        let mut variables = Variables::new();
        if let Some(after) = after {
            variables.insert("after".to_string(), json!(after));
        }
        if let Some(before) = before {
            variables.insert("before".to_string(), json!(before));
        }
        create_operation_descriptor(friends_query(), &variables)
    }

    fn page(nodes: &[&str]) -> GraphQLResponse {
        let edges: Vec<Value> = nodes
            .iter()
            .map(|node| json!({"cursor": format!("c{}", node), "node": {"id": node, "name": format!("User {}", node)}}))
            .collect();
        let first = nodes.first().map(|node| format!("c{}", node));
        let last = nodes.last().map(|node| format!("c{}", node));
        GraphQLResponse::data(json!({
            "viewer": {
                "id": "me",
                "friends": {
                    "edges": edges,
                    "pageInfo": {
                        "startCursor": first,
                        "endCursor": last,
                        "hasNextPage": true,
                        "hasPreviousPage": false
                    }
                }
            }
        }))
    }

    fn edge_nodes(store: &Store, operation: &OperationDescriptor) -> Vec<String> {
        let snapshot = store.lookup(&operation.fragment);
        let edges = snapshot
            .data
            .get("viewer")
            .and_then(|viewer| viewer.get("friends"))
            .and_then(|friends| friends.get(EDGES))
            .and_then(Data::as_list)
            .map(<[Data]>::to_vec)
            .unwrap_or_default();
        edges
            .iter()
            .filter_map(|edge| match edge.get(NODE)?.get("id")? {
                Data::Scalar(Value::String(id)) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    fn end_cursor(store: &Store, operation: &OperationDescriptor) -> Option<Data> {
        store
            .lookup(&operation.fragment)
            .data
            .get("viewer")
            .and_then(|viewer| viewer.get("friends"))
            .and_then(|friends| friends.get(PAGE_INFO))
            .and_then(|page_info| page_info.get(END_CURSOR))
            .cloned()
    }

    #[test]
    fn test_connection_id() {
        let query = friends_query();
        let Selection::LinkedField(viewer) = &query.operation.selections[0] else {
            panic!("expected viewer field");
        };
        let Selection::LinkedField(friends) = &viewer.selections[1] else {
            panic!("expected friends field");
        };
        assert_eq!(
            connection_id(&DataId::new("me"), friends, &Variables::new()),
            Some(DataId::new("client:me:__Viewer_friends_connection"))
        );
        assert_eq!(connection_id(&DataId::new("me"), viewer, &Variables::new()), None);
    }

    #[test]
    fn test_forward_pages_append() {
        let mut store = Store::default();
        let first = operation(None, None);
        store.publish_response(&first, &page(&["1", "2"])).unwrap();

        let next = operation(Some("c2"), None);
        store.publish_response(&next, &page(&["3", "4"])).unwrap();

        assert_eq!(edge_nodes(&store, &next), vec!["1", "2", "3", "4"]);
        assert_eq!(end_cursor(&store, &next), Some(Data::Scalar(json!("c4"))));
        assert!(!store.lookup(&next.fragment).is_missing_data);
    }

    #[test]
    fn test_stale_cursor_is_ignored() {
        let mut store = Store::default();
        store.publish_response(&operation(None, None), &page(&["1", "2"])).unwrap();

        let stale = operation(Some("c9"), None);
        store.publish_response(&stale, &page(&["3", "4"])).unwrap();

        assert_eq!(edge_nodes(&store, &stale), vec!["1", "2"]);
        assert_eq!(end_cursor(&store, &stale), Some(Data::Scalar(json!("c2"))));
    }

    #[test]
    fn test_backward_page_prepends() {
        let mut store = Store::default();
        store.publish_response(&operation(None, None), &page(&["1", "2"])).unwrap();

        let previous = operation(None, Some("c1"));
        store.publish_response(&previous, &page(&["0"])).unwrap();

        assert_eq!(edge_nodes(&store, &previous), vec!["0", "1", "2"]);
    }

    #[test]
    fn test_refetch_replaces_edges() {
        let mut store = Store::default();
        let first = operation(None, None);
        store.publish_response(&first, &page(&["1", "2"])).unwrap();
        store.publish_response(&first, &page(&["5"])).unwrap();

        assert_eq!(edge_nodes(&store, &first), vec!["5"]);
    }

    #[test]
    fn test_repeated_nodes_are_dropped() {
        let mut store = Store::default();
        store.publish_response(&operation(None, None), &page(&["1", "2"])).unwrap();

        let next = operation(Some("c2"), None);
        store.publish_response(&next, &page(&["2", "3"])).unwrap();

        assert_eq!(edge_nodes(&store, &next), vec!["1", "2", "3"]);
    }
}
