//! Raw GraphQL response payloads
//!
//! Plain nested data mirroring GraphQL response JSON, plus the `errors`
//! side-channel and the `label`/`path` envelope of incremental payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One step of a response path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "{}", index),
            PathSegment::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Renders a response path as `a.b.0.c`
pub fn format_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(|segment| segment.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// An entry of the response `errors` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<PathSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    pub fn at(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }
}

/// A single response or incremental payload from the network layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
    /// Label of the `@defer`/`@stream` this payload fulfils
    #[serde(default)]
    pub label: Option<String>,
    /// Response path of the deferred object, or of the streamed item
    #[serde(default)]
    pub path: Option<Vec<PathSegment>>,
    /// Streamed items, starting at the index given by the last path segment
    #[serde(default)]
    pub items: Option<Vec<Value>>,
    #[serde(default)]
    pub has_next: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLResponse {
    /// A complete, non-incremental response
    pub fn data(data: Value) -> Self {
        GraphQLResponse {
            data: Some(data),
            ..Default::default()
        }
    }

    /// A follow-up payload for a deferred fragment or streamed item
    pub fn incremental(label: impl Into<String>, path: Vec<PathSegment>, data: Value) -> Self {
        GraphQLResponse {
            data: Some(data),
            label: Some(label.into()),
            path: Some(path),
            ..Default::default()
        }
    }

    pub fn with_errors(mut self, errors: Vec<GraphQLError>) -> Self {
        self.errors = errors;
        self
    }

    pub fn is_incremental(&self) -> bool {
        self.label.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_incremental_payload_parses() {
        let response: GraphQLResponse = serde_json::from_value(json!({
            "label": "UserFragment$defer$bio",
            "path": ["viewer", "friends", 0],
            "data": {"bio": "hello"},
            "hasNext": true
        }))
        .unwrap();

        assert!(response.is_incremental());
        assert_eq!(
            response.path,
            Some(vec![
                PathSegment::Key("viewer".to_string()),
                PathSegment::Key("friends".to_string()),
                PathSegment::Index(0),
            ])
        );
        assert_eq!(response.has_next, Some(true));
    }

    #[test]
    fn test_format_path() {
        let path = vec![PathSegment::from("viewer"), PathSegment::from(2), PathSegment::from("name")];
        assert_eq!(format_path(&path), "viewer.2.name");
    }
}
