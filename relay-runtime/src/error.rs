//! Error types for the record store

use relay_types::{DataId, GraphQLError};
use std::path::PathBuf;
use thiserror::Error;

/// Payload shape problems found while normalizing a response
///
/// Any of these aborts the whole write; nothing reaches the store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("Payload shape mismatch at {path}: expected {expected}, found {found}")]
    PayloadShape {
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("Missing __typename at {path}: field has no concrete type")]
    MissingTypename { path: String },

    #[error("Invalid identity at {path}: {found}")]
    InvalidId { path: String, found: String },

    #[error("Payload root must be an object, found {found}")]
    InvalidRoot { found: String },
}

/// Errors raised to the caller of the reader
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error("Required field missing at {path} in {owner}")]
    RequiredFieldMissing { owner: String, path: String },

    #[error("Field error at {path} in {owner}: {message}")]
    FieldError {
        owner: String,
        path: String,
        message: String,
    },
}

/// Errors surfaced by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Response for {operation} carried no data ({} errors)", errors.len())]
    NoData {
        operation: String,
        errors: Vec<GraphQLError>,
    },

    #[error("Incremental payload is missing its path (label {label})")]
    MissingIncrementalPath { label: String },

    #[error("Stream payload path does not end in an item index (label {label})")]
    InvalidStreamPath { label: String },

    #[error("Record {0} referenced by an incremental payload is not in the store")]
    MissingParentRecord(DataId),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub type NormalizeResult<T> = std::result::Result<T, NormalizeError>;
