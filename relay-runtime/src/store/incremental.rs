//! Tracking of `@defer` and `@stream` follow-up payloads
//!
//! Placeholders left by the normalizer are filed per operation under their
//! label and the response path of the record they apply to. A follow-up
//! payload is matched by the same pair; for streamed items the path names
//! the item, so its last two segments (field and index) are dropped first.
//! Payloads that arrive before their placeholder are parked until it shows
//! up.

use crate::error::{Result, StoreError};
use crate::normalizer::IncrementalPlaceholder;
use crate::selector::RequestIdentifier;
use relay_types::{format_path, GraphQLResponse, PathSegment};
use std::collections::HashMap;

/// How a follow-up payload should be applied
#[derive(Debug)]
pub(crate) enum Resolution {
    Defer(IncrementalPlaceholder),
    Stream {
        placeholder: IncrementalPlaceholder,
        index: usize,
    },
    /// No placeholder yet; the payload was parked
    Buffered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Defer,
    Stream,
}

#[derive(Debug, Default)]
struct OperationState {
    kinds: HashMap<String, LabelKind>,
    placeholders: HashMap<(String, String), IncrementalPlaceholder>,
    /// Deferred placeholders still waiting for their payload
    pending_defers: usize,
    buffered: Vec<GraphQLResponse>,
}

#[derive(Debug, Default)]
pub(crate) struct IncrementalTracker {
    operations: HashMap<RequestIdentifier, OperationState>,
}

impl IncrementalTracker {
    /// Files new placeholders and returns parked payloads that can now be applied
    pub fn register(
        &mut self,
        operation: &RequestIdentifier,
        placeholders: Vec<IncrementalPlaceholder>,
    ) -> Vec<GraphQLResponse> {
        if placeholders.is_empty() {
            return Vec::new();
        }
        let state = self.operations.entry(operation.clone()).or_default();
        for placeholder in placeholders {
            let kind = match placeholder {
                IncrementalPlaceholder::Defer { .. } => LabelKind::Defer,
                IncrementalPlaceholder::Stream { .. } => LabelKind::Stream,
            };
            state.kinds.insert(placeholder.label().to_string(), kind);
            let key = (placeholder.label().to_string(), format_path(placeholder.path()));
            let previous = state.placeholders.insert(key, placeholder);
            if kind == LabelKind::Defer && previous.is_none() {
                state.pending_defers += 1;
            }
        }

        let (ready, parked): (Vec<_>, Vec<_>) = std::mem::take(&mut state.buffered)
            .into_iter()
            .partition(|response| matches!(state.lookup_key(response), Ok(Some(key)) if state.placeholders.contains_key(&key)));
        state.buffered = parked;
        ready
    }

    /// Matches a follow-up payload against the operation's placeholders
    pub fn resolve(&mut self, operation: &RequestIdentifier, response: &GraphQLResponse) -> Result<Resolution> {
        let label = response.label.clone().unwrap_or_default();
        let path = response
            .path
            .as_ref()
            .ok_or_else(|| StoreError::MissingIncrementalPath { label: label.clone() })?;

        let state = self.operations.entry(operation.clone()).or_default();
        let key = match state.lookup_key(response)? {
            Some(key) => key,
            None => {
                state.buffered.push(response.clone());
                return Ok(Resolution::Buffered);
            }
        };

        match state.kinds.get(&label) {
            Some(LabelKind::Defer) => match state.placeholders.remove(&key) {
                Some(placeholder) => {
                    state.pending_defers = state.pending_defers.saturating_sub(1);
                    Ok(Resolution::Defer(placeholder))
                }
                None => {
                    state.buffered.push(response.clone());
                    Ok(Resolution::Buffered)
                }
            },
            Some(LabelKind::Stream) => {
                let Some(PathSegment::Index(index)) = path.last() else {
                    return Err(StoreError::InvalidStreamPath { label });
                };
                match state.placeholders.get(&key) {
                    Some(placeholder) => Ok(Resolution::Stream {
                        placeholder: placeholder.clone(),
                        index: *index,
                    }),
                    None => {
                        state.buffered.push(response.clone());
                        Ok(Resolution::Buffered)
                    }
                }
            }
            None => {
                state.buffered.push(response.clone());
                Ok(Resolution::Buffered)
            }
        }
    }

    /// Puts back a deferred placeholder whose payload could not be applied
    pub fn restore(&mut self, operation: &RequestIdentifier, placeholder: IncrementalPlaceholder) {
        let state = self.operations.entry(operation.clone()).or_default();
        let key = (placeholder.label().to_string(), format_path(placeholder.path()));
        if state.placeholders.insert(key, placeholder).is_none() {
            state.pending_defers += 1;
        }
    }

    /// Deferred payloads still outstanding for an operation
    pub fn pending(&self, operation: &RequestIdentifier) -> usize {
        self.operations
            .get(operation)
            .map(|state| state.pending_defers)
            .unwrap_or(0)
    }

    /// Payloads parked for an operation without a matching placeholder
    pub fn buffered(&self, operation: &RequestIdentifier) -> usize {
        self.operations
            .get(operation)
            .map(|state| state.buffered.len())
            .unwrap_or(0)
    }

    /// Forgets everything tracked for a finished operation
    pub fn complete(&mut self, operation: &RequestIdentifier) {
        if let Some(state) = self.operations.remove(operation) {
            if state.pending_defers > 0 || !state.buffered.is_empty() {
                tracing::warn!(
                    operation = %operation,
                    pending = state.pending_defers,
                    buffered = state.buffered.len(),
                    "operation completed with unresolved incremental payloads"
                );
            }
        }
    }
}

impl OperationState {
    /// Placeholder key for a payload, or `None` while its label is unknown
    fn lookup_key(&self, response: &GraphQLResponse) -> Result<Option<(String, String)>> {
        let label = response.label.clone().unwrap_or_default();
        let Some(path) = response.path.as_ref() else {
            return Err(StoreError::MissingIncrementalPath { label });
        };
        let key_path = match self.kinds.get(&label) {
            None => return Ok(None),
            Some(LabelKind::Defer) => format_path(path),
            Some(LabelKind::Stream) => {
                if path.len() < 2 || !matches!(path.last(), Some(PathSegment::Index(_))) {
                    return Err(StoreError::InvalidStreamPath { label });
                }
                format_path(&path[..path.len() - 2])
            }
        };
        Ok(Some((label, key_path)))
    }
}
