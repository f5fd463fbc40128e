//! Availability checks
//!
//! Walks an operation's normalization selections against a source to decide
//! whether every field the operation would write is already present. The
//! walk stops at the first missing field.

use crate::record::Record;
use crate::record_source::{RecordEntry, RecordSourceRead};
use crate::selector::NormalizationSelector;
use crate::storage_key::{linked_storage_key, scalar_storage_key, spread_variables};
use crate::traversal::{traverse, SelectionVisitor, TypeMatch};
use relay_types::{DataId, FragmentSpread, InlineFragment, LinkedField, ScalarField, Selection, Variables};
use std::ops::ControlFlow;

/// Raw result of a check, before staleness is decided by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub is_missing_data: bool,
    /// Latest invalidation epoch among the records visited
    pub latest_invalidation: Option<u64>,
}

pub fn check<S: RecordSourceRead + ?Sized>(source: &S, selector: &NormalizationSelector) -> CheckResult {
    let mut checker = Checker {
        source,
        variables: selector.variables.clone(),
        latest_invalidation: None,
    };
    let flow = checker.visit(&selector.data_id, &selector.selections);
    CheckResult {
        is_missing_data: flow.is_break(),
        latest_invalidation: checker.latest_invalidation,
    }
}

/// Marker for a missing field or record
struct Missing;

struct Checker<'a, S: ?Sized> {
    source: &'a S,
    variables: Variables,
    latest_invalidation: Option<u64>,
}

impl<S: RecordSourceRead + ?Sized> Checker<'_, S> {
    fn visit(&mut self, id: &DataId, selections: &[Selection]) -> ControlFlow<Missing> {
        let source = self.source;
        match source.entry(id) {
            None => ControlFlow::Break(Missing),
            Some(RecordEntry::Nonexistent) => ControlFlow::Continue(()),
            Some(RecordEntry::Existent(record)) => {
                self.latest_invalidation = self.latest_invalidation.max(record.invalidated_at());
                traverse(self, record, selections)
            }
        }
    }
}

impl<S: RecordSourceRead + ?Sized> SelectionVisitor for Checker<'_, S> {
    type Break = Missing;

    fn variables(&self) -> &Variables {
        &self.variables
    }

    fn scalar(&mut self, record: &Record, field: &ScalarField) -> ControlFlow<Missing> {
        if field.name == "__typename" || field.name == "__id" {
            return ControlFlow::Continue(());
        }
        let storage_key = scalar_storage_key(field, &self.variables);
        if record.get(&storage_key).is_some() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(Missing)
        }
    }

    fn linked(&mut self, record: &Record, field: &LinkedField) -> ControlFlow<Missing> {
        let storage_key = linked_storage_key(field, &self.variables);
        if field.plural {
            match record.get_linked_record_ids(&storage_key) {
                None => ControlFlow::Break(Missing),
                Some(None) => ControlFlow::Continue(()),
                Some(Some(ids)) => {
                    for id in ids.iter().flatten() {
                        self.visit(id, &field.selections)?;
                    }
                    ControlFlow::Continue(())
                }
            }
        } else {
            match record.get_linked_record_id(&storage_key) {
                None => ControlFlow::Break(Missing),
                Some(None) => ControlFlow::Continue(()),
                Some(Some(id)) => self.visit(id, &field.selections),
            }
        }
    }

    fn fragment_spread(&mut self, record: &Record, spread: &FragmentSpread) -> ControlFlow<Missing> {
        let scoped = spread_variables(&spread.args, &self.variables);
        let outer = std::mem::replace(&mut self.variables, scoped);
        let flow = traverse(self, record, &spread.selections);
        self.variables = outer;
        flow
    }

    fn inline_fragment(
        &mut self,
        record: &Record,
        fragment: &InlineFragment,
        matched: TypeMatch,
    ) -> ControlFlow<Missing> {
        match matched {
            TypeMatch::Matches => traverse(self, record, &fragment.selections),
            TypeMatch::DoesNotMatch => ControlFlow::Continue(()),
            TypeMatch::Unknown => ControlFlow::Break(Missing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_source::RecordSource;
    use relay_types::ROOT_TYPE;
    use serde_json::json;
    use std::sync::Arc;

    fn viewer_selector() -> NormalizationSelector {
        NormalizationSelector::new(
            DataId::root(),
            Arc::from(vec![Selection::linked("viewer", vec![Selection::scalar("name")])]),
            Variables::new(),
        )
    }

    #[test]
    fn test_available_and_missing() {
        let mut root = Record::new(DataId::root(), ROOT_TYPE);
        root.set_linked_record_id("viewer", DataId::new("4"));
        let mut viewer = Record::new(DataId::new("4"), "User");
        viewer.mark_invalidated(3);
        let mut source: RecordSource = [root, viewer].into_iter().collect();

        let result = check(&source, &viewer_selector());
        assert!(result.is_missing_data);

        source
            .get_mut(&DataId::new("4"))
            .unwrap()
            .set_value("name", json!("Alice"));
        let result = check(&source, &viewer_selector());
        assert!(!result.is_missing_data);
        assert_eq!(result.latest_invalidation, Some(3));
    }

    #[test]
    fn test_empty_source_is_missing() {
        assert!(check(&RecordSource::new(), &viewer_selector()).is_missing_data);
    }
}
