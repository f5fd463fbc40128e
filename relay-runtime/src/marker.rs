//! Reference marking
//!
//! Collects the identities a normalization selector reaches in a source
//! without building any data. The garbage collector marks from its roots,
//! and invalidation uses the same walk to find what an operation touches.

use crate::record::Record;
use crate::record_source::{RecordEntry, RecordSourceRead};
use crate::selector::NormalizationSelector;
use crate::storage_key::{get_handle_storage_key, linked_storage_key, spread_variables};
use crate::traversal::{traverse, SelectionVisitor, TypeMatch};
use relay_types::{DataId, FragmentSpread, InlineFragment, LinkedField, ScalarField, Selection, Variables};
use std::collections::HashSet;
use std::ops::ControlFlow;

/// How type-conditional branches are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkMode {
    /// Follow every branch that could apply; used for retention
    Conservative,
    /// Follow only branches that apply to the stored data
    Exact,
}

/// Adds every identity reachable by `selector` to `references`
///
/// Identities that are referenced but absent from the source are included,
/// so a later write that fills them in stays retained.
pub fn mark<S: RecordSourceRead + ?Sized>(
    source: &S,
    selector: &NormalizationSelector,
    references: &mut HashSet<DataId>,
    mode: MarkMode,
) {
    let mut marker = Marker {
        source,
        variables: selector.variables.clone(),
        references,
        mode,
    };
    marker.visit(&selector.data_id, &selector.selections);
}

struct Marker<'a, S: ?Sized> {
    source: &'a S,
    variables: Variables,
    references: &'a mut HashSet<DataId>,
    mode: MarkMode,
}

impl<S: RecordSourceRead + ?Sized> Marker<'_, S> {
    fn visit(&mut self, id: &DataId, selections: &[Selection]) {
        self.references.insert(id.clone());
        let source = self.source;
        if let Some(RecordEntry::Existent(record)) = source.entry(id) {
            let _ = traverse(self, record, selections);
        }
    }

    fn follow(&mut self, record: &Record, storage_key: &str, field: &LinkedField) {
        if field.plural {
            if let Some(Some(ids)) = record.get_linked_record_ids(storage_key) {
                for id in ids.iter().flatten() {
                    self.visit(id, &field.selections);
                }
            }
        } else if let Some(Some(id)) = record.get_linked_record_id(storage_key) {
            self.visit(id, &field.selections);
        }
    }
}

impl<S: RecordSourceRead + ?Sized> SelectionVisitor for Marker<'_, S> {
    type Break = ();

    fn variables(&self) -> &Variables {
        &self.variables
    }

    fn scalar(&mut self, _record: &Record, _field: &ScalarField) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn linked(&mut self, record: &Record, field: &LinkedField) -> ControlFlow<()> {
        let storage_key = linked_storage_key(field, self.variables());
        self.follow(record, &storage_key, field);

        if let Some(connection) = &field.connection {
            let handle_key = get_handle_storage_key(connection, &field.args, self.variables());
            if let Some(Some(connection_id)) = record.get_linked_record_id(&handle_key) {
                self.visit(connection_id, &field.selections);
            }
        }
        ControlFlow::Continue(())
    }

    fn fragment_spread(&mut self, record: &Record, spread: &FragmentSpread) -> ControlFlow<()> {
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
    ) -> ControlFlow<()> {
        match (self.mode, matched) {
            (MarkMode::Conservative, _) | (MarkMode::Exact, TypeMatch::Matches) => {
                traverse(self, record, &fragment.selections)
            }
            _ => ControlFlow::Continue(()),
        }
    }
}
