//! Shared selection walk over stored records
//!
//! The reader, the reference marker and the data checker all walk a
//! selection tree against records already in a source. This module owns the
//! parts they have in common: evaluating `@include`/`@skip`, resolving type
//! conditions, and stepping through `@defer`/`@stream` wrappers. Each walker
//! implements [`SelectionVisitor`] for the field-level work.

use crate::record::Record;
use relay_types::{
    CatchField, Condition, FragmentSpread, InlineFragment, LinkedField, ScalarField, Selection,
    Variables,
};
use serde_json::Value;
use std::ops::ControlFlow;

/// Outcome of testing a record against an inline fragment's type condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMatch {
    Matches,
    DoesNotMatch,
    /// Abstract condition whose marker was never written for this record
    Unknown,
}

/// Tests a record against an inline fragment
///
/// Concrete conditions compare type names. Abstract conditions consult the
/// boolean the normalizer stored under the fragment's abstract key.
pub fn type_condition_match(record: &Record, fragment: &InlineFragment) -> TypeMatch {
    if record.typename() == fragment.type_condition {
        return TypeMatch::Matches;
    }
    match &fragment.abstract_key {
        Some(key) => match record.get_value(key) {
            Some(Value::Bool(true)) => TypeMatch::Matches,
            Some(Value::Bool(false)) => TypeMatch::DoesNotMatch,
            _ => TypeMatch::Unknown,
        },
        None => TypeMatch::DoesNotMatch,
    }
}

/// True when a conditional node's subtree is included
pub fn evaluate_condition(condition: &Condition, variables: &Variables) -> bool {
    matches!(
        variables.get(&condition.condition),
        Some(Value::Bool(value)) if *value == condition.passing_value
    )
}

/// Field-level callbacks for [`traverse`]
///
/// Returning `ControlFlow::Break` stops the walk of the current selection
/// list; the reader uses this to bubble nulls out of required fields.
pub trait SelectionVisitor {
    type Break;

    /// Variables in scope at the current position
    fn variables(&self) -> &Variables;

    fn scalar(&mut self, record: &Record, field: &ScalarField) -> ControlFlow<Self::Break>;

    fn linked(&mut self, record: &Record, field: &LinkedField) -> ControlFlow<Self::Break>;

    fn fragment_spread(
        &mut self,
        record: &Record,
        spread: &FragmentSpread,
    ) -> ControlFlow<Self::Break>;

    fn inline_fragment(
        &mut self,
        record: &Record,
        fragment: &InlineFragment,
        matched: TypeMatch,
    ) -> ControlFlow<Self::Break> {
        match matched {
            TypeMatch::Matches => traverse(self, record, &fragment.selections),
            TypeMatch::DoesNotMatch | TypeMatch::Unknown => ControlFlow::Continue(()),
        }
    }

    fn catch_field(&mut self, record: &Record, catch: &CatchField) -> ControlFlow<Self::Break> {
        traverse(self, record, std::slice::from_ref(catch.field.as_ref()))
    }
}

/// Walks `selections` against `record`, dispatching to the visitor
pub fn traverse<V>(visitor: &mut V, record: &Record, selections: &[Selection]) -> ControlFlow<V::Break>
where
    V: SelectionVisitor + ?Sized,
{
    for selection in selections {
        match selection {
            Selection::ScalarField(field) => visitor.scalar(record, field)?,
            Selection::LinkedField(field) => visitor.linked(record, field)?,
            Selection::FragmentSpread(spread) => visitor.fragment_spread(record, spread)?,
            Selection::InlineFragment(fragment) => {
                let matched = type_condition_match(record, fragment);
                visitor.inline_fragment(record, fragment, matched)?
            }
            Selection::Condition(condition) => {
                if evaluate_condition(condition, visitor.variables()) {
                    traverse(visitor, record, &condition.selections)?
                }
            }
            Selection::Defer(defer) => traverse(visitor, record, &defer.selections)?,
            Selection::Stream(stream) => traverse(visitor, record, &stream.selections)?,
            Selection::CatchField(catch) => visitor.catch_field(record, catch)?,
        }
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::DataId;
    use serde_json::json;

    struct FieldNames {
        variables: Variables,
        names: Vec<String>,
    }

    impl SelectionVisitor for FieldNames {
        type Break = ();

        fn variables(&self) -> &Variables {
            &self.variables
        }

        fn scalar(&mut self, _record: &Record, field: &ScalarField) -> ControlFlow<()> {
            self.names.push(field.name.clone());
            ControlFlow::Continue(())
        }

        fn linked(&mut self, _record: &Record, field: &LinkedField) -> ControlFlow<()> {
            self.names.push(field.name.clone());
            ControlFlow::Continue(())
        }

        fn fragment_spread(&mut self, _record: &Record, _spread: &FragmentSpread) -> ControlFlow<()> {
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn test_conditions_and_type_refinements() {
        let mut record = Record::new(DataId::new("1"), "User");
        record.set_value("__isActor", json!(true));

        let selections = vec![
            Selection::scalar("id"),
            Selection::Condition(Condition {
                condition: "withBio".to_string(),
                passing_value: true,
                selections: vec![Selection::scalar("bio")],
            }),
            Selection::InlineFragment(InlineFragment {
                type_condition: "Page".to_string(),
                abstract_key: None,
                selections: vec![Selection::scalar("likes")],
            }),
            Selection::InlineFragment(InlineFragment {
                type_condition: "Actor".to_string(),
                abstract_key: Some("__isActor".to_string()),
                selections: vec![Selection::scalar("avatar")],
            }),
        ];

        let mut visitor = FieldNames {
            variables: Variables::new(),
            names: Vec::new(),
        };
        let _ = traverse(&mut visitor, &record, &selections);
        assert_eq!(visitor.names, vec!["id", "avatar"]);

        visitor.variables.insert("withBio".to_string(), json!(true));
        visitor.names.clear();
        let _ = traverse(&mut visitor, &record, &selections);
        assert_eq!(visitor.names, vec!["id", "bio", "avatar"]);
    }

    #[test]
    fn test_unknown_abstract_match() {
        let record = Record::new(DataId::new("1"), "User");
        let fragment = InlineFragment {
            type_condition: "Node".to_string(),
            abstract_key: Some("__isNode".to_string()),
            selections: vec![],
        };
        assert_eq!(type_condition_match(&record, &fragment), TypeMatch::Unknown);
    }
}
