//! Structural sharing between successive reads
//!
//! [`recycle_nodes_into`] walks a fresh read result alongside the previous
//! one and substitutes the previous subtree wherever the two are deeply
//! equal. The walk follows the shape of the data, which is the shape of the
//! selection tree that produced it.

use crate::snapshot::Data;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Returns `next`, reusing every subtree of `prev` that is unchanged
///
/// If nothing changed at all the result is `prev` itself, so callers can
/// detect a no-op read with [`Data::ptr_eq`].
pub fn recycle_nodes_into(prev: &Data, next: Data) -> Data {
    match (prev, next) {
        (Data::Object(prev_fields), Data::Object(next_fields)) => {
            if Arc::ptr_eq(prev_fields, &next_fields) {
                return prev.clone();
            }
            let mut all_reused = prev_fields.len() == next_fields.len();
            let fields = Arc::try_unwrap(next_fields).unwrap_or_else(|shared| (*shared).clone());
            let mut recycled = BTreeMap::new();
            for (key, value) in fields {
                let value = match prev_fields.get(&key) {
                    Some(previous) => {
                        let value = recycle_nodes_into(previous, value);
                        all_reused &= value.ptr_eq(previous);
                        value
                    }
                    None => {
                        all_reused = false;
                        value
                    }
                };
                recycled.insert(key, value);
            }
            if all_reused {
                prev.clone()
            } else {
                Data::object(recycled)
            }
        }
        (Data::List(prev_items), Data::List(next_items)) => {
            if Arc::ptr_eq(prev_items, &next_items) {
                return prev.clone();
            }
            let mut all_reused = prev_items.len() == next_items.len();
            let items = Arc::try_unwrap(next_items).unwrap_or_else(|shared| (*shared).clone());
            let recycled: Vec<Data> = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match prev_items.get(index) {
                    Some(previous) => {
                        let item = recycle_nodes_into(previous, item);
                        all_reused &= item.ptr_eq(previous);
                        item
                    }
                    None => item,
                })
                .collect();
            if all_reused {
                prev.clone()
            } else {
                Data::list(recycled)
            }
        }
        (Data::Result(prev_result), next @ Data::Result(_)) => {
            if let Data::Result(next_result) = &next {
                if prev_result == next_result {
                    return prev.clone();
                }
            }
            next
        }
        (Data::Owner(prev_owner), Data::Owner(next_owner)) => {
            if prev_owner.identifier == next_owner.identifier {
                prev.clone()
            } else {
                Data::Owner(next_owner)
            }
        }
        (Data::Null, Data::Null) => Data::Null,
        (Data::Scalar(prev_value), Data::Scalar(next_value)) if *prev_value == next_value => {
            prev.clone()
        }
        (_, next) => next,
    }
}
