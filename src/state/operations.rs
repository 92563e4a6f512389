//! State update application.
//!
//! Every function here takes the previous state as an explicit argument and
//! returns the next state. Nothing is captured from the caller's scope, which
//! is what lets queued updates compose.

use crate::dynamic::JsonRecord;
use crate::error::Result;
use crate::record::Record;
use crate::types::{Field, FieldUpdate, MergeUpdate};
use serde_json::Value;

/// Replace a single field, resolving the update against that field's
/// previous value only.
pub fn apply_field_update<S, V>(prev: &S, field: Field<S, V>, update: FieldUpdate<V>) -> S
where
    S: Clone,
{
    let value = update.resolve(field.get(prev));
    let mut next = prev.clone();
    *field.get_mut(&mut next) = value;
    next
}

/// Merge a patch into the previous state.
///
/// Both the literal and the function form merge into `prev`. A literal
/// patch is never merged into an older snapshot.
pub fn apply_merge<S: Record>(prev: &S, update: MergeUpdate<S>) -> Result<S> {
    let patch = update.resolve(prev);
    let mut next = prev.clone();
    next.apply_patch(patch)?;
    Ok(next)
}

/// Replace one key of a JSON record.
///
/// A transform of an undeclared key sees `null` as its previous value.
pub fn apply_key_update(prev: &JsonRecord, key: &str, update: FieldUpdate<Value>) -> Result<JsonRecord> {
    let value = match prev.get(key) {
        Some(current) => update.resolve(current),
        None => update.resolve(&Value::Null),
    };
    let mut next = prev.clone();
    next.insert_checked(key, value)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::UnknownFieldPolicy;
    use crate::error::StateError;
    use serde_json::json;

    crate::record! {
        #[derive(Clone, Debug, PartialEq)]
        struct Counter patch CounterPatch {
            count: i64,
            name: String,
        }
    }

    fn counter(count: i64) -> Counter {
        Counter {
            count,
            name: "a".to_string(),
        }
    }

    #[test]
    fn test_field_literal() {
        let next = apply_field_update(&counter(0), crate::field!(Counter, count), FieldUpdate::value(5));
        assert_eq!(next, counter(5));
    }

    #[test]
    fn test_field_transform_sees_field_value() {
        let next = apply_field_update(
            &counter(5),
            crate::field!(Counter, count),
            FieldUpdate::with(|prev: &i64| prev + 1),
        );
        assert_eq!(next.count, 6);
        assert_eq!(next.name, "a");
    }

    #[test]
    fn test_merge_literal() {
        let next = apply_merge(&counter(0), MergeUpdate::patch(CounterPatch::default().count(10))).unwrap();
        assert_eq!(next, counter(10));
    }

    #[test]
    fn test_merge_transform_matches_field_transform() {
        let via_merge = apply_merge(
            &counter(3),
            MergeUpdate::with(|prev: &Counter| CounterPatch::default().count(prev.count + 1)),
        )
        .unwrap();
        let via_field = apply_field_update(
            &counter(3),
            crate::field!(Counter, count),
            FieldUpdate::with(|prev: &i64| prev + 1),
        );
        assert_eq!(via_merge, via_field);
    }

    #[test]
    fn test_merge_empty_patch_is_identity() {
        let next = apply_merge(&counter(7), MergeUpdate::patch(CounterPatch::default())).unwrap();
        assert_eq!(next, counter(7));
    }

    #[test]
    fn test_key_update_transform() {
        let prev = JsonRecord::new(json!({"count": 1, "name": "a"}), UnknownFieldPolicy::Reject).unwrap();
        let next = apply_key_update(
            &prev,
            "count",
            FieldUpdate::with(|v: &Value| json!(v.as_i64().unwrap_or(0) + 1)),
        )
        .unwrap();

        assert_eq!(next.get("count"), Some(&json!(2)));
        assert_eq!(next.get("name"), Some(&json!("a")));
    }

    #[test]
    fn test_key_update_unknown_key_rejected() {
        let prev = JsonRecord::new(json!({"count": 1}), UnknownFieldPolicy::Reject).unwrap();
        let result = apply_key_update(&prev, "missing", FieldUpdate::value(json!(1)));
        assert!(matches!(result, Err(StateError::UnknownField(_))));
    }

    #[test]
    fn test_key_update_unknown_key_extends() {
        let prev = JsonRecord::new(json!({"count": 1}), UnknownFieldPolicy::Extend).unwrap();
        let next = apply_key_update(
            &prev,
            "added",
            FieldUpdate::with(|v: &Value| {
                assert!(v.is_null());
                json!(true)
            }),
        )
        .unwrap();
        assert_eq!(next.get("added"), Some(&json!(true)));
    }
}
