//! Diff engine: classify field differences between two snapshots.

use serde::Serialize;
use serde_json::Value;
use track_types::{ChangeType, FieldChange, FieldMap};

/// Deepest nesting accepted inside a field value.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("field `{field}` nests deeper than {limit} levels")]
    TooDeep { field: String, limit: usize },
    #[error("snapshot is not serializable: {0}")]
    Serialize(String),
    #[error("snapshot must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Compute the field changes from `old` to `new`. Absent maps are treated as empty.
///
/// Output order: keys of `old` in their order, then keys only in `new` in their order.
/// Keys present in both with structurally equal values produce no change.
pub fn compute_changes(
    old: Option<&FieldMap>,
    new: Option<&FieldMap>,
) -> Result<Vec<FieldChange>, DiffError> {
    let empty = FieldMap::new();
    let old = old.unwrap_or(&empty);
    let new = new.unwrap_or(&empty);
    let mut changes = Vec::new();

    for (field, old_value) in old {
        check_depth(field, old_value)?;
        match new.get(field) {
            None => changes.push(FieldChange {
                field: field.clone(),
                old_value: Some(old_value.clone()),
                new_value: None,
                change_type: ChangeType::Removed,
            }),
            Some(new_value) => {
                check_depth(field, new_value)?;
                if !deep_equal(old_value, new_value) {
                    changes.push(FieldChange {
                        field: field.clone(),
                        old_value: Some(old_value.clone()),
                        new_value: Some(new_value.clone()),
                        change_type: ChangeType::Modified,
                    });
                }
            }
        }
    }

    for (field, new_value) in new {
        if old.contains_key(field) {
            continue;
        }
        check_depth(field, new_value)?;
        changes.push(FieldChange {
            field: field.clone(),
            old_value: None,
            new_value: Some(new_value.clone()),
            change_type: ChangeType::Added,
        });
    }

    Ok(changes)
}

/// Diff two serializable snapshots. Each must serialize to a JSON object.
pub fn diff_snapshots<O, N>(old: &O, new: &N) -> Result<Vec<FieldChange>, DiffError>
where
    O: Serialize + ?Sized,
    N: Serialize + ?Sized,
{
    let old = to_field_map(old)?;
    let new = to_field_map(new)?;
    compute_changes(Some(&old), Some(&new))
}

/// Serialize a snapshot into a field map.
pub fn to_field_map<T: Serialize + ?Sized>(value: &T) -> Result<FieldMap, DiffError> {
    match serde_json::to_value(value).map_err(|e| DiffError::Serialize(e.to_string()))? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(FieldMap::new()),
        other => Err(DiffError::NotAnObject(kind_name(&other))),
    }
}

/// Apply `changes` to `old`: added/modified fields take their new value, removed fields are dropped.
pub fn apply_changes(old: &FieldMap, changes: &[FieldChange]) -> FieldMap {
    let mut out = old.clone();
    for change in changes {
        match change.change_type {
            ChangeType::Removed => {
                out.shift_remove(&change.field);
            }
            ChangeType::Added | ChangeType::Modified => {
                out.insert(
                    change.field.clone(),
                    change.new_value.clone().unwrap_or(Value::Null),
                );
            }
        }
    }
    out
}

/// Structural equality: objects ignore key order, arrays compare in order,
/// numbers compare by value (`1 == 1.0`). Callers bound the depth beforehand.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| deep_equal(v, w)))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| deep_equal(v, w))
        }
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(i), Some(j)) = (x.as_i64(), y.as_i64()) {
                i == j
            } else if let (Some(i), Some(j)) = (x.as_u64(), y.as_u64()) {
                i == j
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        _ => a == b,
    }
}

fn check_depth(field: &str, value: &Value) -> Result<(), DiffError> {
    let mut stack: Vec<(&Value, usize)> = vec![(value, 1)];
    while let Some((v, depth)) = stack.pop() {
        if depth > MAX_DEPTH {
            return Err(DiffError::TooDeep {
                field: field.to_string(),
                limit: MAX_DEPTH,
            });
        }
        match v {
            Value::Array(items) => stack.extend(items.iter().map(|i| (i, depth + 1))),
            Value::Object(map) => stack.extend(map.values().map(|i| (i, depth + 1))),
            _ => {}
        }
    }
    Ok(())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn map(v: Value) -> FieldMap {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn title_change_is_single_modified_entry() {
        let old = map(json!({ "title": "Inspection", "priority": "HIGH" }));
        let new = map(json!({ "title": "Inspection Updated", "priority": "HIGH" }));
        let changes = compute_changes(Some(&old), Some(&new)).unwrap();
        assert_eq!(
            changes,
            vec![FieldChange {
                field: "title".to_string(),
                old_value: Some(json!("Inspection")),
                new_value: Some(json!("Inspection Updated")),
                change_type: ChangeType::Modified,
            }]
        );
    }

    #[test]
    fn create_without_prior_state_marks_everything_added() {
        let new = map(json!({ "title": "Inspection", "stage_id": "s1", "total": 10 }));
        let changes = compute_changes(None, Some(&new)).unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.change_type == ChangeType::Added));
        assert!(changes.iter().all(|c| c.old_value.is_none()));
    }

    #[test]
    fn key_order_is_old_keys_then_new_only_keys() {
        let old = map(json!({ "c": 1, "a": 1, "b": 1 }));
        let new = map(json!({ "z": 1, "b": 2, "y": 1, "c": 2 }));
        let changes = compute_changes(Some(&old), Some(&new)).unwrap();
        let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["c", "a", "b", "z", "y"]);
        assert_eq!(changes[1].change_type, ChangeType::Removed);
        assert_eq!(changes[3].change_type, ChangeType::Added);
    }

    #[test]
    fn nested_key_order_does_not_produce_changes() {
        let old = map(json!({
            "address": { "street": "Main", "city": "Springfield", "geo": { "lat": 1, "lng": 2 } },
            "tags": ["a", "b"],
            "amount": 10
        }));
        let new = map(json!({
            "tags": ["a", "b"],
            "amount": 10.0,
            "address": { "geo": { "lng": 2, "lat": 1 }, "city": "Springfield", "street": "Main" }
        }));
        assert!(compute_changes(Some(&old), Some(&new)).unwrap().is_empty());
    }

    #[test]
    fn array_order_is_significant() {
        let old = map(json!({ "tags": ["a", "b"] }));
        let new = map(json!({ "tags": ["b", "a"] }));
        let changes = compute_changes(Some(&old), Some(&new)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Modified);
    }

    #[test]
    fn changes_stay_within_key_union_and_rebuild_new() {
        let old = map(json!({ "a": 1, "b": { "x": 1 }, "c": null, "d": [1, 2] }));
        let new = map(json!({ "b": { "x": 2 }, "c": null, "d": [1, 2], "e": "new" }));
        let changes = compute_changes(Some(&old), Some(&new)).unwrap();

        let union: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
        assert!(changes.iter().all(|c| union.contains(&c.field)));

        let rebuilt = apply_changes(&old, &changes);
        assert!(deep_equal(&Value::Object(rebuilt), &Value::Object(new)));
    }

    #[test]
    fn null_value_is_present_not_absent() {
        let old = map(json!({ "assignee": null }));
        let new = map(json!({}));
        let changes = compute_changes(Some(&old), Some(&new)).unwrap();
        assert_eq!(changes[0].change_type, ChangeType::Removed);
        assert_eq!(changes[0].old_value, Some(Value::Null));
    }

    #[test]
    fn runaway_nesting_is_rejected() {
        let mut deep = json!(0);
        for _ in 0..(MAX_DEPTH + 5) {
            deep = json!([deep]);
        }
        let mut new = FieldMap::new();
        new.insert("blob".to_string(), deep);
        let err = compute_changes(None, Some(&new)).unwrap_err();
        assert!(matches!(err, DiffError::TooDeep { ref field, .. } if field == "blob"));
    }

    #[test]
    fn snapshots_must_be_objects() {
        #[derive(Serialize)]
        struct Order {
            title: &'static str,
        }
        let changes = diff_snapshots(&Order { title: "a" }, &Order { title: "b" }).unwrap();
        assert_eq!(changes.len(), 1);

        let err = diff_snapshots(&Order { title: "a" }, &vec![1, 2]).unwrap_err();
        assert!(matches!(err, DiffError::NotAnObject("array")));
    }

    #[test]
    fn non_string_map_keys_fail_to_serialize() {
        use std::collections::HashMap;
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);
        let err = to_field_map(&bad).unwrap_err();
        assert!(matches!(err, DiffError::Serialize(_)));
    }
}
