use entityfold::changeset::{apply, apply_in_place, diff, ChangeOp};
use serde_json::{json, Value};

fn path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_diff_identical_values_is_empty() {
    let value = json!({"name": "alice", "tags": ["a", "b"], "address": {"city": "Oslo"}});
    assert!(diff(&value, &value.clone()).is_empty());
    assert!(diff(&json!(null), &json!(null)).is_empty());
}

#[test]
fn test_diff_from_null_is_root_put() {
    let new = json!({"username": "john.doe"});
    assert_eq!(diff(&json!(null), &new), vec![ChangeOp::Put { path: vec![], value: new }]);
}

#[test]
fn test_diff_recurses_into_shared_objects() {
    let old = json!({"address": {"city": "Oslo", "zip": "0150"}, "name": "alice"});
    let new = json!({"address": {"city": "Bergen", "zip": "0150"}, "name": "alice"});

    assert_eq!(
        diff(&old, &new),
        vec![ChangeOp::Put {
            path: path(&["address", "city"]),
            value: json!("Bergen")
        }]
    );
}

#[test]
fn test_diff_replaces_changed_array_whole() {
    let old = json!({"roles": ["reader", "writer"]});
    let new = json!({"roles": ["reader"]});

    assert_eq!(
        diff(&old, &new),
        vec![ChangeOp::Put {
            path: path(&["roles"]),
            value: json!(["reader"])
        }]
    );
}

#[test]
fn test_diff_orders_nested_then_dels_then_puts() {
    let old = json!({"a": {"x": 1}, "gone": true});
    let new = json!({"a": {"x": 2}, "fresh": "yes"});

    assert_eq!(
        diff(&old, &new),
        vec![
            ChangeOp::Put { path: path(&["a", "x"]), value: json!(2) },
            ChangeOp::Del { path: path(&["gone"]) },
            ChangeOp::Put { path: path(&["fresh"]), value: json!("yes") },
        ]
    );
}

#[test]
fn test_diff_null_value_becomes_del() {
    let old = json!({"nick": "al", "name": "alice"});
    let new = json!({"nick": null, "name": "alice"});

    assert_eq!(diff(&old, &new), vec![ChangeOp::Del { path: path(&["nick"]) }]);
}

#[test]
fn test_diff_type_change_is_single_put() {
    let old = json!({"a": {"b": 1}});
    let new = json!({"a": 5});
    assert_eq!(
        diff(&old, &new),
        vec![ChangeOp::Put { path: path(&["a"]), value: json!(5) }]
    );

    assert_eq!(
        diff(&json!(1), &json!("one")),
        vec![ChangeOp::Put { path: vec![], value: json!("one") }]
    );
}

#[test]
fn test_apply_reproduces_new_value() {
    let old = json!({"name": "alice", "address": {"city": "Oslo"}, "tags": [1, 2], "nick": "al"});
    let new = json!({"name": "bob", "address": {"city": "Oslo", "zip": "0150"}, "tags": [2]});

    assert_eq!(apply(&diff(&old, &new), &old), new);
}

#[test]
fn test_apply_does_not_modify_target() {
    let target = json!({"a": 1});
    let _ = apply(&[ChangeOp::put(path(&["a"]), json!(2))], &target);
    assert_eq!(target, json!({"a": 1}));
}

#[test]
fn test_apply_creates_intermediate_objects() {
    let result = apply(&[ChangeOp::put(path(&["a", "b", "c"]), json!(1))], &json!({}));
    assert_eq!(result, json!({"a": {"b": {"c": 1}}}));
}

#[test]
fn test_apply_replaces_scalar_on_path() {
    let result = apply(&[ChangeOp::put(path(&["a", "b"]), json!(2))], &json!({"a": 1}));
    assert_eq!(result, json!({"a": {"b": 2}}));
}

#[test]
fn test_apply_put_on_null_target() {
    let result = apply(&[ChangeOp::put(path(&["a"]), json!(1))], &Value::Null);
    assert_eq!(result, json!({"a": 1}));
}

#[test]
fn test_apply_array_index_assigns_in_range() {
    let result = apply(
        &[ChangeOp::put(path(&["list", "1"]), json!(9))],
        &json!({"list": [1, 2, 3]}),
    );
    assert_eq!(result, json!({"list": [1, 9, 3]}));
}

#[test]
fn test_apply_array_index_past_end_appends() {
    let result = apply(
        &[
            ChangeOp::put(path(&["list", "2"]), json!(3)),
            ChangeOp::put(path(&["list", "3"]), json!(9)),
        ],
        &json!({"list": [1, 2]}),
    );
    assert_eq!(result, json!({"list": [1, 2, 3, 9]}));
}

#[test]
fn test_apply_huge_array_index_appends_without_padding() {
    let max = usize::MAX.to_string();
    let ops = [
        ChangeOp::put(vec!["list".into(), max], json!(1)),
        ChangeOp::put(path(&["list", "4000000000"]), json!(2)),
        ChangeOp::put(path(&["list", "4000000000", "nested"]), json!(3)),
    ];

    let result = apply(&ops, &json!({"list": []}));
    assert_eq!(result, json!({"list": [1, 2, {"nested": 3}]}));
}

#[test]
fn test_apply_del_array_element_splices() {
    let result = apply(&[ChangeOp::del(path(&["list", "1"]))], &json!({"list": [1, 2, 3]}));
    assert_eq!(result, json!({"list": [1, 3]}));
}

#[test]
fn test_apply_del_missing_path_is_noop() {
    let target = json!({"a": {"b": 1}});
    let ops = [
        ChangeOp::del(path(&["missing"])),
        ChangeOp::del(path(&["a", "missing", "deeper"])),
        ChangeOp::del(path(&["a", "b", "c"])),
    ];
    assert_eq!(apply(&ops, &target), target);
}

#[test]
fn test_apply_root_del_resets_to_null() {
    let result = apply(&[ChangeOp::del(vec![])], &json!({"a": 1}));
    assert_eq!(result, Value::Null);
}

#[test]
fn test_apply_in_place_sequence() {
    let mut state = Value::Null;
    apply_in_place(&diff(&Value::Null, &json!({"a": 1})), &mut state);
    apply_in_place(&diff(&json!({"a": 1}), &json!({"a": 1, "b": 2})), &mut state);
    assert_eq!(state, json!({"a": 1, "b": 2}));
}

#[test]
fn test_put_constructor_rewrites_null() {
    assert_eq!(
        ChangeOp::put(path(&["x"]), Value::Null),
        ChangeOp::Del { path: path(&["x"]) }
    );
    assert_eq!(ChangeOp::put(path(&["x"]), json!(0)).path(), ["x".to_string()]);
}

#[test]
fn test_changeop_serialized_form() {
    let ops = vec![
        ChangeOp::put(path(&["address", "city"]), json!("Portland")),
        ChangeOp::del(path(&["nickname"])),
    ];
    let encoded = serde_json::to_value(&ops).unwrap();
    assert_eq!(
        encoded,
        json!([
            {"type": "put", "key": ["address", "city"], "value": "Portland"},
            {"type": "del", "key": ["nickname"]}
        ])
    );

    let decoded: Vec<ChangeOp> = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, ops);
}

fn nested(depth: usize, leaf: Value) -> Value {
    let mut value = leaf;
    for _ in 0..depth {
        let mut map = serde_json::Map::new();
        map.insert("child".to_string(), value);
        value = Value::Object(map);
    }
    value
}

#[test]
fn test_diff_very_deep_values_terminates() {
    let old = nested(400, json!(1));
    let new = nested(400, json!(2));

    let ops = diff(&old, &new);
    assert_eq!(ops.len(), 1);
    assert!(ops[0].path().len() < 400);
    assert_eq!(apply(&ops, &old), new);
}
