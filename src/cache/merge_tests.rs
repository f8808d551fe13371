use super::*;
use proptest::prelude::*;
use serde_json::json;

#[test]
fn nested_objects_overlay_key_by_key() {
    let base = json!({"transform": {"local": {"position": {"x": 1, "y": 2}}}, "name": "a"});
    let update = json!({"transform": {"local": {"position": {"x": 9}}}});
    let merged = deep_merge(base, update);
    assert_eq!(merged["transform"]["local"]["position"]["x"], 9);
    assert_eq!(merged["transform"]["local"]["position"]["y"], 2);
    assert_eq!(merged["name"], "a");
}

#[test]
fn arrays_replace_rather_than_concatenate() {
    let base = json!({"tags": ["a", "b", "c"]});
    let update = json!({"tags": ["z"]});
    let merged = deep_merge(base, update);
    assert_eq!(merged["tags"], json!(["z"]));
}

#[test]
fn primitives_overwrite() {
    let merged = deep_merge(json!({"count": 1}), json!({"count": 2}));
    assert_eq!(merged["count"], 2);
}

#[test]
fn absent_keys_in_update_never_clobber_base() {
    let base = json!({"a": 1, "b": 2});
    let update = json!({"a": 5});
    let merged = deep_merge(base, update);
    assert_eq!(merged["b"], 2);
}

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{1,6}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn merge_is_idempotent(base in arb_value(), update in arb_value()) {
        let once = deep_merge(base.clone(), update.clone());
        let twice = deep_merge(once.clone(), update);
        prop_assert_eq!(once, twice);
    }
}
