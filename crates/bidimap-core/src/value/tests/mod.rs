use serde_json::json;

use super::{HandleRegistry, LocalValue, MapKey, NumberValue, deserialize_local_value, regexp_remote_value, tagged_to_value};

#[test]
fn parses_primitives() {
    assert_eq!(
        LocalValue::from_json(&json!({"type": "undefined"})).unwrap(),
        LocalValue::Undefined
    );
    assert_eq!(
        LocalValue::from_json(&json!({"type": "null"})).unwrap(),
        LocalValue::Null
    );
    assert_eq!(
        LocalValue::from_json(&json!({"type": "string", "value": "hi"})).unwrap(),
        LocalValue::String("hi".to_string())
    );
    assert_eq!(
        LocalValue::from_json(&json!({"type": "boolean", "value": true})).unwrap(),
        LocalValue::Boolean(true)
    );
    assert_eq!(
        LocalValue::from_json(&json!({"type": "bigint", "value": "123"})).unwrap(),
        LocalValue::BigInt("123".to_string())
    );
}

#[test]
fn parses_special_number_literals() {
    assert_eq!(
        LocalValue::from_json(&json!({"type": "number", "value": "NaN"})).unwrap(),
        LocalValue::Number(NumberValue::NaN)
    );
    assert_eq!(
        LocalValue::from_json(&json!({"type": "number", "value": "-0"})).unwrap(),
        LocalValue::Number(NumberValue::NegZero)
    );
    assert_eq!(
        LocalValue::from_json(&json!({"type": "number", "value": 2.5})).unwrap(),
        LocalValue::Number(NumberValue::Finite(2.5))
    );
}

#[test]
fn rejects_unrecognized_number_literal() {
    let err = LocalValue::from_json(&json!({"type": "number", "value": "banana"})).unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[test]
fn parses_regexp() {
    let v = LocalValue::from_json(&json!({
        "type": "regexp",
        "value": {"pattern": "a.*b", "flags": "gi"},
    }))
    .unwrap();
    assert_eq!(
        v,
        LocalValue::Regexp {
            pattern: "a.*b".to_string(),
            flags: "gi".to_string(),
        }
    );
}

#[test]
fn parses_nested_array() {
    let v = LocalValue::from_json(&json!({
        "type": "array",
        "value": [
            {"type": "number", "value": 1},
            {"type": "string", "value": "x"},
        ],
    }))
    .unwrap();
    assert_eq!(
        v,
        LocalValue::Array(vec![
            LocalValue::Number(NumberValue::Finite(1.0)),
            LocalValue::String("x".to_string()),
        ])
    );
    assert!(v.needs_materialization());
}

#[test]
fn parses_object_with_non_string_key() {
    let v = LocalValue::from_json(&json!({
        "type": "object",
        "value": [
            ["count", {"type": "number", "value": 1}],
            [{"type": "string", "value": "k"}, {"type": "boolean", "value": false}],
        ],
    }))
    .unwrap();
    let LocalValue::Object(entries) = v else {
        panic!("expected object");
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, MapKey::StringKey("count".to_string()));
    assert_eq!(
        entries[1].0,
        MapKey::ValueKey(Box::new(LocalValue::String("k".to_string())))
    );
}

#[test]
fn parses_remote_reference_by_handle() {
    let v = LocalValue::from_json(&json!({"handle": "h1"})).unwrap();
    assert_eq!(v, LocalValue::Remote("h1".to_string()));
}

#[test]
fn missing_type_is_invalid_argument() {
    let err = LocalValue::from_json(&json!({"value": 1})).unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[tokio::test]
async fn deserializes_string_to_call_argument() {
    let registry = HandleRegistry::new();
    let arg = deserialize_local_value(&LocalValue::String("hi".to_string()), "realm-1", &registry)
        .await
        .unwrap();
    assert_eq!(arg.value, Some(json!("hi")));
    assert!(arg.object_id.is_none());
}

#[tokio::test]
async fn deserializes_nan_as_unserializable() {
    let registry = HandleRegistry::new();
    let arg = deserialize_local_value(
        &LocalValue::Number(NumberValue::NaN),
        "realm-1",
        &registry,
    )
    .await
    .unwrap();
    assert_eq!(arg.unserializable_value.as_deref(), Some("NaN"));
}

#[tokio::test]
async fn remote_reference_requires_matching_realm() {
    let registry = HandleRegistry::new();
    registry
        .register("obj-1".to_string(), "realm-1".to_string())
        .await;

    let ok = deserialize_local_value(
        &LocalValue::Remote("obj-1".to_string()),
        "realm-1",
        &registry,
    )
    .await
    .unwrap();
    assert_eq!(ok.object_id.as_deref(), Some("obj-1"));

    let err = deserialize_local_value(
        &LocalValue::Remote("obj-1".to_string()),
        "realm-2",
        &registry,
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[tokio::test]
async fn container_values_are_rejected_by_plain_deserialize() {
    let registry = HandleRegistry::new();
    let err = deserialize_local_value(&LocalValue::Array(vec![]), "realm-1", &registry)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[tokio::test]
async fn handle_registry_release_forgets_handle() {
    let registry = HandleRegistry::new();
    registry
        .register("obj-1".to_string(), "realm-1".to_string())
        .await;
    registry.release("obj-1").await;
    assert_eq!(registry.realm_of("obj-1").await, None);
}

#[test]
fn regexp_remote_value_recovers_pattern_and_flags() {
    let v = regexp_remote_value(Some("/a.*b/gi"));
    assert_eq!(v, json!({"type": "regexp", "value": {"pattern": "a.*b", "flags": "gi"}}));
}

#[test]
fn regexp_remote_value_handles_empty_pattern() {
    let v = regexp_remote_value(Some("//gi"));
    assert_eq!(v, json!({"type": "regexp", "value": {"pattern": "", "flags": "gi"}}));
}

#[test]
fn regexp_remote_value_falls_back_without_description() {
    let v = regexp_remote_value(None);
    assert_eq!(v, json!({"type": "regexp", "value": {"pattern": "", "flags": ""}}));
}

#[test]
fn tagged_to_value_covers_special_numbers_and_primitives() {
    assert_eq!(tagged_to_value("nan", &json!(null)), json!({"type": "number", "value": "NaN"}));
    assert_eq!(tagged_to_value("inf", &json!(null)), json!({"type": "number", "value": "Infinity"}));
    assert_eq!(tagged_to_value("neginf", &json!(null)), json!({"type": "number", "value": "-Infinity"}));
    assert_eq!(tagged_to_value("negzero", &json!(null)), json!({"type": "number", "value": "-0"}));
    assert_eq!(tagged_to_value("number", &json!(3.5)), json!({"type": "number", "value": 3.5}));
    assert_eq!(tagged_to_value("string", &json!("hi")), json!({"type": "string", "value": "hi"}));
    assert_eq!(tagged_to_value("boolean", &json!(true)), json!({"type": "boolean", "value": true}));
    assert_eq!(tagged_to_value("bigint", &json!("42")), json!({"type": "bigint", "value": "42"}));
    assert_eq!(tagged_to_value("undefined", &json!(null)), json!({"type": "undefined"}));
    assert_eq!(tagged_to_value("null", &json!(null)), json!({"type": "null"}));
}

#[tokio::test]
async fn handle_registry_release_realm_drops_only_that_realms_handles() {
    let registry = HandleRegistry::new();
    registry
        .register("obj-1".to_string(), "realm-1".to_string())
        .await;
    registry
        .register("obj-2".to_string(), "realm-2".to_string())
        .await;

    registry.release_realm("realm-1").await;

    assert_eq!(registry.realm_of("obj-1").await, None);
    assert_eq!(registry.realm_of("obj-2").await, Some("realm-2".to_string()));
}
