use serde_json::json;

use super::{event, failure, parse_command, success};
use crate::error::BidiError;

#[test]
fn parses_well_formed_command() {
    let cmd = parse_command(r#"{"id":1,"method":"session.status","params":{}}"#).unwrap();
    assert_eq!(cmd.id, 1);
    assert_eq!(cmd.method, "session.status");
    assert_eq!(cmd.params, json!({}));
}

#[test]
fn defaults_missing_params_to_empty_object() {
    let cmd = parse_command(r#"{"id":2,"method":"session.status"}"#).unwrap();
    assert_eq!(cmd.params, json!({}));
}

#[test]
fn rejects_non_object_message() {
    let err = parse_command("[1,2,3]").unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[test]
fn rejects_missing_id() {
    let err = parse_command(r#"{"method":"session.status","params":{}}"#).unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[test]
fn rejects_negative_id() {
    let err = parse_command(r#"{"id":-1,"method":"session.status"}"#).unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[test]
fn rejects_method_without_dot() {
    let err = parse_command(r#"{"id":1,"method":"status"}"#).unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[test]
fn rejects_non_object_params() {
    let err = parse_command(r#"{"id":1,"method":"session.status","params":[1]}"#).unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[test]
fn success_envelope_shape() {
    let out = success(7, json!({"ready": true}));
    assert_eq!(out, json!({"id": 7, "result": {"ready": true}}));
}

#[test]
fn failure_envelope_shape() {
    let out = failure(Some(7), BidiError::NoSuchFrame("no such frame: T1".into()));
    assert_eq!(out["id"], 7);
    assert_eq!(out["error"], "no such frame");
}

#[test]
fn event_envelope_shape() {
    let out = event("browsingContext.load", json!({"context": "T1"}));
    assert_eq!(out["method"], "browsingContext.load");
    assert_eq!(out["params"]["context"], "T1");
}
