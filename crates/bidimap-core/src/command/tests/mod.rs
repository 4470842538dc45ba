use serde_json::json;

use super::*;

#[test]
fn parse_recognizes_every_listed_method() {
    let methods = [
        "session.status",
        "session.subscribe",
        "session.unsubscribe",
        "browsingContext.getTree",
        "browsingContext.create",
        "browsingContext.close",
        "browsingContext.navigate",
        "browsingContext.reload",
        "browsingContext.activate",
        "browsingContext.captureScreenshot",
        "browsingContext.print",
        "browsingContext.setViewport",
        "browsingContext.handleUserPrompt",
        "script.evaluate",
        "script.callFunction",
        "script.disown",
        "script.getRealms",
        "script.addPreloadScript",
        "script.removePreloadScript",
        "cdp.sendCommand",
        "cdp.getSession",
    ];
    for m in methods {
        assert!(Method::parse(m).is_ok(), "expected {m} to be recognized");
    }
}

#[test]
fn parse_rejects_unknown_method() {
    let err = Method::parse("browsingContext.bogus").unwrap_err();
    assert_eq!(err.code(), "unknown command");
}

#[test]
fn subscribe_params_defaults_empty_contexts_and_no_channel() {
    let params: SubscriptionParams =
        parse_params(json!({"events": ["browsingContext.load"]})).unwrap();
    assert_eq!(params.events, vec!["browsingContext.load".to_string()]);
    assert!(params.contexts.is_empty());
    assert!(params.channel.is_none());
}

#[test]
fn navigate_params_default_wait_is_complete() {
    let params: NavigateParams =
        parse_params(json!({"context": "c1", "url": "https://example.com"})).unwrap();
    assert_eq!(params.wait, WaitCondition::Complete);
}

#[test]
fn create_params_rejects_unknown_type() {
    let err = parse_params::<CreateParams>(json!({"type": "popup"})).unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[test]
fn script_evaluate_requires_await_promise() {
    let err = parse_params::<ScriptEvaluateParams>(json!({
        "expression": "1 + 1",
        "target": {"context": "c1"},
    }))
    .unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[test]
fn script_evaluate_accepts_explicit_await_promise() {
    let params: ScriptEvaluateParams = parse_params(json!({
        "expression": "1 + 1",
        "target": {"context": "c1"},
        "awaitPromise": false,
    }))
    .unwrap();
    assert!(!params.await_promise);
    assert_eq!(params.result_ownership, ResultOwnership::None);
}

#[test]
fn call_function_defaults_this_and_arguments() {
    let params: CallFunctionParams = parse_params(json!({
        "functionDeclaration": "() => 1",
        "target": {"realm": "r1"},
        "awaitPromise": true,
    }))
    .unwrap();
    assert!(params.this.is_none());
    assert!(params.arguments.is_empty());
    assert_eq!(params.target.realm.as_deref(), Some("r1"));
}

#[test]
fn result_ownership_converts_into_value_module_type() {
    assert_eq!(ValueResultOwnership::from(ResultOwnership::Root), ValueResultOwnership::Root);
    assert_eq!(ValueResultOwnership::from(ResultOwnership::None), ValueResultOwnership::None);
}

#[test]
fn cdp_send_command_defaults_params_to_null() {
    let params: CdpSendCommandParams =
        parse_params(json!({"method": "Page.enable", "session": "s1"})).unwrap();
    assert_eq!(params.params, Value::Null);
}
