use std::time::Duration;

use bidimap_cdp::protocol::runtime::ConsoleApiType;
use serde_json::json;

use super::*;

#[test]
fn options_builder_defaults_and_overrides() {
    let opts = MapperSessionOptions::new("target-1");
    assert_eq!(opts.self_target_id, "target-1");
    assert_eq!(opts.cdp_command_timeout, DEFAULT_CDP_COMMAND_TIMEOUT);
    assert!(opts.event_buffer_capacity.is_empty());

    let opts = MapperSessionOptions::new("target-1")
        .cdp_command_timeout(Duration::from_secs(5))
        .event_buffer_capacity("log.entryAdded", 10);
    assert_eq!(opts.cdp_command_timeout, Duration::from_secs(5));
    assert_eq!(opts.event_buffer_capacity.get("log.entryAdded"), Some(&10));
}

#[test]
fn recognized_cdp_events_are_not_passed_through() {
    assert!(is_recognized_cdp_event("Target.attachedToTarget"));
    assert!(is_recognized_cdp_event("Page.lifecycleEvent"));
    assert!(!is_recognized_cdp_event("Network.requestWillBeSent"));
    assert!(!is_recognized_cdp_event("Page.javascriptDialogClosed"));
}

#[test]
fn console_log_level_maps_error_family_to_error() {
    assert_eq!(console_log_level(&ConsoleApiType::Error), "error");
    assert_eq!(console_log_level(&ConsoleApiType::Assert), "error");
    assert_eq!(console_log_level(&ConsoleApiType::Warning), "warn");
    assert_eq!(console_log_level(&ConsoleApiType::Debug), "debug");
    assert_eq!(console_log_level(&ConsoleApiType::Log), "info");
}

#[test]
fn parse_event_reports_malformed_params() {
    let result: Result<AttachedToTargetEvent, BidiError> = parse_event(json!({"unexpected": true}));
    assert!(matches!(result, Err(BidiError::Unknown(_))));
}
