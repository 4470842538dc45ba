use super::BidiError;

#[test]
fn invalid_argument_code() {
    let err = BidiError::InvalidArgument("bad params".into());
    assert_eq!(err.code(), "invalid argument");
}

#[test]
fn no_such_frame_code() {
    let err = BidiError::NoSuchFrame("no such frame: T9".into());
    assert_eq!(err.code(), "no such frame");
}

#[test]
fn no_such_script_code() {
    let err = BidiError::NoSuchScript("no such script: abc".into());
    assert_eq!(err.code(), "no such script");
}

#[test]
fn unsupported_operation_code() {
    let err = BidiError::UnsupportedOperation("not implemented".into());
    assert_eq!(err.code(), "unsupported operation");
}

#[test]
fn unknown_command_code() {
    let err = BidiError::UnknownCommand("browsingContext.bogus".into());
    assert_eq!(err.code(), "unknown command");
}

#[test]
fn cdp_errors_surface_as_unknown_error() {
    let err = BidiError::from(bidimap_cdp::CdpError::ConnectionLost);
    assert_eq!(err.code(), "unknown error");
}

#[test]
fn into_response_carries_id_and_message() {
    let err = BidiError::NoSuchFrame("no such frame: T9".into());
    let response = err.into_response(Some(42));
    assert_eq!(response["id"], 42);
    assert_eq!(response["error"], "no such frame");
    assert_eq!(response["message"], "no such frame: T9");
}

#[test]
fn into_response_allows_null_id() {
    let err = BidiError::Unknown("boom".into());
    let response = err.into_response(None);
    assert!(response["id"].is_null());
}

#[test]
fn error_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<BidiError>();
}
