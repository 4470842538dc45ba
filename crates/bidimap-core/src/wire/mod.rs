//! Wire codec: parses incoming BiDi JSON into typed command records and
//! renders outgoing response/error/event envelopes.

use serde_json::Value;
use tracing::trace;

use crate::error::BidiError;

#[cfg(test)]
mod tests;

/// A parsed, structurally valid incoming command.
#[derive(Debug, Clone)]
pub struct RawCommand {
    /// Command id, echoed back in the response.
    pub id: u64,
    /// Dotted method name, e.g. `"browsingContext.navigate"`.
    pub method: String,
    /// Command parameters. Always an object (possibly empty).
    pub params: Value,
}

/// Parse a raw incoming message into a [`RawCommand`].
///
/// # Errors
///
/// Returns [`BidiError::InvalidArgument`] if the message is not a JSON
/// object, is missing `id`/`method`, or `id`/`method`/`params` have the
/// wrong shape. The returned error carries no recoverable `id` (the caller
/// should respond with `id: null`, per the BiDi wire format for malformed
/// input).
pub fn parse_command(raw: &str) -> Result<RawCommand, BidiError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| BidiError::InvalidArgument(format!("malformed JSON: {e}")))?;
    parse_command_value(value)
}

/// Parse an already-decoded JSON value into a [`RawCommand`].
///
/// # Errors
///
/// See [`parse_command`].
pub fn parse_command_value(value: Value) -> Result<RawCommand, BidiError> {
    let Value::Object(mut obj) = value else {
        return Err(BidiError::InvalidArgument(
            "command must be a JSON object".to_string(),
        ));
    };

    let id = match obj.remove("id").and_then(|v| v.as_u64()) {
        Some(id) => id,
        None => {
            return Err(BidiError::InvalidArgument(
                "command is missing a non-negative integer \"id\"".to_string(),
            ));
        }
    };

    let method = match obj.remove("method") {
        Some(Value::String(s)) if !s.is_empty() && s.contains('.') => s,
        Some(_) => {
            return Err(BidiError::InvalidArgument(
                "method must be a non-empty dotted identifier".to_string(),
            ));
        }
        None => {
            return Err(BidiError::InvalidArgument(
                "command is missing required field \"method\"".to_string(),
            ));
        }
    };

    let params = match obj.remove("params") {
        Some(v @ Value::Object(_)) => v,
        Some(_) => {
            return Err(BidiError::InvalidArgument(
                "params must be an object".to_string(),
            ));
        }
        None => Value::Object(serde_json::Map::new()),
    };

    trace!(id, method = %method, "parsed BiDi command");

    Ok(RawCommand { id, method, params })
}

/// Render a successful command result.
#[must_use]
pub fn success(id: u64, result: Value) -> Value {
    serde_json::json!({ "id": id, "result": result })
}

/// Render a command failure using the BiDi error envelope.
#[must_use]
pub fn failure(id: Option<u64>, error: BidiError) -> Value {
    error.into_response(id)
}

/// Render an outgoing event.
#[must_use]
pub fn event(method: &str, params: Value) -> Value {
    serde_json::json!({ "method": method, "params": params })
}
