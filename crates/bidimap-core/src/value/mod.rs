//! Bidirectional BiDi `LocalValue`/`RemoteValue` ⇄ CDP `RemoteObject`/
//! `CallArgument` mapping, and the handle registry that tracks ownership
//! of CDP objects exposed to the client.

use std::collections::HashMap;

use bidimap_cdp::CdpConnection;
use bidimap_cdp::protocol::runtime::{CallArgument, CallFunctionOnParams, RemoteObject};
use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::error::BidiError;
use crate::realm::RealmId;

#[cfg(test)]
mod tests;

/// A value sent by the client, to be deserialized into a CDP call
/// argument.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalValue {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A UTF-8 string.
    String(String),
    /// A boolean.
    Boolean(bool),
    /// A number, including the non-JSON-representable special values.
    Number(NumberValue),
    /// A `BigInt`, carried as its decimal string representation.
    BigInt(String),
    /// A `Date`, carried as an ISO-8601 string.
    Date(String),
    /// A `RegExp`.
    Regexp {
        /// The pattern source.
        pattern: String,
        /// The flags string, e.g. `"gi"`.
        flags: String,
    },
    /// An `Array`.
    Array(Vec<LocalValue>),
    /// A `Set`.
    Set(Vec<LocalValue>),
    /// A `Map`, whose keys may themselves be arbitrary values.
    Map(Vec<(MapKey, LocalValue)>),
    /// A plain `Object`.
    Object(Vec<(MapKey, LocalValue)>),
    /// A reference to an existing remote object, by handle.
    Remote(String),
}

/// A `Map`/`Object` key, which may be a plain string or any nested value.
#[derive(Debug, Clone, PartialEq)]
pub enum MapKey {
    /// A plain string key.
    StringKey(String),
    /// A non-string key, itself a [`LocalValue`].
    ValueKey(Box<LocalValue>),
}

/// A JSON number, including the four special values BiDi represents as
/// string literals since they have no JSON encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    /// An ordinary finite number.
    Finite(f64),
    /// `NaN`.
    NaN,
    /// `+Infinity`.
    Infinity,
    /// `-Infinity`.
    NegInfinity,
    /// `-0`.
    NegZero,
}

impl LocalValue {
    /// Parse a `LocalValue` out of its BiDi JSON wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`BidiError::InvalidArgument`] if `value` is not a
    /// recognized `LocalValue` shape.
    pub fn from_json(value: &Value) -> Result<Self, BidiError> {
        if let Some(handle) = value.get("handle").and_then(Value::as_str) {
            return Ok(Self::Remote(handle.to_string()));
        }

        let Some(type_tag) = value.get("type").and_then(Value::as_str) else {
            return Err(BidiError::InvalidArgument(
                "local value is missing \"type\"".to_string(),
            ));
        };

        let inner = value.get("value");

        match type_tag {
            "undefined" => Ok(Self::Undefined),
            "null" => Ok(Self::Null),
            "string" => Ok(Self::String(Self::expect_str(inner)?)),
            "boolean" => Ok(Self::Boolean(
                inner
                    .and_then(Value::as_bool)
                    .ok_or_else(|| invalid("boolean value must be a bool"))?,
            )),
            "bigint" => Ok(Self::BigInt(Self::expect_str(inner)?)),
            "date" => Ok(Self::Date(Self::expect_str(inner)?)),
            "number" => Ok(Self::Number(parse_number_literal(inner)?)),
            "regexp" => {
                let obj = inner
                    .and_then(Value::as_object)
                    .ok_or_else(|| invalid("regexp value must be an object"))?;
                let pattern = obj
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("regexp is missing \"pattern\""))?
                    .to_string();
                let flags = obj
                    .get("flags")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::Regexp { pattern, flags })
            }
            "array" => Ok(Self::Array(Self::parse_list(inner)?)),
            "set" => Ok(Self::Set(Self::parse_list(inner)?)),
            "map" => Ok(Self::Map(Self::parse_entries(inner)?)),
            "object" => Ok(Self::Object(Self::parse_entries(inner)?)),
            other => Err(invalid(&format!("unrecognized local value type: {other}"))),
        }
    }

    fn expect_str(value: Option<&Value>) -> Result<String, BidiError> {
        value
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| invalid("expected a string value"))
    }

    fn parse_list(value: Option<&Value>) -> Result<Vec<LocalValue>, BidiError> {
        value
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("expected an array value"))?
            .iter()
            .map(LocalValue::from_json)
            .collect()
    }

    fn parse_entries(value: Option<&Value>) -> Result<Vec<(MapKey, LocalValue)>, BidiError> {
        value
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("expected an entries array"))?
            .iter()
            .map(|entry| {
                let pair = entry
                    .as_array()
                    .ok_or_else(|| invalid("expected a [key, value] pair"))?;
                let [key, val] = pair.as_slice() else {
                    return Err(invalid("expected a 2-element [key, value] pair"));
                };
                let key = match key.as_str() {
                    Some(s) => MapKey::StringKey(s.to_string()),
                    None => MapKey::ValueKey(Box::new(LocalValue::from_json(key)?)),
                };
                Ok((key, LocalValue::from_json(val)?))
            })
            .collect()
    }

    /// Whether deserializing this value requires a CDP round-trip to
    /// materialize a container object, rather than a plain
    /// [`CallArgument`].
    #[must_use]
    pub fn needs_materialization(&self) -> bool {
        matches!(
            self,
            Self::Array(_) | Self::Set(_) | Self::Map(_) | Self::Object(_)
        )
    }
}

fn invalid(msg: &str) -> BidiError {
    BidiError::InvalidArgument(msg.to_string())
}

fn parse_number_literal(value: Option<&Value>) -> Result<NumberValue, BidiError> {
    match value {
        Some(Value::Number(n)) => Ok(NumberValue::Finite(
            n.as_f64().ok_or_else(|| invalid("number out of range"))?,
        )),
        Some(Value::String(s)) => match s.as_str() {
            "NaN" => Ok(NumberValue::NaN),
            "Infinity" | "+Infinity" => Ok(NumberValue::Infinity),
            "-Infinity" => Ok(NumberValue::NegInfinity),
            "-0" => Ok(NumberValue::NegZero),
            other => Err(invalid(&format!("unrecognized number literal: {other}"))),
        },
        _ => Err(invalid("expected a number or special number literal")),
    }
}

/// Deserialize a [`LocalValue`] into a CDP [`CallArgument`].
///
/// Primitives and unserializable literals map directly. Handles map to
/// `objectId`, after checking the handle belongs to `realm_id` via
/// `registry`. Containers (array/set/map/object) require a CDP round-trip
/// and are materialized by [`materialize_container`] instead — calling
/// this function with one panics in debug builds via the `unreachable`
/// arm's `debug_assert`, since callers are expected to route those through
/// `materialize_container` first.
///
/// # Errors
///
/// Returns [`BidiError::InvalidArgument`] if a handle does not resolve to
/// `realm_id`, or if called with a container value.
pub async fn deserialize_local_value(
    value: &LocalValue,
    realm_id: &str,
    registry: &HandleRegistry,
) -> Result<CallArgument, BidiError> {
    match value {
        LocalValue::Undefined => Ok(unserializable("undefined")),
        LocalValue::Null => Ok(CallArgument {
            value: Some(Value::Null),
            unserializable_value: None,
            object_id: None,
        }),
        LocalValue::String(s) => Ok(CallArgument {
            value: Some(Value::String(s.clone())),
            unserializable_value: None,
            object_id: None,
        }),
        LocalValue::Boolean(b) => Ok(CallArgument {
            value: Some(Value::Bool(*b)),
            unserializable_value: None,
            object_id: None,
        }),
        LocalValue::Number(n) => Ok(number_argument(*n)),
        LocalValue::BigInt(s) => Ok(unserializable(&format!("BigInt(\"{s}\")"))),
        LocalValue::Date(s) => Ok(unserializable(&format!(
            "new Date(Date.parse({}))",
            json!(s)
        ))),
        LocalValue::Regexp { pattern, flags } => Ok(unserializable(&format!(
            "new RegExp({}, {})",
            json!(pattern),
            json!(flags)
        ))),
        LocalValue::Remote(handle) => {
            let owner = registry.realm_of(handle).await;
            if owner.as_deref() != Some(realm_id) {
                return Err(invalid("Handle was not found."));
            }
            Ok(CallArgument {
                value: None,
                unserializable_value: None,
                object_id: Some(handle.clone()),
            })
        }
        LocalValue::Array(_) | LocalValue::Set(_) | LocalValue::Map(_) | LocalValue::Object(_) => {
            Err(invalid(
                "container values must be materialized via materialize_container",
            ))
        }
    }
}

fn unserializable(token: &str) -> CallArgument {
    CallArgument {
        value: None,
        unserializable_value: Some(token.to_string()),
        object_id: None,
    }
}

fn number_argument(n: NumberValue) -> CallArgument {
    match n {
        NumberValue::Finite(f) => CallArgument {
            value: serde_json::Number::from_f64(f).map(Value::Number),
            unserializable_value: None,
            object_id: None,
        },
        NumberValue::NaN => unserializable("NaN"),
        NumberValue::Infinity => unserializable("Infinity"),
        NumberValue::NegInfinity => unserializable("-Infinity"),
        NumberValue::NegZero => unserializable("-0"),
    }
}

/// Materialize a container [`LocalValue`] (array/set/map/object) into a CDP
/// object by invoking a small reconstructing function in the target
/// execution context.
///
/// `realm_id` is used only to check ownership of any nested handles;
/// `execution_context_id` is the CDP execution context the function runs
/// in, which is what actually determines where the object is created.
///
/// # Errors
///
/// Returns whatever `connection.send_command` returns wrapped as
/// [`BidiError::Cdp`], or [`BidiError::InvalidArgument`] if a nested
/// handle does not belong to `realm_id`.
pub async fn materialize_container(
    connection: &CdpConnection,
    session_id: &str,
    realm_id: &str,
    execution_context_id: bidimap_cdp::protocol::runtime::ExecutionContextId,
    registry: &HandleRegistry,
    value: &LocalValue,
) -> Result<CallArgument, BidiError> {
    let (declaration, flat_args) = match value {
        LocalValue::Array(items) => (
            "function(...items) { return items; }".to_string(),
            Box::pin(materialize_list(connection, session_id, realm_id, execution_context_id, registry, items)).await?,
        ),
        LocalValue::Set(items) => (
            "function(...items) { return new Set(items); }".to_string(),
            Box::pin(materialize_list(connection, session_id, realm_id, execution_context_id, registry, items)).await?,
        ),
        LocalValue::Map(entries) => (
            "function(...flat) { const m = new Map(); for (let i = 0; i < flat.length; i += 2) { m.set(flat[i], flat[i + 1]); } return m; }".to_string(),
            Box::pin(materialize_entries(connection, session_id, realm_id, execution_context_id, registry, entries)).await?,
        ),
        LocalValue::Object(entries) => (
            "function(...flat) { const o = {}; for (let i = 0; i < flat.length; i += 2) { o[flat[i]] = flat[i + 1]; } return o; }".to_string(),
            Box::pin(materialize_entries(connection, session_id, realm_id, execution_context_id, registry, entries)).await?,
        ),
        _ => {
            return Err(invalid(
                "materialize_container called with a non-container value",
            ));
        }
    };

    let result: bidimap_cdp::protocol::runtime::CallFunctionOnResult = connection
        .send_command(
            "Runtime.callFunctionOn",
            Some(CallFunctionOnParams {
                function_declaration: declaration,
                object_id: None,
                arguments: Some(flat_args),
                silent: Some(true),
                return_by_value: Some(false),
                generate_preview: Some(false),
                user_gesture: None,
                await_promise: Some(false),
                execution_context_id: Some(execution_context_id),
                object_group: None,
                throw_on_side_effect: None,
                unique_context_id: None,
                serialization_options: None,
            }),
            Some(session_id),
        )
        .await?;

    Ok(CallArgument {
        value: None,
        unserializable_value: None,
        object_id: result.result.object_id,
    })
}

async fn materialize_list(
    connection: &CdpConnection,
    session_id: &str,
    realm_id: &str,
    execution_context_id: bidimap_cdp::protocol::runtime::ExecutionContextId,
    registry: &HandleRegistry,
    items: &[LocalValue],
) -> Result<Vec<CallArgument>, BidiError> {
    let mut args = Vec::with_capacity(items.len());
    for item in items {
        args.push(if item.needs_materialization() {
            Box::pin(materialize_container(connection, session_id, realm_id, execution_context_id, registry, item)).await?
        } else {
            deserialize_local_value(item, realm_id, registry).await?
        });
    }
    Ok(args)
}

async fn materialize_entries(
    connection: &CdpConnection,
    session_id: &str,
    realm_id: &str,
    execution_context_id: bidimap_cdp::protocol::runtime::ExecutionContextId,
    registry: &HandleRegistry,
    entries: &[(MapKey, LocalValue)],
) -> Result<Vec<CallArgument>, BidiError> {
    let mut args = Vec::with_capacity(entries.len() * 2);
    for (key, val) in entries {
        let key_value = match key {
            MapKey::StringKey(s) => LocalValue::String(s.clone()),
            MapKey::ValueKey(v) => (**v).clone(),
        };
        args.push(if key_value.needs_materialization() {
            Box::pin(materialize_container(connection, session_id, realm_id, execution_context_id, registry, &key_value)).await?
        } else {
            deserialize_local_value(&key_value, realm_id, registry).await?
        });
        args.push(if val.needs_materialization() {
            Box::pin(materialize_container(connection, session_id, realm_id, execution_context_id, registry, val)).await?
        } else {
            deserialize_local_value(val, realm_id, registry).await?
        });
    }
    Ok(args)
}

/// Ownership policy requested by the caller for a script evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOwnership {
    /// Release the CDP object once serialized; no handle is issued.
    None,
    /// Retain the CDP object and expose a handle.
    Root,
}

/// Serialize a CDP [`RemoteObject`] into its BiDi `RemoteValue` JSON
/// representation (§4.2.2).
///
/// Primitives, `unserializableValue` literals, and `regexp` are synthesized
/// locally (the "fast path"). Containers (`array`/`object`/`map`/`set`)
/// have no local preview deep enough to reconstruct typed entries, so this
/// falls through to the "primary path": a one-shot `Runtime.callFunctionOn`
/// in the object's own execution context that asks the runtime itself to
/// tag each entry's JS type, side-stepping the ambiguity a bare
/// `returnByValue` JSON round-trip would introduce (a JSON string can't
/// tell you whether the original was a JS string or something coerced to
/// one). Entries are resolved to depth 1, matching the preview bound of a
/// real DevTools object preview; anything nested deeper is a best-effort
/// `type`-only placeholder.
///
/// When `ownership` is [`ResultOwnership::Root`] and the object carries a
/// CDP `objectId`, the handle is registered against `realm_id` and included
/// in the result; otherwise the underlying object is released immediately.
pub async fn serialize_remote_object(
    obj: &RemoteObject,
    realm_id: &str,
    ownership: ResultOwnership,
    connection: &CdpConnection,
    registry: &HandleRegistry,
    session_id: &str,
    execution_context_id: bidimap_cdp::protocol::runtime::ExecutionContextId,
) -> Value {
    let mut value = match (obj.object_type.as_str(), obj.subtype.as_deref()) {
        ("undefined", _) => json!({"type": "undefined"}),
        (_, Some("null")) => json!({"type": "null"}),
        ("string", _) => json!({"type": "string", "value": obj.value.clone().unwrap_or(Value::Null)}),
        ("boolean", _) => json!({"type": "boolean", "value": obj.value.clone().unwrap_or(Value::Null)}),
        ("number", _) => match obj.unserializable_value.as_deref() {
            Some(token) => special_number_value(token),
            None => json!({"type": "number", "value": obj.value.clone().unwrap_or(Value::Null)}),
        },
        ("bigint", _) => json!({
            "type": "bigint",
            "value": obj
                .unserializable_value
                .as_deref()
                .unwrap_or_default()
                .trim_end_matches('n')
                .to_string(),
        }),
        (_, Some("regexp")) => regexp_remote_value(obj.description.as_deref()),
        (_, Some("array")) if obj.object_id.is_some() => {
            json!({
                "type": "array",
                "value": serialize_array_entries(obj.object_id.as_deref().unwrap(), connection, session_id, execution_context_id).await,
            })
        }
        (_, Some("map")) if obj.object_id.is_some() => {
            json!({
                "type": "map",
                "value": serialize_map_entries(obj.object_id.as_deref().unwrap(), connection, session_id, execution_context_id).await,
            })
        }
        (_, Some("set")) if obj.object_id.is_some() => {
            json!({
                "type": "set",
                "value": serialize_array_entries(obj.object_id.as_deref().unwrap(), connection, session_id, execution_context_id).await,
            })
        }
        ("function", _) => json!({"type": "function"}),
        ("object", _) if obj.object_id.is_some() => {
            json!({
                "type": "object",
                "value": serialize_object_entries(obj.object_id.as_deref().unwrap(), connection, session_id, execution_context_id).await,
            })
        }
        ("object", _) => json!({"type": "object", "value": []}),
        _ => json!({"type": "string", "value": obj.description.clone().unwrap_or_default()}),
    };

    if ownership == ResultOwnership::Root {
        if let Some(object_id) = &obj.object_id {
            registry.register(object_id.clone(), realm_id.to_string()).await;
            if let Value::Object(ref mut map) = value {
                map.insert("handle".to_string(), Value::String(object_id.clone()));
            }
        }
    } else if let Some(object_id) = &obj.object_id {
        let _ = connection
            .send_command::<_, Value>(
                "Runtime.releaseObject",
                Some(json!({ "objectId": object_id })),
                Some(session_id),
            )
            .await;
    }

    value
}

fn special_number_value(token: &str) -> Value {
    match token {
        "NaN" => json!({"type": "number", "value": "NaN"}),
        "Infinity" => json!({"type": "number", "value": "Infinity"}),
        "-Infinity" => json!({"type": "number", "value": "-Infinity"}),
        "-0" => json!({"type": "number", "value": "-0"}),
        _ => json!({"type": "number", "value": 0}),
    }
}

/// Recover `{pattern, flags}` from a `RegExp`'s CDP `description`, which CDP
/// renders as the literal `/pattern/flags` source.
fn regexp_remote_value(description: Option<&str>) -> Value {
    let Some(desc) = description else {
        return json!({"type": "regexp", "value": {"pattern": "", "flags": ""}});
    };
    let (pattern, flags) = match (desc.strip_prefix('/'), desc.rfind('/')) {
        (Some(rest), Some(last)) if last > 0 => (&rest[..last - 1], &desc[last + 1..]),
        _ => (desc.as_ref(), ""),
    };
    json!({"type": "regexp", "value": {"pattern": pattern, "flags": flags}})
}

/// One JS-runtime-tagged leaf value, as returned by the reconstructing
/// function bodies in [`serialize_array_entries`]/[`serialize_object_entries`]/
/// [`serialize_map_entries`]: `[typeTag, jsonValue]`.
fn tagged_to_value(tag: &str, raw: &Value) -> Value {
    match tag {
        "undefined" => json!({"type": "undefined"}),
        "null" => json!({"type": "null"}),
        "nan" => json!({"type": "number", "value": "NaN"}),
        "inf" => json!({"type": "number", "value": "Infinity"}),
        "neginf" => json!({"type": "number", "value": "-Infinity"}),
        "negzero" => json!({"type": "number", "value": "-0"}),
        "number" => json!({"type": "number", "value": raw.clone()}),
        "string" => json!({"type": "string", "value": raw.clone()}),
        "boolean" => json!({"type": "boolean", "value": raw.clone()}),
        "bigint" => json!({"type": "bigint", "value": raw.as_str().unwrap_or_default()}),
        // Nested containers beyond depth 1: a type-only placeholder, matching
        // a real DevTools object preview's own depth bound.
        "array" => json!({"type": "array", "value": []}),
        "object" => json!({"type": "object", "value": []}),
        _ => json!({"type": "string", "value": raw.to_string()}),
    }
}

/// JS helper, prepended to every reconstructing function body, that maps a
/// JS value to `[typeTag, jsonSafeValue]`.
const TAG_HELPER: &str = "function __bidiTag(v){\
  if (v === undefined) return ['undefined', null];\
  if (v === null) return ['null', null];\
  const t = typeof v;\
  if (t === 'number') {\
    if (Number.isNaN(v)) return ['nan', null];\
    if (v === Infinity) return ['inf', null];\
    if (v === -Infinity) return ['neginf', null];\
    if (Object.is(v, -0)) return ['negzero', null];\
    return ['number', v];\
  }\
  if (t === 'bigint') return ['bigint', v.toString()];\
  if (t === 'string') return ['string', v];\
  if (t === 'boolean') return ['boolean', v];\
  if (Array.isArray(v)) return ['array', null];\
  if (t === 'object') return ['object', null];\
  return ['string', String(v)];\
}";

async fn call_reconstructor(
    object_id: &str,
    function_body: &str,
    connection: &CdpConnection,
    session_id: &str,
    execution_context_id: bidimap_cdp::protocol::runtime::ExecutionContextId,
) -> Option<Value> {
    let result: bidimap_cdp::protocol::runtime::CallFunctionOnResult = connection
        .send_command(
            "Runtime.callFunctionOn",
            Some(CallFunctionOnParams {
                function_declaration: format!("{TAG_HELPER}\n{function_body}"),
                object_id: Some(object_id.to_string()),
                arguments: None,
                silent: Some(true),
                return_by_value: Some(true),
                generate_preview: Some(false),
                user_gesture: None,
                await_promise: Some(false),
                execution_context_id: Some(execution_context_id),
                object_group: None,
                throw_on_side_effect: Some(true),
                unique_context_id: None,
                serialization_options: None,
            }),
            Some(session_id),
        )
        .await
        .ok()?;
    if result.exception_details.is_some() {
        return None;
    }
    result.result.value
}

async fn serialize_array_entries(
    object_id: &str,
    connection: &CdpConnection,
    session_id: &str,
    execution_context_id: bidimap_cdp::protocol::runtime::ExecutionContextId,
) -> Vec<Value> {
    let raw = call_reconstructor(
        object_id,
        "function(){ return Array.from(this, v => __bidiTag(v)); }",
        connection,
        session_id,
        execution_context_id,
    )
    .await;
    let Some(Value::Array(items)) = raw else { return Vec::new() };
    items
        .into_iter()
        .map(|entry| {
            let Value::Array(pair) = entry else { return json!({"type": "string", "value": ""}) };
            let tag = pair.first().and_then(Value::as_str).unwrap_or("string");
            let raw = pair.get(1).cloned().unwrap_or(Value::Null);
            tagged_to_value(tag, &raw)
        })
        .collect()
}

async fn serialize_object_entries(
    object_id: &str,
    connection: &CdpConnection,
    session_id: &str,
    execution_context_id: bidimap_cdp::protocol::runtime::ExecutionContextId,
) -> Vec<Value> {
    let raw = call_reconstructor(
        object_id,
        "function(){ return Object.entries(this).map(([k,v]) => [k, __bidiTag(v)]); }",
        connection,
        session_id,
        execution_context_id,
    )
    .await;
    let Some(Value::Array(items)) = raw else { return Vec::new() };
    items
        .into_iter()
        .map(|entry| {
            let Value::Array(pair) = entry else {
                return Value::Array(vec![Value::String(String::new()), json!({"type": "string", "value": ""})]);
            };
            let key = pair.first().and_then(Value::as_str).unwrap_or_default().to_string();
            let Some(Value::Array(tagged)) = pair.get(1) else {
                return Value::Array(vec![Value::String(key), json!({"type": "string", "value": ""})]);
            };
            let tag = tagged.first().and_then(Value::as_str).unwrap_or("string");
            let raw = tagged.get(1).cloned().unwrap_or(Value::Null);
            Value::Array(vec![Value::String(key), tagged_to_value(tag, &raw)])
        })
        .collect()
}

async fn serialize_map_entries(
    object_id: &str,
    connection: &CdpConnection,
    session_id: &str,
    execution_context_id: bidimap_cdp::protocol::runtime::ExecutionContextId,
) -> Vec<Value> {
    let raw = call_reconstructor(
        object_id,
        "function(){ return Array.from(this.entries()).map(([k,v]) => [__bidiTag(k), __bidiTag(v)]); }",
        connection,
        session_id,
        execution_context_id,
    )
    .await;
    let Some(Value::Array(items)) = raw else { return Vec::new() };
    items
        .into_iter()
        .map(|entry| {
            let Value::Array(pair) = entry else {
                return Value::Array(vec![json!({"type": "string", "value": ""}), json!({"type": "string", "value": ""})]);
            };
            let key_value = pair.first().and_then(|k| k.as_array()).map_or(json!({"type": "string", "value": ""}), |tagged| {
                let tag = tagged.first().and_then(Value::as_str).unwrap_or("string");
                let raw = tagged.get(1).cloned().unwrap_or(Value::Null);
                tagged_to_value(tag, &raw)
            });
            let val_value = pair.get(1).and_then(|v| v.as_array()).map_or(json!({"type": "string", "value": ""}), |tagged| {
                let tag = tagged.first().and_then(Value::as_str).unwrap_or("string");
                let raw = tagged.get(1).cloned().unwrap_or(Value::Null);
                tagged_to_value(tag, &raw)
            });
            Value::Array(vec![key_value, val_value])
        })
        .collect()
}

/// Registry mapping live CDP object ids (handles) to the realm that owns
/// them.
#[derive(Default)]
pub struct HandleRegistry {
    owners: RwLock<HashMap<String, RealmId>>,
}

impl HandleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `handle` belongs to `realm_id`.
    pub async fn register(&self, handle: String, realm_id: RealmId) {
        self.owners.write().await.insert(handle, realm_id);
    }

    /// The realm a handle belongs to, if it is live.
    pub async fn realm_of(&self, handle: &str) -> Option<RealmId> {
        self.owners.read().await.get(handle).cloned()
    }

    /// Forget a handle (on `script.disown` or realm destruction).
    ///
    /// Disowning an unknown handle is a no-op, per the BiDi contract that
    /// it never fails.
    pub async fn release(&self, handle: &str) {
        self.owners.write().await.remove(handle);
    }

    /// Drop every handle owned by `realm_id` (called when the realm dies).
    pub async fn release_realm(&self, realm_id: &str) {
        self.owners.write().await.retain(|_, owner| owner != realm_id);
    }
}
