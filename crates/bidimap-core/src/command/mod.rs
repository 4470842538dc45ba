//! Command surface: the recognized BiDi method table and the typed
//! parameter structs each method parses its `params` object into.

use serde::Deserialize;
use serde_json::Value;

use crate::error::BidiError;
use crate::value::ResultOwnership as ValueResultOwnership;

#[cfg(test)]
mod tests;

/// Every BiDi method this mapper recognizes, grouped by module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    SessionStatus,
    SessionSubscribe,
    SessionUnsubscribe,
    BrowsingContextGetTree,
    BrowsingContextCreate,
    BrowsingContextClose,
    BrowsingContextNavigate,
    BrowsingContextReload,
    BrowsingContextActivate,
    BrowsingContextCaptureScreenshot,
    BrowsingContextPrint,
    BrowsingContextSetViewport,
    BrowsingContextHandleUserPrompt,
    ScriptEvaluate,
    ScriptCallFunction,
    ScriptDisown,
    ScriptGetRealms,
    ScriptAddPreloadScript,
    ScriptRemovePreloadScript,
    CdpSendCommand,
    CdpGetSession,
}

impl Method {
    /// Resolve a dotted BiDi method name to its recognized [`Method`].
    ///
    /// # Errors
    ///
    /// Returns [`BidiError::UnknownCommand`] if `method` is not in the
    /// recognized set (§6).
    pub fn parse(method: &str) -> Result<Self, BidiError> {
        Ok(match method {
            "session.status" => Self::SessionStatus,
            "session.subscribe" => Self::SessionSubscribe,
            "session.unsubscribe" => Self::SessionUnsubscribe,
            "browsingContext.getTree" => Self::BrowsingContextGetTree,
            "browsingContext.create" => Self::BrowsingContextCreate,
            "browsingContext.close" => Self::BrowsingContextClose,
            "browsingContext.navigate" => Self::BrowsingContextNavigate,
            "browsingContext.reload" => Self::BrowsingContextReload,
            "browsingContext.activate" => Self::BrowsingContextActivate,
            "browsingContext.captureScreenshot" => Self::BrowsingContextCaptureScreenshot,
            "browsingContext.print" => Self::BrowsingContextPrint,
            "browsingContext.setViewport" => Self::BrowsingContextSetViewport,
            "browsingContext.handleUserPrompt" => Self::BrowsingContextHandleUserPrompt,
            "script.evaluate" => Self::ScriptEvaluate,
            "script.callFunction" => Self::ScriptCallFunction,
            "script.disown" => Self::ScriptDisown,
            "script.getRealms" => Self::ScriptGetRealms,
            "script.addPreloadScript" => Self::ScriptAddPreloadScript,
            "script.removePreloadScript" => Self::ScriptRemovePreloadScript,
            "cdp.sendCommand" => Self::CdpSendCommand,
            "cdp.getSession" => Self::CdpGetSession,
            other => {
                return Err(BidiError::UnknownCommand(format!(
                    "unknown command: {other}"
                )));
            }
        })
    }
}

/// Parse a command's `params` object into a typed parameter struct.
///
/// # Errors
///
/// Returns [`BidiError::InvalidArgument`] if `params` does not match `T`'s
/// shape, including a missing required field (e.g. `awaitPromise`, which
/// is never defaulted, per the resolved open question in §9).
pub fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, BidiError> {
    serde_json::from_value(params)
        .map_err(|e| BidiError::InvalidArgument(format!("invalid command parameters: {e}")))
}

/// Parameters for `session.subscribe` / `session.unsubscribe`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionParams {
    pub events: Vec<String>,
    #[serde(default)]
    pub contexts: Vec<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

/// The type of top-level browsing context `browsingContext.create` opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateType {
    Tab,
    Window,
}

/// Parameters for `browsingContext.create`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    #[serde(rename = "type")]
    pub create_type: CreateType,
    #[serde(default)]
    pub reference_context: Option<String>,
}

/// Parameters for `browsingContext.getTree`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTreeParams {
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

/// The `wait` condition on `navigate`/`reload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    None,
    Interactive,
    #[default]
    Complete,
}

/// Parameters for `browsingContext.navigate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    pub context: String,
    pub url: String,
    #[serde(default)]
    pub wait: WaitCondition,
}

/// Parameters for `browsingContext.reload`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadParams {
    pub context: String,
    #[serde(default)]
    pub ignore_cache: bool,
    #[serde(default)]
    pub wait: WaitCondition,
}

/// Parameters for operations that take only a `context`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOnlyParams {
    pub context: String,
}

/// Parameters for `browsingContext.captureScreenshot`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureScreenshotParams {
    pub context: String,
}

/// Parameters for `browsingContext.print`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintParams {
    pub context: String,
    #[serde(default)]
    pub background: Option<bool>,
    #[serde(default)]
    pub landscape: Option<bool>,
}

/// A `{width, height}` viewport override.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ViewportDimensions {
    pub width: u32,
    pub height: u32,
}

/// Parameters for `browsingContext.setViewport`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetViewportParams {
    pub context: String,
    #[serde(default)]
    pub viewport: Option<ViewportDimensions>,
    #[serde(default)]
    pub device_pixel_ratio: Option<f64>,
}

/// Parameters for `browsingContext.handleUserPrompt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleUserPromptParams {
    pub context: String,
    #[serde(default)]
    pub accept: Option<bool>,
    #[serde(default)]
    pub user_text: Option<String>,
}

/// The realm/context a script operation targets.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptTarget {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub sandbox: Option<String>,
}

/// The ownership policy requested for a script result, as parsed from
/// wire params; converts into [`crate::value::ResultOwnership`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOwnership {
    #[default]
    None,
    Root,
}

impl From<ResultOwnership> for ValueResultOwnership {
    fn from(value: ResultOwnership) -> Self {
        match value {
            ResultOwnership::None => ValueResultOwnership::None,
            ResultOwnership::Root => ValueResultOwnership::Root,
        }
    }
}

/// Parameters for `script.evaluate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptEvaluateParams {
    pub expression: String,
    pub target: ScriptTarget,
    /// Required: absence is rejected rather than defaulted (§9).
    pub await_promise: bool,
    #[serde(default)]
    pub result_ownership: ResultOwnership,
}

/// Parameters for `script.callFunction`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionParams {
    pub function_declaration: String,
    #[serde(default)]
    pub this: Option<Value>,
    #[serde(default)]
    pub arguments: Vec<Value>,
    pub target: ScriptTarget,
    /// Required: absence is rejected rather than defaulted (§9).
    pub await_promise: bool,
    #[serde(default)]
    pub result_ownership: ResultOwnership,
}

/// Parameters for `script.disown`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisownParams {
    pub handles: Vec<String>,
    pub target: ScriptTarget,
}

/// Parameters for `script.getRealms`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRealmsParams {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(rename = "type", default)]
    pub realm_type: Option<String>,
}

/// Parameters for `script.addPreloadScript`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPreloadScriptParams {
    pub function_declaration: String,
    #[serde(default)]
    pub contexts: Option<Vec<String>>,
    #[serde(default)]
    pub sandbox: Option<String>,
}

/// Parameters for `script.removePreloadScript`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovePreloadScriptParams {
    pub script: String,
}

/// Parameters for `cdp.sendCommand`, the raw CDP escape hatch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpSendCommandParams {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub session: Option<String>,
}

/// Parameters for `cdp.getSession`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpGetSessionParams {
    pub context: String,
}
