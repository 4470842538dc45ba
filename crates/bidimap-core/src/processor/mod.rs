//! Browsing-context processor: the per-session orchestrator that turns CDP
//! target/frame/lifecycle events into the browsing-context forest, and BiDi
//! `browsingContext.*`/`script.*` commands into CDP calls against it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bidimap_cdp::CdpConnection;
use bidimap_cdp::protocol::emulation::{ClearDeviceMetricsOverrideParams, SetDeviceMetricsOverrideParams};
use bidimap_cdp::protocol::page::{
    BringToFrontParams, CaptureScreenshotParams as CdpCaptureScreenshotParams, CaptureScreenshotResult,
    NavigateParams as CdpNavigateParams, NavigateResult as CdpNavigateResult, PrintToPdfParams as CdpPrintToPdfParams,
    PrintToPdfResult, ReloadParams as CdpReloadParams,
};
use bidimap_cdp::protocol::HandleJavaScriptDialogParams;
use bidimap_cdp::protocol::page::FrameDetachedReason;
use bidimap_cdp::protocol::runtime::{CallFunctionOnParams, EvaluateParams, EvaluateResult, ExecutionContextId};
use bidimap_cdp::protocol::target_domain::{CloseTargetParams, CreateTargetParams, TargetInfo};
use serde_json::{Value, json};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::browsing_context::{BrowsingContext, BrowsingContextStore, ContextId};
use crate::command::{CreateType, ResultOwnership, ScriptTarget, WaitCondition};
use crate::error::BidiError;
use crate::events::EventManager;
use crate::preload::PreloadScriptStore;
use crate::realm::{RealmRegistry, RealmType};
use crate::target::CdpTargetAdapter;
use crate::value::{
    HandleRegistry, LocalValue, deserialize_local_value, materialize_container, serialize_remote_object,
};

/// All the shared mapper state a [`BrowsingContextProcessor`] operates over.
pub struct BrowsingContextProcessor {
    connection: Arc<CdpConnection>,
    contexts: Arc<BrowsingContextStore>,
    realms: Arc<RealmRegistry>,
    handles: Arc<HandleRegistry>,
    preload_scripts: Arc<PreloadScriptStore>,
    events: Arc<EventManager>,
    /// One adapter per attached CDP session, keyed by session id.
    adapters: RwLock<HashMap<String, Arc<CdpTargetAdapter>>>,
    /// The mapper's own tab, excluded from the browsing-context forest.
    self_target_id: String,
    /// Outgoing BiDi event envelopes, drained by the session's write loop.
    outgoing: mpsc::UnboundedSender<Value>,
    /// Timeout applied to every outgoing CDP round-trip (§10.3); does not
    /// bound BiDi-level deferred waits.
    cdp_command_timeout: Duration,
}

impl BrowsingContextProcessor {
    /// Construct a processor wired to already-shared stores and the
    /// session's outgoing event channel.
    #[must_use]
    pub fn new(
        connection: Arc<CdpConnection>,
        contexts: Arc<BrowsingContextStore>,
        realms: Arc<RealmRegistry>,
        handles: Arc<HandleRegistry>,
        preload_scripts: Arc<PreloadScriptStore>,
        events: Arc<EventManager>,
        self_target_id: String,
        outgoing: mpsc::UnboundedSender<Value>,
        cdp_command_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            contexts,
            realms,
            handles,
            preload_scripts,
            events,
            adapters: RwLock::new(HashMap::new()),
            self_target_id,
            outgoing,
            cdp_command_timeout,
        }
    }

    async fn emit(&self, method: &str, context: Option<&str>, params: Value) {
        for envelope in self.events.register_event(method, context, params).await {
            let _ = self.outgoing.send(envelope);
        }
    }

    /// Send a CDP command with [`Self::cdp_command_timeout`] rather than
    /// `bidimap-cdp`'s own default.
    async fn send_command_timed<P, R>(&self, method: &str, params: Option<P>, session: Option<&str>) -> Result<R, bidimap_cdp::CdpError>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        self.connection
            .send_command_with_timeout(method, params, session, self.cdp_command_timeout)
            .await
    }

    /// Send an already-built wire envelope (event or replayed event)
    /// straight to the outgoing channel, bypassing event-manager
    /// registration. Used by [`crate::session::MapperSession`] for replay
    /// on subscribe and for events it assembles itself (`log.entryAdded`,
    /// `cdp.eventReceived`).
    pub async fn emit_raw(&self, envelope: Value) {
        let _ = self.outgoing.send(envelope);
    }

    /// The shared browsing-context store, for callers outside this module
    /// that need to validate a context id (e.g. `session.subscribe`).
    #[must_use]
    pub fn contexts_ref(&self) -> Arc<BrowsingContextStore> {
        self.contexts.clone()
    }

    // ---------------------------------------------------------------
    // Target/frame attachment state machine
    // ---------------------------------------------------------------

    /// Handle `Target.attachedToTarget`.
    ///
    /// A `"page"`-typed target becomes a new top-level browsing context (or
    /// is reattached to one, for OOPIF re-parenting); every other target
    /// type is left unmanaged, matching headless Chrome's worker/extension
    /// targets that BiDi has no browsing-context surface for.
    pub async fn handle_target_attached(&self, session_id: String, info: TargetInfo) -> Result<(), BidiError> {
        if info.target_id == self.self_target_id {
            return Ok(());
        }
        if info.target_type != "page" {
            debug!(target = %info.target_id, kind = %info.target_type, "ignoring non-page target");
            return Ok(());
        }

        let adapter = Arc::new(CdpTargetAdapter::new(session_id.clone(), self.connection.clone()));

        let is_new = !self.contexts.has_context(&info.target_id).await;
        if is_new {
            let ctx = BrowsingContext::new(info.target_id.clone(), None, session_id.clone());
            if let Some(bc_id) = &info.browser_context_id {
                ctx.set_browser_context_id(bc_id.clone()).await;
            }
            ctx.set_url(info.url.clone()).await;
            self.contexts.add_context(ctx).await?;
        } else {
            let ctx = self.contexts.get_context(&info.target_id).await?;
            ctx.set_session_id(session_id.clone()).await;
            ctx.reset_target_unblocked().await;
        }

        adapter.run_attach_handshake().await?;
        self.reapply_global_preload_scripts(&info.target_id, &adapter).await;

        let ctx = self.contexts.get_context(&info.target_id).await?;
        ctx.unblock_target().await;
        self.adapters.write().await.insert(session_id, adapter);

        if is_new {
            self.emit(
                "browsingContext.contextCreated",
                Some(&info.target_id),
                json!({
                    "context": info.target_id,
                    "url": info.url,
                    "children": Value::Null,
                    "parent": Value::Null,
                }),
            )
            .await;
        }
        Ok(())
    }

    async fn reapply_global_preload_scripts(&self, context_id: &str, adapter: &CdpTargetAdapter) {
        for (script_id, source, sandbox) in self.preload_scripts.global_scripts().await {
            match adapter.add_preload_script(&source, sandbox.as_deref()).await {
                Ok(cdp_id) => {
                    self.preload_scripts
                        .record_binding(&script_id, context_id.to_string(), cdp_id)
                        .await;
                }
                Err(err) => warn!(%err, script = %script_id, "failed to reapply preload script"),
            }
        }
    }

    /// Handle `Target.detachedFromTarget`: tear down the corresponding
    /// top-level browsing context, if the session was one we were tracking.
    pub async fn handle_target_detached(&self, session_id: &str) {
        self.adapters.write().await.remove(session_id);
        let top_level_ids = self.contexts.top_level_context_ids().await;
        for id in top_level_ids {
            let Ok(ctx) = self.contexts.get_context(&id).await else { continue };
            if ctx.session_id().await == session_id {
                self.contexts.delete(&id).await;
                self.emit("browsingContext.contextDestroyed", Some(&id), json!({ "context": id })).await;
                return;
            }
        }
    }

    /// Handle `Page.frameAttached`: register a new nested browsing context.
    pub async fn handle_frame_attached(
        &self,
        session_id: &str,
        frame_id: String,
        parent_frame_id: String,
    ) -> Result<(), BidiError> {
        if self.contexts.has_context(&frame_id).await {
            return Ok(());
        }
        let ctx = BrowsingContext::new(frame_id.clone(), Some(parent_frame_id), session_id.to_string());
        self.contexts.add_context(ctx).await?;
        self.emit(
            "browsingContext.contextCreated",
            Some(&frame_id),
            json!({ "context": frame_id, "url": "about:blank", "children": Value::Null }),
        )
        .await;
        Ok(())
    }

    /// Handle `Page.frameDetached`: tear down the nested context and its
    /// descendants, unless the frame is merely being swapped to a new
    /// process (OOPIF re-parenting) — in that case `Target.attachedToTarget`
    /// re-binds the same context id instead, and deleting it here would
    /// race that rebind.
    pub async fn handle_frame_detached(&self, frame_id: &str, reason: Option<FrameDetachedReason>) {
        if matches!(reason, Some(FrameDetachedReason::Swap)) {
            return;
        }
        if !self.contexts.has_context(frame_id).await {
            return;
        }
        self.contexts.delete(frame_id).await;
        self.emit("browsingContext.contextDestroyed", Some(frame_id), json!({ "context": frame_id })).await;
    }

    /// Handle `Page.navigatedWithinDocument`.
    pub async fn handle_navigated_within_document(&self, frame_id: &str, url: String) -> Result<(), BidiError> {
        let ctx = self.contexts.get_context(frame_id).await?;
        ctx.same_document_navigation(url.clone()).await;
        self.emit(
            "browsingContext.fragmentNavigated",
            Some(frame_id),
            json!({ "context": frame_id, "url": url }),
        )
        .await;
        Ok(())
    }

    /// Handle `Page.frameNavigated`: record the new loader id and update the
    /// context's URL, rejecting any previous navigation's lifecycle gates.
    pub async fn handle_frame_navigated(&self, frame_id: &str, url: String, loader_id: Option<String>) -> Result<(), BidiError> {
        let ctx = self.contexts.get_context(frame_id).await?;
        ctx.set_url(url).await;
        ctx.start_navigation(loader_id).await;
        Ok(())
    }

    /// Handle `Page.lifecycleEvent`.
    pub async fn handle_lifecycle_event(&self, frame_id: &str, name: &str, loader_id: &str) -> Result<(), BidiError> {
        let ctx = self.contexts.get_context(frame_id).await?;
        ctx.record_lifecycle_event(name, loader_id).await;
        match name {
            "DOMContentLoaded" => {
                self.emit("browsingContext.domContentLoaded", Some(frame_id), json!({ "context": frame_id, "url": ctx.url().await })).await;
            }
            "load" => {
                self.emit("browsingContext.load", Some(frame_id), json!({ "context": frame_id, "url": ctx.url().await })).await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Handle `Runtime.executionContextCreated`.
    pub async fn handle_execution_context_created(
        &self,
        session_id: &str,
        execution_context_id: ExecutionContextId,
        origin: String,
        frame_id: Option<String>,
        is_default: bool,
    ) {
        let Some(frame_id) = frame_id else { return };
        if !self.contexts.has_context(&frame_id).await {
            return;
        }
        // CDP's auxData distinguishes default/isolated worlds but not
        // worker/worklet global scopes; every execution context this mapper
        // sees today backs a frame's window realm.
        let _ = is_default;
        self.realms
            .create_realm(frame_id.clone(), session_id.to_string(), execution_context_id, origin, RealmType::Window, None)
            .await;
        if let Ok(ctx) = self.contexts.get_context(&frame_id).await {
            ctx.record_lifecycle_event("init", &ctx.document_id().await.unwrap_or_default()).await;
        }
    }

    /// Handle `Runtime.executionContextDestroyed`.
    pub async fn handle_execution_context_destroyed(&self, session_id: &str, execution_context_id: ExecutionContextId) {
        if let Some(realm_id) = self.realms.remove_by_execution_context(session_id, execution_context_id).await {
            self.handles.release_realm(&realm_id).await;
        }
    }

    /// Handle `Runtime.executionContextsCleared`.
    pub async fn handle_execution_contexts_cleared(&self, session_id: &str) {
        for realm_id in self.realms.clear_session(session_id).await {
            self.handles.release_realm(&realm_id).await;
        }
    }

    /// Resolve the top-level browsing context currently attached as
    /// `session_id`, for CDP events that identify their target only by
    /// session (e.g. `Page.javascriptDialogOpening`).
    pub async fn context_for_session(&self, session_id: &str) -> Option<ContextId> {
        self.contexts.find_top_level_by_session(session_id).await
    }

    /// Handle `Page.javascriptDialogOpening`.
    pub async fn handle_dialog_opening(
        &self,
        frame_id: &str,
        dialog_type: &str,
        message: String,
        default_value: Option<String>,
    ) {
        self.emit(
            "browsingContext.userPromptOpened",
            Some(frame_id),
            json!({ "context": frame_id, "type": dialog_type, "message": message, "defaultValue": default_value }),
        )
        .await;
    }

    // ---------------------------------------------------------------
    // browsingContext.* commands
    // ---------------------------------------------------------------

    /// `browsingContext.create`.
    pub async fn create(&self, create_type: CreateType, reference_context: Option<String>) -> Result<ContextId, BidiError> {
        let browser_context_id = match reference_context {
            Some(id) => {
                let ctx = self.contexts.get_context(&id).await?;
                if !ctx.is_top_level() {
                    return Err(BidiError::InvalidArgument(format!("{id} is not a top-level context")));
                }
                ctx.browser_context_id().await
            }
            None => None,
        };

        let result: bidimap_cdp::protocol::target_domain::CreateTargetResult = self
            .send_command_timed(
                "Target.createTarget",
                Some(CreateTargetParams {
                    url: "about:blank".to_string(),
                    width: None,
                    height: None,
                    browser_context_id,
                    background: None,
                    new_window: Some(matches!(create_type, CreateType::Window)),
                }),
                None,
            )
            .await?;

        // Auto-attach fires `Target.attachedToTarget`, which drives context
        // creation and the load-gate wait below; poll for the context to
        // appear rather than attaching explicitly here, since auto-attach is
        // already enabled on the browser-level session.
        for _ in 0..200 {
            if self.contexts.has_context(&result.target_id).await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        let ctx = self.contexts.get_context(&result.target_id).await?;
        let (_, _, load, _, _) = ctx.lifecycle().await;
        let _ = load.wait().await;
        Ok(result.target_id)
    }

    /// `browsingContext.getTree`.
    pub async fn get_tree(&self, root: Option<&str>, max_depth: Option<usize>) -> Result<Value, BidiError> {
        self.contexts.get_tree(root, max_depth).await
    }

    /// `browsingContext.close`. Only valid for top-level contexts.
    pub async fn close(&self, context: &str) -> Result<(), BidiError> {
        let ctx = self.contexts.get_context(context).await?;
        if !ctx.is_top_level() {
            return Err(BidiError::InvalidArgument(format!("{context} is not a top-level context")));
        }
        let result = self
            .send_command_timed::<_, bidimap_cdp::protocol::target_domain::CloseTargetResult>(
                "Target.closeTarget",
                Some(CloseTargetParams { target_id: context.to_string() }),
                None,
            )
            .await;
        if let Err(bidimap_cdp::CdpError::Protocol { message, .. }) = &result {
            if message.contains("Not attached to an active page") {
                return Ok(());
            }
        }
        result?;
        Ok(())
    }

    /// `browsingContext.navigate`.
    pub async fn navigate(&self, context: &str, url: String, wait: WaitCondition) -> Result<Value, BidiError> {
        let ctx = self.contexts.get_context(context).await?;
        let session_id = ctx.session_id().await;
        let frame_id = if ctx.is_top_level() { None } else { Some(context.to_string()) };

        let result: CdpNavigateResult = self
            .send_command_timed(
                "Page.navigate",
                Some(CdpNavigateParams { url: url.clone(), referrer: None, transition_type: None, frame_id }),
                Some(&session_id),
            )
            .await?;

        if let Some(error_text) = &result.error_text {
            return Err(BidiError::Unknown(format!("navigation failed: {error_text}")));
        }

        let same_document = result.loader_id.is_none();
        ctx.start_navigation(result.loader_id.clone()).await;
        let (document_initialized, dom_content_loaded, load, navigated_within_document, _) = ctx.lifecycle().await;
        match (wait, same_document) {
            (WaitCondition::None, _) => {}
            (WaitCondition::Interactive | WaitCondition::Complete, true) => {
                let _ = navigated_within_document.wait().await;
            }
            (WaitCondition::Interactive, false) => {
                let _ = document_initialized.wait().await;
                let _ = dom_content_loaded.wait().await;
            }
            (WaitCondition::Complete, false) => {
                let _ = load.wait().await;
            }
        }

        Ok(json!({ "navigation": result.loader_id, "url": url }))
    }

    /// `browsingContext.reload`.
    pub async fn reload(&self, context: &str, ignore_cache: bool, wait: WaitCondition) -> Result<Value, BidiError> {
        let ctx = self.contexts.get_context(context).await?;
        let session_id = ctx.session_id().await;

        self.send_command_timed::<_, Value>(
            "Page.reload",
            Some(CdpReloadParams { ignore_cache: Some(ignore_cache), script_to_evaluate_on_load: None }),
            Some(&session_id),
        )
        .await?;

        let (document_initialized, dom_content_loaded, load, _, _) = ctx.lifecycle().await;
        match wait {
            WaitCondition::None => {}
            WaitCondition::Interactive => {
                let _ = document_initialized.wait().await;
                let _ = dom_content_loaded.wait().await;
            }
            WaitCondition::Complete => {
                let _ = load.wait().await;
            }
        }
        Ok(json!({ "navigation": ctx.document_id().await, "url": ctx.url().await }))
    }

    /// `browsingContext.activate`.
    pub async fn activate(&self, context: &str) -> Result<(), BidiError> {
        let ctx = self.contexts.get_context(context).await?;
        let session_id = ctx.session_id().await;
        self.send_command_timed::<_, Value>("Page.bringToFront", Some(BringToFrontParams {}), Some(&session_id))
            .await?;
        Ok(())
    }

    /// `browsingContext.captureScreenshot`.
    pub async fn capture_screenshot(&self, context: &str) -> Result<String, BidiError> {
        let ctx = self.contexts.get_context(context).await?;
        let session_id = ctx.session_id().await;
        let result: CaptureScreenshotResult = self
            .send_command_timed(
                "Page.captureScreenshot",
                Some(CdpCaptureScreenshotParams::default()),
                Some(&session_id),
            )
            .await?;
        Ok(result.data)
    }

    /// `browsingContext.print`.
    pub async fn print(&self, context: &str, background: Option<bool>, landscape: Option<bool>) -> Result<String, BidiError> {
        let ctx = self.contexts.get_context(context).await?;
        let session_id = ctx.session_id().await;
        let result: PrintToPdfResult = self
            .send_command_timed(
                "Page.printToPDF",
                Some(CdpPrintToPdfParams {
                    print_background: background,
                    landscape,
                    ..Default::default()
                }),
                Some(&session_id),
            )
            .await?;
        Ok(result.data)
    }

    /// `browsingContext.setViewport`.
    pub async fn set_viewport(
        &self,
        context: &str,
        dimensions: Option<(u32, u32)>,
        device_pixel_ratio: Option<f64>,
    ) -> Result<(), BidiError> {
        let ctx = self.contexts.get_context(context).await?;
        let session_id = ctx.session_id().await;
        match dimensions {
            Some((width, height)) => {
                self.send_command_timed::<_, Value>(
                    "Emulation.setDeviceMetricsOverride",
                    Some(SetDeviceMetricsOverrideParams {
                        width: width as i32,
                        height: height as i32,
                        device_scale_factor: device_pixel_ratio.unwrap_or(1.0),
                        mobile: false,
                        scale: None,
                        screen_width: None,
                        screen_height: None,
                        position_x: None,
                        position_y: None,
                        dont_set_visible_size: None,
                        screen_orientation: None,
                        viewport: None,
                        display_feature: None,
                        device_posture: None,
                    }),
                    Some(&session_id),
                )
                .await?;
            }
            None => {
                self.send_command_timed::<_, Value>(
                    "Emulation.clearDeviceMetricsOverride",
                    Some(ClearDeviceMetricsOverrideParams {}),
                    Some(&session_id),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// `browsingContext.handleUserPrompt`.
    pub async fn handle_user_prompt(&self, context: &str, accept: Option<bool>, user_text: Option<String>) -> Result<(), BidiError> {
        let ctx = self.contexts.get_context(context).await?;
        let session_id = ctx.session_id().await;
        self.send_command_timed::<_, Value>(
            "Page.handleJavaScriptDialog",
            Some(HandleJavaScriptDialogParams { accept: accept.unwrap_or(false), prompt_text: user_text }),
            Some(&session_id),
        )
        .await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // script.* commands
    // ---------------------------------------------------------------

    async fn resolve_realm(&self, target: &ScriptTarget) -> Result<Arc<crate::realm::Realm>, BidiError> {
        if let Some(realm_id) = &target.realm {
            return self.realms.get(realm_id).await;
        }
        let context_id = target
            .context
            .as_ref()
            .ok_or_else(|| BidiError::InvalidArgument("target must specify a context or a realm".to_string()))?;
        let ctx = self.contexts.get_context(context_id).await?;
        let unblocked = ctx.target_unblocked().await;
        unblocked
            .wait()
            .await
            .map_err(|e| BidiError::Unknown(format!("target not ready: {e}")))?;

        let realms = self.realms.realms_for_context(context_id).await;
        realms
            .into_iter()
            .find(|r| r.sandbox.as_deref() == target.sandbox.as_deref())
            .ok_or_else(|| BidiError::InvalidArgument(format!("no realm for context {context_id}")))
    }

    /// `script.evaluate`.
    pub async fn script_evaluate(
        &self,
        expression: String,
        target: &ScriptTarget,
        await_promise: bool,
        ownership: ResultOwnership,
    ) -> Result<Value, BidiError> {
        let realm = self.resolve_realm(target).await?;
        let result: EvaluateResult = self
            .send_command_timed(
                "Runtime.evaluate",
                Some(EvaluateParams {
                    expression,
                    object_group: None,
                    include_command_line_api: None,
                    silent: Some(true),
                    context_id: Some(realm.execution_context_id),
                    return_by_value: Some(false),
                    await_promise: Some(await_promise),
                }),
                Some(&realm.session_id),
            )
            .await?;

        if let Some(exception) = result.exception_details {
            let details = self.build_exception_details(&exception, &realm, ownership, 0).await;
            return Ok(json!({
                "type": "exception",
                "exceptionDetails": details,
                "realm": realm.realm_id,
            }));
        }

        let value = serialize_remote_object(&result.result, &realm.realm_id, ownership.into(), &self.connection, &self.handles, &realm.session_id, realm.execution_context_id).await;
        Ok(json!({ "type": "success", "result": value, "realm": realm.realm_id }))
    }

    /// `script.callFunction`.
    pub async fn call_function(
        &self,
        function_declaration: String,
        this: Option<Value>,
        arguments: Vec<Value>,
        target: &ScriptTarget,
        await_promise: bool,
        ownership: ResultOwnership,
    ) -> Result<Value, BidiError> {
        let realm = self.resolve_realm(target).await?;

        let this_arg = match this {
            Some(v) => {
                let local = LocalValue::from_json(&v)?;
                Some(self.to_call_argument(&local, &realm).await?)
            }
            None => None,
        };

        let mut call_args = Vec::with_capacity(arguments.len());
        for arg in &arguments {
            let local = LocalValue::from_json(arg)?;
            call_args.push(self.to_call_argument(&local, &realm).await?);
        }

        let result: bidimap_cdp::protocol::runtime::CallFunctionOnResult = self
            .send_command_timed(
                "Runtime.callFunctionOn",
                Some(CallFunctionOnParams {
                    function_declaration,
                    object_id: this_arg.and_then(|a| a.object_id),
                    arguments: Some(call_args),
                    silent: Some(true),
                    return_by_value: Some(false),
                    generate_preview: Some(false),
                    user_gesture: None,
                    await_promise: Some(await_promise),
                    execution_context_id: Some(realm.execution_context_id),
                    object_group: None,
                    throw_on_side_effect: None,
                    unique_context_id: None,
                    serialization_options: None,
                }),
                Some(&realm.session_id),
            )
            .await?;

        if let Some(exception) = result.exception_details {
            // `script.callFunction` wraps the declaration in an IIFE that adds
            // one line (§4.2.3), so the reported line number is shifted by one
            // relative to the caller's source.
            let details = self.build_exception_details(&exception, &realm, ownership, 1).await;
            return Ok(json!({
                "type": "exception",
                "exceptionDetails": details,
                "realm": realm.realm_id,
            }));
        }

        let value = serialize_remote_object(&result.result, &realm.realm_id, ownership.into(), &self.connection, &self.handles, &realm.session_id, realm.execution_context_id).await;
        Ok(json!({ "type": "success", "result": value, "realm": realm.realm_id }))
    }

    /// Build a BiDi `exceptionDetails` object from a thrown CDP
    /// `ExceptionDetails` (§4.2.3): the thrown value, a best-effort `text`
    /// (see [`Self::exception_text`]), and the call-site location, with
    /// `line_offset` subtracting the evaluation wrapper's own line when the
    /// exception came from `script.callFunction`.
    async fn build_exception_details(
        &self,
        exception: &bidimap_cdp::protocol::runtime::ExceptionDetails,
        realm: &crate::realm::Realm,
        ownership: ResultOwnership,
        line_offset: i64,
    ) -> Value {
        let text = self.exception_text(exception, &realm.session_id).await;
        let exception_value = match &exception.exception {
            Some(obj) => {
                serialize_remote_object(
                    obj,
                    &realm.realm_id,
                    ownership.into(),
                    &self.connection,
                    &self.handles,
                    &realm.session_id,
                    realm.execution_context_id,
                )
                .await
            }
            None => json!({ "type": "undefined" }),
        };
        let stack_trace = exception.stack_trace.as_ref().map_or_else(
            || json!({ "callFrames": [] }),
            |st| {
                json!({
                    "callFrames": st.call_frames.iter().map(|f| json!({
                        "functionName": f.function_name,
                        "url": f.url,
                        "lineNumber": f.line_number,
                        "columnNumber": f.column_number,
                    })).collect::<Vec<_>>(),
                })
            },
        );
        json!({
            "exception": exception_value,
            "text": text,
            "columnNumber": exception.column_number,
            "lineNumber": exception.line_number - line_offset,
            "stackTrace": stack_trace,
        })
    }

    /// §4.2.3's `text` fallback chain: the thrown object's `description`,
    /// then its stringified `value`, then a `String(obj)` call against the
    /// live object, then the raw exception-details JSON as a last resort.
    async fn exception_text(&self, exception: &bidimap_cdp::protocol::runtime::ExceptionDetails, session_id: &str) -> String {
        if let Some(obj) = &exception.exception {
            if let Some(description) = &obj.description {
                return description.clone();
            }
            if let Some(value) = &obj.value {
                return match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
            }
            if let Some(object_id) = obj.object_id.clone() {
                let call: Result<bidimap_cdp::protocol::runtime::CallFunctionOnResult, _> = self
                    .send_command_timed(
                        "Runtime.callFunctionOn",
                        Some(CallFunctionOnParams {
                            function_declaration: "function(){ return String(this); }".to_string(),
                            object_id: Some(object_id),
                            arguments: None,
                            silent: Some(true),
                            return_by_value: Some(true),
                            generate_preview: Some(false),
                            user_gesture: None,
                            await_promise: Some(false),
                            execution_context_id: None,
                            object_group: None,
                            throw_on_side_effect: None,
                            unique_context_id: None,
                            serialization_options: None,
                        }),
                        Some(session_id),
                    )
                    .await;
                if let Ok(result) = call {
                    if let Some(value) = result.result.value {
                        return match value {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                    }
                }
            }
        }
        serde_json::to_string(exception).unwrap_or_default()
    }

    async fn to_call_argument(
        &self,
        value: &LocalValue,
        realm: &crate::realm::Realm,
    ) -> Result<bidimap_cdp::protocol::runtime::CallArgument, BidiError> {
        if value.needs_materialization() {
            materialize_container(&self.connection, &realm.session_id, &realm.realm_id, realm.execution_context_id, &self.handles, value).await
        } else {
            deserialize_local_value(value, &realm.realm_id, &self.handles).await
        }
    }

    /// `script.disown`: release handles in `target`'s realm.
    pub async fn disown(&self, handles: &[String], target: &ScriptTarget) -> Result<(), BidiError> {
        let realm = self.resolve_realm(target).await?;
        for handle in handles {
            if self.handles.realm_of(handle).await.as_deref() == Some(realm.realm_id.as_str()) {
                self.handles.release(handle).await;
            }
        }
        Ok(())
    }

    /// `script.getRealms`.
    pub async fn get_realms(&self, context: Option<&str>, realm_type: Option<&str>) -> Result<Vec<Value>, BidiError> {
        let realms = match context {
            Some(id) => {
                self.contexts.get_context(id).await?;
                self.realms.realms_for_context(id).await
            }
            None => {
                let mut all = Vec::new();
                for id in self.contexts.top_level_context_ids().await {
                    all.extend(self.realms.realms_for_context(&id).await);
                }
                all
            }
        };
        Ok(realms
            .into_iter()
            .filter(|r| realm_type.is_none_or(|wanted| r.realm_type.wire() == wanted))
            .map(|r| {
                json!({
                    "realm": r.realm_id,
                    "context": r.browsing_context_id,
                    "type": r.realm_type.wire(),
                    "origin": r.origin,
                    "sandbox": r.sandbox,
                })
            })
            .collect())
    }

    /// `script.addPreloadScript`.
    pub async fn add_preload_script(
        &self,
        function_declaration: String,
        contexts: Option<Vec<String>>,
        sandbox: Option<String>,
    ) -> Result<String, BidiError> {
        let (context_id, targets) = match contexts {
            Some(ids) if !ids.is_empty() => {
                for id in &ids {
                    self.contexts.get_context(id).await?;
                }
                (if ids.len() == 1 { Some(ids[0].clone()) } else { None }, ids)
            }
            _ => (None, self.contexts.top_level_context_ids().await),
        };

        let adapters = self.adapters.read().await.clone();
        let connection = self.connection.clone();
        let contexts_store = self.contexts.clone();
        self.preload_scripts
            .add_preload_script(context_id, function_declaration, sandbox, targets, move |ctx_id, source, sandbox| {
                let adapters = adapters.clone();
                let connection = connection.clone();
                let contexts_store = contexts_store.clone();
                async move {
                    let ctx = contexts_store.get_context(&ctx_id).await?;
                    let session_id = ctx.session_id().await;
                    let adapter = adapters.get(&session_id).cloned();
                    match adapter {
                        Some(adapter) => adapter.add_preload_script(&source, sandbox.as_deref()).await,
                        None => {
                            let fallback = CdpTargetAdapter::new(session_id, connection.clone());
                            fallback.add_preload_script(&source, sandbox.as_deref()).await
                        }
                    }
                }
            })
            .await
    }

    /// `script.removePreloadScript`.
    pub async fn remove_preload_script(&self, script: &str) -> Result<(), BidiError> {
        let adapters = self.adapters.read().await.clone();
        let contexts_store = self.contexts.clone();
        self.preload_scripts
            .remove_preload_script(script, move |ctx_id, cdp_id| {
                let adapters = adapters.clone();
                let contexts_store = contexts_store.clone();
                async move {
                    let Ok(ctx) = contexts_store.get_context(&ctx_id).await else { return };
                    let session_id = ctx.session_id().await;
                    if let Some(adapter) = adapters.get(&session_id) {
                        adapter.remove_preload_script(&cdp_id).await;
                    }
                }
            })
            .await
    }

    // ---------------------------------------------------------------
    // cdp.* escape hatch
    // ---------------------------------------------------------------

    /// `cdp.sendCommand`.
    pub async fn cdp_send_command(&self, method: &str, params: Value, session: Option<&str>) -> Result<Value, BidiError> {
        Ok(self.send_command_timed(method, Some(params), session).await?)
    }

    /// `cdp.getSession`.
    pub async fn cdp_get_session(&self, context: &str) -> Result<String, BidiError> {
        let ctx = self.contexts.get_context(context).await?;
        Ok(ctx.session_id().await)
    }
}
