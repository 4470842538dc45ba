//! Mapper session: the top-level orchestrator that owns every shared store,
//! dispatches incoming BiDi commands (C9) to the browsing-context processor
//! (C6), and drives the background task that turns CDP events into BiDi
//! state transitions and outgoing events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bidimap_cdp::{CdpConnection, CdpEvent};
use bidimap_cdp::protocol::JavascriptDialogOpeningEvent;
use bidimap_cdp::protocol::page::{FrameAttachedEvent, FrameDetachedEvent, FrameNavigatedEvent, LifecycleEvent, NavigatedWithinDocumentEvent};
use bidimap_cdp::protocol::runtime::{ConsoleApiCalledEvent, ExecutionContextCreatedEvent, ExecutionContextDestroyedEvent, ExecutionContextsClearedEvent};
use bidimap_cdp::protocol::target_domain::{AttachedToTargetEvent, DetachedFromTargetEvent};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

use crate::browsing_context::BrowsingContextStore;
use crate::command::{
    self, AddPreloadScriptParams, CallFunctionParams, CdpGetSessionParams, CdpSendCommandParams, ContextOnlyParams, CreateParams,
    DisownParams, GetRealmsParams, GetTreeParams, HandleUserPromptParams, Method, NavigateParams, PrintParams, ReloadParams,
    RemovePreloadScriptParams, ScriptEvaluateParams, SetViewportParams, SubscriptionParams,
};
use crate::error::BidiError;
use crate::events::EventManager;
use crate::preload::PreloadScriptStore;
use crate::processor::BrowsingContextProcessor;
use crate::realm::RealmRegistry;
use crate::value::HandleRegistry;
use crate::wire::{self, RawCommand};

#[cfg(test)]
mod tests;

/// Default timeout for the underlying CDP round-trip of every mapper
/// operation, matching `bidimap-cdp`'s own `send_command` default.
const DEFAULT_CDP_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Construction-time knobs for a [`MapperSession`].
///
/// Builder pattern, mirroring `bidimap_cdp::CdpConnectionOptions`: call
/// `MapperSessionOptions::new(self_target_id)` then chain setters.
#[derive(Debug, Clone)]
pub struct MapperSessionOptions {
    self_target_id: String,
    cdp_command_timeout: Duration,
    event_buffer_capacity: HashMap<String, usize>,
}

impl MapperSessionOptions {
    /// Start building options. `self_target_id` identifies the mapper's own
    /// tab, which is excluded from the browsing-context forest (§4.6).
    #[must_use]
    pub fn new(self_target_id: impl Into<String>) -> Self {
        Self {
            self_target_id: self_target_id.into(),
            cdp_command_timeout: DEFAULT_CDP_COMMAND_TIMEOUT,
            event_buffer_capacity: HashMap::new(),
        }
    }

    /// Override the timeout applied to the underlying `bidimap-cdp`
    /// round-trip. Does not bound BiDi-level deferred waits.
    #[must_use]
    pub fn cdp_command_timeout(mut self, timeout: Duration) -> Self {
        self.cdp_command_timeout = timeout;
        self
    }

    /// Override the replay buffer capacity for a specific event, in place
    /// of the §4.8 static table (`log.entryAdded` = 100, everything else
    /// unbuffered).
    #[must_use]
    pub fn event_buffer_capacity(mut self, event: impl Into<String>, capacity: usize) -> Self {
        self.event_buffer_capacity.insert(event.into(), capacity);
        self
    }
}

/// The mapper's own tab id, the replay-buffer overrides, and everything
/// else needed to construct a [`MapperSession`]'s shared state.
struct SharedState {
    contexts: Arc<BrowsingContextStore>,
    realms: Arc<RealmRegistry>,
    handles: Arc<HandleRegistry>,
    preload_scripts: Arc<PreloadScriptStore>,
    events: Arc<EventManager>,
}

impl SharedState {
    fn new(options: &MapperSessionOptions) -> Self {
        Self {
            contexts: Arc::new(BrowsingContextStore::new()),
            realms: Arc::new(RealmRegistry::new()),
            handles: Arc::new(HandleRegistry::new()),
            preload_scripts: Arc::new(PreloadScriptStore::new()),
            events: Arc::new(EventManager::with_capacity_overrides(options.event_buffer_capacity.clone())),
        }
    }
}

/// A single BiDi session bound to one CDP browser connection.
///
/// Owns the shared stores (C3/C4/C7/C8), the [`BrowsingContextProcessor`]
/// (C6) built on top of them, and the outgoing event channel a transport
/// drains via [`MapperSession::outgoing`]. Safe to share as `Arc<MapperSession>`
/// across the command-dispatch task and the CDP event-listener task it spawns.
pub struct MapperSession {
    processor: BrowsingContextProcessor,
    events: Arc<EventManager>,
    outgoing_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

impl MapperSession {
    /// Construct a mapper session over an already-connected `CdpConnection`
    /// and spawn its background CDP-event-listener task.
    ///
    /// The listener task runs for the lifetime of the returned session's
    /// `Arc`; dropping every clone stops new dispatch but the already-spawned
    /// task exits only once `connection`'s event broadcast channel closes.
    #[must_use]
    pub fn new(connection: Arc<CdpConnection>, options: MapperSessionOptions) -> Arc<Self> {
        let shared = SharedState::new(&options);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let processor = BrowsingContextProcessor::new(
            connection.clone(),
            shared.contexts.clone(),
            shared.realms.clone(),
            shared.handles.clone(),
            shared.preload_scripts.clone(),
            shared.events.clone(),
            options.self_target_id.clone(),
            outgoing_tx,
            options.cdp_command_timeout,
        );

        let session = Arc::new(Self {
            processor,
            events: shared.events,
            outgoing_rx: tokio::sync::Mutex::new(Some(outgoing_rx)),
        });

        let listener_session = session.clone();
        let mut cdp_events = connection.subscribe_events();
        tokio::spawn(async move {
            debug!("CDP event listener task started");
            loop {
                match cdp_events.recv().await {
                    Ok(event) => listener_session.dispatch_cdp_event(event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "CDP event listener lagged behind the broadcast channel");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("CDP event channel closed, stopping listener task");
                        break;
                    }
                }
            }
        });

        session
    }

    /// Take the outgoing-event receiver. A transport drains this to forward
    /// BiDi events (and the responses it gets back from [`Self::handle_message`])
    /// to the remote client. May only be called once; subsequent calls
    /// return `None`.
    pub async fn outgoing(&self) -> Option<mpsc::UnboundedReceiver<Value>> {
        self.outgoing_rx.lock().await.take()
    }

    // ---------------------------------------------------------------
    // CDP event dispatch (background listener task)
    // ---------------------------------------------------------------

    #[instrument(level = "trace", skip(self, event), fields(method = %event.method, session = ?event.session_id))]
    async fn dispatch_cdp_event(&self, event: CdpEvent) {
        let Some(params) = event.params.clone() else {
            trace!("ignoring CDP event with no params");
            return;
        };
        let session_id = event.session_id.clone();
        let result = self.dispatch_cdp_event_inner(&event.method, session_id.as_deref(), params.clone()).await;
        if let Err(err) = result {
            warn!(method = %event.method, %err, "error handling CDP event");
        }
        if !is_recognized_cdp_event(&event.method) {
            self.emit_cdp_pass_through(&event.method, session_id.as_deref(), params).await;
        }
    }

    async fn dispatch_cdp_event_inner(&self, method: &str, session_id: Option<&str>, params: Value) -> Result<(), BidiError> {
        match method {
            "Target.attachedToTarget" => {
                let e: AttachedToTargetEvent = parse_event(params)?;
                self.processor.handle_target_attached(e.session_id, e.target_info).await?;
            }
            "Target.detachedFromTarget" => {
                let e: DetachedFromTargetEvent = parse_event(params)?;
                self.processor.handle_target_detached(&e.session_id).await;
            }
            "Page.frameAttached" => {
                let e: FrameAttachedEvent = parse_event(params)?;
                let Some(session_id) = session_id else { return Ok(()) };
                self.processor.handle_frame_attached(session_id, e.frame_id, e.parent_frame_id).await?;
            }
            "Page.frameDetached" => {
                let e: FrameDetachedEvent = parse_event(params)?;
                self.processor.handle_frame_detached(&e.frame_id, e.reason).await;
            }
            "Page.navigatedWithinDocument" => {
                let e: NavigatedWithinDocumentEvent = parse_event(params)?;
                self.processor.handle_navigated_within_document(&e.frame_id, e.url).await?;
            }
            "Page.frameNavigated" => {
                let e: FrameNavigatedEvent = parse_event(params)?;
                self.processor
                    .handle_frame_navigated(&e.frame.id, e.frame.url, Some(e.frame.loader_id))
                    .await?;
            }
            "Page.lifecycleEvent" => {
                let e: LifecycleEvent = parse_event(params)?;
                self.processor.handle_lifecycle_event(&e.frame_id, &e.name, &e.loader_id).await?;
            }
            "Runtime.executionContextCreated" => {
                let e: ExecutionContextCreatedEvent = parse_event(params)?;
                let Some(session_id) = session_id else { return Ok(()) };
                let aux = e.context.aux_data;
                let frame_id = aux.as_ref().and_then(|a| a.frame_id.clone());
                let is_default = aux.as_ref().and_then(|a| a.is_default).unwrap_or(true);
                self.processor
                    .handle_execution_context_created(session_id, e.context.id, e.context.origin, frame_id, is_default)
                    .await;
            }
            "Runtime.executionContextDestroyed" => {
                let e: ExecutionContextDestroyedEvent = parse_event(params)?;
                let Some(session_id) = session_id else { return Ok(()) };
                self.processor.handle_execution_context_destroyed(session_id, e.execution_context_id).await;
            }
            "Runtime.executionContextsCleared" => {
                let _: ExecutionContextsClearedEvent = parse_event(params)?;
                let Some(session_id) = session_id else { return Ok(()) };
                self.processor.handle_execution_contexts_cleared(session_id).await;
            }
            "Page.javascriptDialogOpening" => {
                let e: JavascriptDialogOpeningEvent = parse_event(params)?;
                let Some(session_id) = session_id else { return Ok(()) };
                if let Some(context_id) = self.processor.context_for_session(session_id).await {
                    self.processor
                        .handle_dialog_opening(&context_id, &e.dialog_type.to_string(), e.message, e.default_prompt)
                        .await;
                }
            }
            "Runtime.consoleAPICalled" => {
                self.handle_console_api_called(session_id, params).await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Synthesize `log.entryAdded` from `Runtime.consoleAPICalled`, the only
    /// console-message source this mapper recognizes (§4 glossary maps log
    /// entries onto CDP's console API calls rather than a dedicated `Log`
    /// domain, which headless Chrome does not expose over BiDi targets).
    async fn handle_console_api_called(&self, session_id: Option<&str>, params: Value) -> Result<(), BidiError> {
        let Some(session_id) = session_id else { return Ok(()) };
        let context_id = self.processor.context_for_session(session_id).await;
        // `log.entryAdded` is always buffer-able (capacity 100), so the
        // message must be recorded even with no current subscriber —
        // `register_event` below writes the ring buffer regardless, and a
        // later `session.subscribe` replays from it. Only genuinely
        // unbuffered events may skip work for lack of a subscriber.
        let e: ConsoleApiCalledEvent = parse_event(params)?;
        let text = e
            .args
            .iter()
            .map(|arg| arg.description.clone().or_else(|| arg.value.as_ref().map(|v| v.to_string())).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" ");
        let envelope = json!({
            "level": console_log_level(&e.call_type),
            "source": { "realm": Value::Null, "context": context_id },
            "text": text,
            "timestamp": e.timestamp,
            "type": "console",
            "method": format!("{:?}", e.call_type).to_lowercase(),
        });
        for out in self.events.register_event("log.entryAdded", context_id.as_deref(), envelope).await {
            let _ = self.processor_emit(out).await;
        }
        Ok(())
    }

    async fn processor_emit(&self, envelope: Value) -> Result<(), BidiError> {
        self.processor.emit_raw(envelope).await;
        Ok(())
    }

    async fn emit_cdp_pass_through(&self, method: &str, session_id: Option<&str>, params: Value) {
        let envelope = wire::event(
            "cdp.eventReceived",
            json!({ "cdpMethod": method, "cdpParams": params, "cdpSession": session_id }),
        );
        self.processor.emit_raw(envelope).await;
    }

    // ---------------------------------------------------------------
    // BiDi command dispatch (C9)
    // ---------------------------------------------------------------

    /// Parse and dispatch one incoming BiDi command, returning the wire
    /// response to send back (never an event — those arrive through
    /// [`Self::outgoing`]).
    #[instrument(level = "debug", skip(self, raw))]
    pub async fn handle_message(&self, raw: Value) -> Value {
        let command = match wire::parse_command_value(raw) {
            Ok(command) => command,
            Err(err) => return wire::failure(None, err),
        };
        debug!(id = command.id, method = %command.method, "dispatching BiDi command");
        let id = command.id;
        match self.dispatch_command(command).await {
            Ok(result) => wire::success(id, result),
            Err(err) => wire::failure(Some(id), err),
        }
    }

    async fn dispatch_command(&self, command: RawCommand) -> Result<Value, BidiError> {
        let RawCommand { method, params, .. } = command;
        let method = Method::parse(&method)?;
        match method {
            Method::SessionStatus => Ok(json!({ "ready": true, "message": "ready" })),
            Method::SessionSubscribe => {
                let p: SubscriptionParams = command::parse_params(params)?;
                let contexts = self.processor.contexts_ref();
                let replay = self
                    .events
                    .subscribe(&p.events, &p.contexts, p.channel, |ctx| {
                        let contexts = contexts.clone();
                        async move {
                            contexts.get_context(&ctx).await?;
                            Ok(())
                        }
                    })
                    .await?;
                for envelope in replay {
                    self.processor.emit_raw(envelope).await;
                }
                Ok(json!({}))
            }
            Method::SessionUnsubscribe => {
                let p: SubscriptionParams = command::parse_params(params)?;
                self.events.unsubscribe(&p.events, &p.contexts, &p.channel).await;
                Ok(json!({}))
            }
            Method::BrowsingContextGetTree => {
                let p: GetTreeParams = command::parse_params(params)?;
                self.processor.get_tree(p.root.as_deref(), p.max_depth).await
            }
            Method::BrowsingContextCreate => {
                let p: CreateParams = command::parse_params(params)?;
                let context = self.processor.create(p.create_type, p.reference_context).await?;
                Ok(json!({ "context": context }))
            }
            Method::BrowsingContextClose => {
                let p: ContextOnlyParams = command::parse_params(params)?;
                self.processor.close(&p.context).await?;
                Ok(json!({}))
            }
            Method::BrowsingContextNavigate => {
                let p: NavigateParams = command::parse_params(params)?;
                self.processor.navigate(&p.context, p.url, p.wait).await
            }
            Method::BrowsingContextReload => {
                let p: ReloadParams = command::parse_params(params)?;
                self.processor.reload(&p.context, p.ignore_cache, p.wait).await
            }
            Method::BrowsingContextActivate => {
                let p: ContextOnlyParams = command::parse_params(params)?;
                self.processor.activate(&p.context).await?;
                Ok(json!({}))
            }
            Method::BrowsingContextCaptureScreenshot => {
                let p: command::CaptureScreenshotParams = command::parse_params(params)?;
                let data = self.processor.capture_screenshot(&p.context).await?;
                Ok(json!({ "data": data }))
            }
            Method::BrowsingContextPrint => {
                let p: PrintParams = command::parse_params(params)?;
                let data = self.processor.print(&p.context, p.background, p.landscape).await?;
                Ok(json!({ "data": data }))
            }
            Method::BrowsingContextSetViewport => {
                let p: SetViewportParams = command::parse_params(params)?;
                let dimensions = p.viewport.map(|v| (v.width, v.height));
                self.processor.set_viewport(&p.context, dimensions, p.device_pixel_ratio).await?;
                Ok(json!({}))
            }
            Method::BrowsingContextHandleUserPrompt => {
                let p: HandleUserPromptParams = command::parse_params(params)?;
                self.processor.handle_user_prompt(&p.context, p.accept, p.user_text).await?;
                Ok(json!({}))
            }
            Method::ScriptEvaluate => {
                let p: ScriptEvaluateParams = command::parse_params(params)?;
                self.processor
                    .script_evaluate(p.expression, &p.target, p.await_promise, p.result_ownership.into())
                    .await
            }
            Method::ScriptCallFunction => {
                let p: CallFunctionParams = command::parse_params(params)?;
                self.processor
                    .call_function(p.function_declaration, p.this, p.arguments, &p.target, p.await_promise, p.result_ownership.into())
                    .await
            }
            Method::ScriptDisown => {
                let p: DisownParams = command::parse_params(params)?;
                self.processor.disown(&p.handles, &p.target).await?;
                Ok(json!({}))
            }
            Method::ScriptGetRealms => {
                let p: GetRealmsParams = command::parse_params(params)?;
                let realms = self.processor.get_realms(p.context.as_deref(), p.realm_type.as_deref()).await?;
                Ok(json!({ "realms": realms }))
            }
            Method::ScriptAddPreloadScript => {
                let p: AddPreloadScriptParams = command::parse_params(params)?;
                let script = self.processor.add_preload_script(p.function_declaration, p.contexts, p.sandbox).await?;
                Ok(json!({ "script": script }))
            }
            Method::ScriptRemovePreloadScript => {
                let p: RemovePreloadScriptParams = command::parse_params(params)?;
                self.processor.remove_preload_script(&p.script).await?;
                Ok(json!({}))
            }
            Method::CdpSendCommand => {
                let p: CdpSendCommandParams = command::parse_params(params)?;
                self.processor.cdp_send_command(&p.method, p.params, p.session.as_deref()).await
            }
            Method::CdpGetSession => {
                let p: CdpGetSessionParams = command::parse_params(params)?;
                let session = self.processor.cdp_get_session(&p.context).await?;
                Ok(json!({ "session": session }))
            }
        }
    }
}

fn parse_event<T: for<'de> serde::Deserialize<'de>>(params: Value) -> Result<T, BidiError> {
    serde_json::from_value(params).map_err(|e| BidiError::Unknown(format!("malformed CDP event: {e}")))
}

fn console_log_level(call_type: &bidimap_cdp::protocol::runtime::ConsoleApiType) -> &'static str {
    use bidimap_cdp::protocol::runtime::ConsoleApiType;
    match call_type {
        ConsoleApiType::Error | ConsoleApiType::Assert => "error",
        ConsoleApiType::Warning => "warn",
        ConsoleApiType::Debug => "debug",
        _ => "info",
    }
}

/// CDP events this mapper already folds into `browsingContext.*`/`log.*`
/// state transitions, so they are not also re-emitted as `cdp.eventReceived`.
fn is_recognized_cdp_event(method: &str) -> bool {
    matches!(
        method,
        "Target.attachedToTarget"
            | "Target.detachedFromTarget"
            | "Page.frameAttached"
            | "Page.frameDetached"
            | "Page.navigatedWithinDocument"
            | "Page.frameNavigated"
            | "Page.lifecycleEvent"
            | "Runtime.executionContextCreated"
            | "Runtime.executionContextDestroyed"
            | "Runtime.executionContextsCleared"
            | "Page.javascriptDialogOpening"
            | "Runtime.consoleAPICalled"
    )
}
