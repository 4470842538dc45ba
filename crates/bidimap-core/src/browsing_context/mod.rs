//! Browsing-context store: the forest of top-level targets and frames,
//! with their navigation lifecycle state.

mod deferred;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

pub use deferred::Deferred;

use crate::error::BidiError;

#[cfg(test)]
mod tests;

/// Opaque browsing context identifier. Equal to the CDP target id for
/// top-level contexts, or the CDP frame id for nested frames.
pub type ContextId = String;

/// Per-context navigation lifecycle gates.
///
/// Each is replaced with a fresh, unresolved [`Deferred`] whenever the
/// context begins a new document (see [`BrowsingContext::start_navigation`]);
/// replacing rather than reusing lets any waiter holding the old `Arc`
/// observe its rejection independently of the new navigation's outcome.
pub struct Lifecycle {
    /// Resolves once the new document's execution context exists.
    pub document_initialized: Arc<Deferred<()>>,
    /// Resolves on `Page.lifecycleEvent{name="DOMContentLoaded"}`.
    pub dom_content_loaded: Arc<Deferred<()>>,
    /// Resolves on `Page.lifecycleEvent{name="load"}`.
    pub load: Arc<Deferred<()>>,
    /// Resolves on `Page.navigatedWithinDocument` for this context.
    pub navigated_within_document: Arc<Deferred<()>>,
    /// Resolves once the target's initial `Runtime.runIfWaitingForDebugger`
    /// handshake has completed (or immediately, for non-gated re-adoption).
    pub target_unblocked: Arc<Deferred<()>>,
}

impl Lifecycle {
    fn fresh() -> Self {
        Self {
            document_initialized: Arc::new(Deferred::new()),
            dom_content_loaded: Arc::new(Deferred::new()),
            load: Arc::new(Deferred::new()),
            navigated_within_document: Arc::new(Deferred::new()),
            target_unblocked: Arc::new(Deferred::new()),
        }
    }
}

/// A single browsing context: a top-level target or one of its frames.
pub struct BrowsingContext {
    id: ContextId,
    parent_id: Option<ContextId>,
    url: RwLock<String>,
    session_id: RwLock<String>,
    document_id: RwLock<Option<String>>,
    lifecycle: RwLock<Lifecycle>,
    browser_context_id: RwLock<Option<String>>,
}

impl BrowsingContext {
    /// Create a new top-level or nested context at `about:blank`.
    #[must_use]
    pub fn new(id: ContextId, parent_id: Option<ContextId>, session_id: String) -> Self {
        Self {
            id,
            parent_id,
            url: RwLock::new("about:blank".to_string()),
            session_id: RwLock::new(session_id),
            document_id: RwLock::new(None),
            lifecycle: RwLock::new(Lifecycle::fresh()),
            browser_context_id: RwLock::new(None),
        }
    }

    /// The CDP `browserContextId` this (top-level) context's target was
    /// created in, if any.
    pub async fn browser_context_id(&self) -> Option<String> {
        self.browser_context_id.read().await.clone()
    }

    /// Record the CDP `browserContextId` for this context (set once, at
    /// attach time, from the target's `TargetInfo`).
    pub async fn set_browser_context_id(&self, id: impl Into<String>) {
        *self.browser_context_id.write().await = Some(id.into());
    }

    /// This context's id.
    #[must_use]
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// The parent context id, or `None` for a top-level context.
    #[must_use]
    pub fn parent_id(&self) -> Option<&ContextId> {
        self.parent_id.as_ref()
    }

    /// Whether this is a top-level (target-backed) context.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Current document URL.
    pub async fn url(&self) -> String {
        self.url.read().await.clone()
    }

    /// Set the current document URL (e.g. on `navigatedWithinDocument` or
    /// `frameNavigated`).
    pub async fn set_url(&self, url: impl Into<String>) {
        *self.url.write().await = url.into();
    }

    /// The CDP session this context's commands are issued against.
    pub async fn session_id(&self) -> String {
        self.session_id.read().await.clone()
    }

    /// Re-bind this context to a new CDP session (OOPIF adoption).
    pub async fn set_session_id(&self, session_id: impl Into<String>) {
        *self.session_id.write().await = session_id.into();
    }

    /// The loader id of the most recent navigation, if any.
    pub async fn document_id(&self) -> Option<String> {
        self.document_id.read().await.clone()
    }

    /// A cloned snapshot of the current lifecycle deferreds.
    pub async fn lifecycle(&self) -> (
        Arc<Deferred<()>>,
        Arc<Deferred<()>>,
        Arc<Deferred<()>>,
        Arc<Deferred<()>>,
        Arc<Deferred<()>>,
    ) {
        let lc = self.lifecycle.read().await;
        (
            lc.document_initialized.clone(),
            lc.dom_content_loaded.clone(),
            lc.load.clone(),
            lc.navigated_within_document.clone(),
            lc.target_unblocked.clone(),
        )
    }

    /// The `targetUnblocked` gate, used by script evaluation to wait out
    /// the CDP auto-attach handshake.
    pub async fn target_unblocked(&self) -> Arc<Deferred<()>> {
        self.lifecycle.read().await.target_unblocked.clone()
    }

    /// Resolve `targetUnblocked` (called once the adapter has finished its
    /// attach handshake for this context's target).
    pub async fn unblock_target(&self) {
        self.lifecycle.read().await.target_unblocked.resolve(());
    }

    /// Replace `targetUnblocked` with a fresh, unresolved gate, rejecting
    /// the previous one. Used on OOPIF adoption, where the context moves to
    /// a new CDP session and must wait out that session's own attach
    /// handshake before scripts can run again.
    pub async fn reset_target_unblocked(&self) {
        let mut lc = self.lifecycle.write().await;
        lc.target_unblocked.reject("target reattached");
        lc.target_unblocked = Arc::new(Deferred::new());
    }

    /// Begin a new document load: records the loader id, and installs
    /// fresh lifecycle deferreds after rejecting the previous ones so that
    /// any in-flight waiter fails fast instead of hanging.
    ///
    /// `same_document` navigations (no `loaderId` change) only resolve
    /// `navigated_within_document` and never touch the other gates.
    pub async fn start_navigation(&self, loader_id: Option<String>) {
        *self.document_id.write().await = loader_id;
        let mut lc = self.lifecycle.write().await;
        lc.document_initialized.reject("document changed");
        lc.dom_content_loaded.reject("document changed");
        lc.load.reject("document changed");
        lc.navigated_within_document.reject("document changed");
        *lc = Lifecycle::fresh();
    }

    /// Record a same-document navigation (`Page.navigatedWithinDocument`).
    pub async fn same_document_navigation(&self, url: impl Into<String>) {
        self.set_url(url).await;
        self.lifecycle
            .read()
            .await
            .navigated_within_document
            .resolve(());
    }

    /// Record a CDP lifecycle event by name (`"init"`, `"DOMContentLoaded"`,
    /// `"load"`, ...).
    pub async fn record_lifecycle_event(&self, name: &str, loader_id: &str) {
        if self.document_id.read().await.as_deref() != Some(loader_id) {
            return;
        }
        let lc = self.lifecycle.read().await;
        match name {
            "init" => lc.document_initialized.resolve(()),
            "DOMContentLoaded" => lc.dom_content_loaded.resolve(()),
            "load" => lc.load.resolve(()),
            _ => {}
        }
    }

    /// Reject every waitable gate (called on context deletion).
    async fn invalidate(&self) {
        let lc = self.lifecycle.read().await;
        lc.document_initialized.reject("context destroyed");
        lc.dom_content_loaded.reject("context destroyed");
        lc.load.reject("context destroyed");
        lc.navigated_within_document.reject("context destroyed");
        lc.target_unblocked.reject("context destroyed");
    }
}

/// The forest of browsing contexts, indexed by id.
#[derive(Default)]
pub struct BrowsingContextStore {
    contexts: RwLock<HashMap<ContextId, Arc<BrowsingContext>>>,
    children: RwLock<HashMap<ContextId, Vec<ContextId>>>,
    top_level: RwLock<Vec<ContextId>>,
}

impl BrowsingContextStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly created context into the forest.
    ///
    /// # Errors
    ///
    /// Returns [`BidiError::InvalidArgument`] if the id is already tracked.
    pub async fn add_context(&self, ctx: BrowsingContext) -> Result<Arc<BrowsingContext>, BidiError> {
        let id = ctx.id.clone();
        let parent_id = ctx.parent_id.clone();
        let mut contexts = self.contexts.write().await;
        if contexts.contains_key(&id) {
            return Err(BidiError::InvalidArgument(format!(
                "context already exists: {id}"
            )));
        }
        let arc = Arc::new(ctx);
        contexts.insert(id.clone(), arc.clone());
        drop(contexts);

        match &parent_id {
            Some(parent) => {
                self.children
                    .write()
                    .await
                    .entry(parent.clone())
                    .or_default()
                    .push(id.clone());
            }
            None => {
                self.top_level.write().await.push(id.clone());
            }
        }

        debug!(context = %id, parent = ?parent_id, "browsing context created");
        Ok(arc)
    }

    /// Whether `id` is a tracked context.
    pub async fn has_context(&self, id: &str) -> bool {
        self.contexts.read().await.contains_key(id)
    }

    /// Fetch a tracked context.
    ///
    /// # Errors
    ///
    /// Returns [`BidiError::NoSuchFrame`] if `id` is not tracked.
    pub async fn get_context(&self, id: &str) -> Result<Arc<BrowsingContext>, BidiError> {
        self.contexts
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BidiError::NoSuchFrame(format!("no such frame: {id}")))
    }

    /// All current top-level context ids, in creation order.
    pub async fn top_level_context_ids(&self) -> Vec<ContextId> {
        self.top_level.read().await.clone()
    }

    /// Direct children of `id`.
    pub async fn children_of(&self, id: &str) -> Vec<ContextId> {
        self.children.read().await.get(id).cloned().unwrap_or_default()
    }

    /// Find the top-level context currently attached as `session_id`.
    ///
    /// Used for routing CDP events (page dialogs, CDP pass-through) that
    /// identify their target only by session id.
    pub async fn find_top_level_by_session(&self, session_id: &str) -> Option<ContextId> {
        for id in self.top_level_context_ids().await {
            if let Ok(ctx) = self.get_context(&id).await {
                if ctx.session_id().await == session_id {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Walk a context's ancestry to find its owning top-level context id.
    ///
    /// # Errors
    ///
    /// Returns [`BidiError::NoSuchFrame`] if `id` is not tracked.
    pub async fn find_top_level_context_id(&self, id: &str) -> Result<ContextId, BidiError> {
        let mut current = self.get_context(id).await?;
        loop {
            match current.parent_id() {
                None => return Ok(current.id().clone()),
                Some(parent_id) => current = self.get_context(parent_id).await?,
            }
        }
    }

    /// Delete a context and every descendant, invalidating their lifecycle
    /// gates along the way.
    ///
    /// A no-op (not an error) if `id` is already gone, since deletion can
    /// race a CDP detach that already fired.
    pub async fn delete(&self, id: &str) {
        let children = self.children_of(id).await;
        for child in children {
            Box::pin(self.delete(&child)).await;
        }

        let removed = self.contexts.write().await.remove(id);
        let Some(ctx) = removed else {
            return;
        };
        ctx.invalidate().await;

        self.children.write().await.remove(id);
        match ctx.parent_id() {
            Some(parent) => {
                if let Some(siblings) = self.children.write().await.get_mut(parent) {
                    siblings.retain(|c| c != id);
                }
            }
            None => {
                self.top_level.write().await.retain(|c| c != id);
            }
        }

        debug!(context = %id, "browsing context destroyed");
    }

    /// Serialize the forest (or the subtree rooted at `root`) as a BiDi
    /// `browsingContext.getTree` result, honoring `max_depth`.
    ///
    /// # Errors
    ///
    /// Returns [`BidiError::NoSuchFrame`] if `root` is given but unknown.
    pub async fn get_tree(
        &self,
        root: Option<&str>,
        max_depth: Option<usize>,
    ) -> Result<Value, BidiError> {
        let roots = match root {
            Some(id) => {
                self.get_context(id).await?;
                vec![id.to_string()]
            }
            None => self.top_level_context_ids().await,
        };

        let mut contexts = Vec::with_capacity(roots.len());
        for id in roots {
            contexts.push(Box::pin(self.serialize_subtree(&id, max_depth, 0)).await?);
        }
        Ok(json!({ "contexts": contexts }))
    }

    async fn serialize_subtree(
        &self,
        id: &str,
        max_depth: Option<usize>,
        depth: usize,
    ) -> Result<Value, BidiError> {
        let ctx = self.get_context(id).await?;
        let children = if max_depth.is_some_and(|max| depth >= max) {
            Value::Null
        } else {
            let child_ids = self.children_of(id).await;
            let mut serialized = Vec::with_capacity(child_ids.len());
            for child in child_ids {
                serialized.push(Box::pin(self.serialize_subtree(&child, max_depth, depth + 1)).await?);
            }
            Value::Array(serialized)
        };

        Ok(json!({
            "context": ctx.id(),
            "url": ctx.url().await,
            "parent": ctx.parent_id(),
            "children": children,
        }))
    }
}
