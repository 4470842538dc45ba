//! Preload-script store: tracks BiDi preload scripts against the set of
//! CDP targets they have been installed on.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::browsing_context::ContextId;
use crate::error::BidiError;
use crate::target::CdpPreloadScriptId;

#[cfg(test)]
mod tests;

/// Opaque BiDi preload script identifier.
pub type PreloadScriptId = String;

struct RegisteredScript {
    /// `None` means "apply to every current and future top-level target".
    context_id: Option<ContextId>,
    /// The wrapped `(${functionDeclaration})();` source actually installed.
    function_declaration: String,
    sandbox: Option<String>,
    /// Every `(context, cdpScriptId)` pair this script is currently bound
    /// to, so removal can tear each one down individually.
    bindings: Vec<(ContextId, CdpPreloadScriptId)>,
}

/// Registry of BiDi preload scripts.
///
/// A preload script is conceptually one BiDi object bound to possibly many
/// CDP `addScriptToEvaluateOnNewDocument` registrations, one per target it
/// applies to. Callers supply the actual CDP installation/removal as
/// closures so this store stays free of any CDP connection dependency.
#[derive(Default)]
pub struct PreloadScriptStore {
    scripts: RwLock<HashMap<PreloadScriptId, RegisteredScript>>,
}

impl PreloadScriptStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new preload script and install it on every target in
    /// `targets` via `install`.
    ///
    /// `targets` is the resolved target set: a single context when a
    /// `context` was given, or every current top-level context for a
    /// global (`context: null`) script.
    ///
    /// # Errors
    ///
    /// Propagates whatever `install` returns for the first failing target;
    /// scripts already installed on earlier targets are left in place (the
    /// caller only learns of the new id on success).
    pub async fn add_preload_script<F, Fut>(
        &self,
        context_id: Option<ContextId>,
        function_declaration: String,
        sandbox: Option<String>,
        targets: Vec<ContextId>,
        mut install: F,
    ) -> Result<PreloadScriptId, BidiError>
    where
        F: FnMut(ContextId, String, Option<String>) -> Fut,
        Fut: Future<Output = Result<CdpPreloadScriptId, BidiError>>,
    {
        let wrapped = format!("({function_declaration})();");
        let mut bindings = Vec::with_capacity(targets.len());
        for target in targets {
            let cdp_id = install(target.clone(), wrapped.clone(), sandbox.clone()).await?;
            bindings.push((target, cdp_id));
        }

        let id = Uuid::new_v4().to_string();
        self.scripts.write().await.insert(
            id.clone(),
            RegisteredScript {
                context_id,
                function_declaration: wrapped,
                sandbox,
                bindings,
            },
        );
        debug!(script = %id, "preload script registered");
        Ok(id)
    }

    /// Remove a registered preload script, tearing down every target
    /// binding via `uninstall`.
    ///
    /// # Errors
    ///
    /// Returns [`BidiError::NoSuchScript`] if `id` is not registered.
    /// `uninstall` itself is expected to swallow "target already gone"
    /// errors, matching the adapter's own removal contract.
    pub async fn remove_preload_script<F, Fut>(
        &self,
        id: &str,
        mut uninstall: F,
    ) -> Result<(), BidiError>
    where
        F: FnMut(ContextId, CdpPreloadScriptId) -> Fut,
        Fut: Future<Output = ()>,
    {
        let Some(script) = self.scripts.write().await.remove(id) else {
            return Err(BidiError::NoSuchScript(format!(
                "no such preload script: {id}"
            )));
        };
        for (context_id, cdp_id) in script.bindings {
            uninstall(context_id, cdp_id).await;
        }
        debug!(script = %id, "preload script removed");
        Ok(())
    }

    /// Every global (`context: null`) script, as `(id, source, sandbox)`.
    ///
    /// Used on new target attachment to re-apply global scripts before the
    /// new document starts loading.
    pub async fn global_scripts(&self) -> Vec<(PreloadScriptId, String, Option<String>)> {
        self.scripts
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.context_id.is_none())
            .map(|(id, s)| (id.clone(), s.function_declaration.clone(), s.sandbox.clone()))
            .collect()
    }

    /// Record that `id` was (re-)installed on `context_id` with CDP id
    /// `cdp_id`, e.g. after [`Self::global_scripts`] was applied to a
    /// freshly attached target.
    pub async fn record_binding(&self, id: &str, context_id: ContextId, cdp_id: CdpPreloadScriptId) {
        if let Some(script) = self.scripts.write().await.get_mut(id) {
            script.bindings.push((context_id, cdp_id));
        }
    }
}
