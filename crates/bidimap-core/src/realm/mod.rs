//! Script realm registry: tracks BiDi realms against the CDP execution
//! contexts that back them.

use std::collections::HashMap;
use std::sync::Arc;

use bidimap_cdp::protocol::runtime::ExecutionContextId;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::browsing_context::ContextId;
use crate::error::BidiError;

#[cfg(test)]
mod tests;

/// Opaque BiDi realm identifier.
pub type RealmId = String;

/// The kind of script realm, mirroring the BiDi `RealmType` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealmType {
    /// A frame's main world.
    Window,
    /// A dedicated worker's global scope.
    DedicatedWorker,
    /// A shared worker's global scope.
    SharedWorker,
    /// A service worker's global scope.
    ServiceWorker,
    /// Any other worker-like global scope.
    Worker,
    /// A `PaintWorklet` global scope.
    PaintWorklet,
    /// An `AudioWorklet` global scope.
    AudioWorklet,
    /// Any other worklet-like global scope.
    Worklet,
}

/// A script realm: one JavaScript global object, reachable through one CDP
/// execution context on one CDP session.
#[derive(Debug, Clone)]
pub struct Realm {
    /// This realm's BiDi id.
    pub realm_id: RealmId,
    /// The browsing context this realm belongs to.
    pub browsing_context_id: ContextId,
    /// The CDP session the backing execution context lives on.
    pub session_id: String,
    /// The CDP execution context id.
    pub execution_context_id: ExecutionContextId,
    /// The realm's origin.
    pub origin: String,
    /// The realm's type.
    pub realm_type: RealmType,
    /// The sandbox (isolated world) name, if this is not the default realm.
    pub sandbox: Option<String>,
}

/// Registry of live script realms, keyed both by BiDi realm id and by the
/// CDP `(session, executionContextId)` pair that created them.
#[derive(Default)]
pub struct RealmRegistry {
    by_realm_id: RwLock<HashMap<RealmId, Arc<Realm>>>,
    by_execution_context: RwLock<HashMap<(String, ExecutionContextId), RealmId>>,
}

impl RealmType {
    /// The BiDi wire string for this realm type (`RealmType`'s serialization).
    #[must_use]
    pub fn wire(self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::DedicatedWorker => "dedicated-worker",
            Self::SharedWorker => "shared-worker",
            Self::ServiceWorker => "service-worker",
            Self::Worker => "worker",
            Self::PaintWorklet => "paint-worklet",
            Self::AudioWorklet => "audio-worklet",
            Self::Worklet => "worklet",
        }
    }
}

impl RealmRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new realm backing a freshly created CDP execution
    /// context.
    pub async fn create_realm(
        &self,
        browsing_context_id: ContextId,
        session_id: String,
        execution_context_id: ExecutionContextId,
        origin: String,
        realm_type: RealmType,
        sandbox: Option<String>,
    ) -> Arc<Realm> {
        let realm_id = Uuid::new_v4().to_string();
        let realm = Arc::new(Realm {
            realm_id: realm_id.clone(),
            browsing_context_id,
            session_id: session_id.clone(),
            execution_context_id,
            origin,
            realm_type,
            sandbox,
        });

        self.by_realm_id
            .write()
            .await
            .insert(realm_id.clone(), realm.clone());
        self.by_execution_context
            .write()
            .await
            .insert((session_id, execution_context_id), realm_id.clone());

        debug!(realm = %realm_id, context = %realm.browsing_context_id, "realm created");
        realm
    }

    /// Fetch a realm by its BiDi id.
    ///
    /// # Errors
    ///
    /// Returns [`BidiError::InvalidArgument`] if the realm is unknown.
    pub async fn get(&self, realm_id: &str) -> Result<Arc<Realm>, BidiError> {
        self.by_realm_id
            .read()
            .await
            .get(realm_id)
            .cloned()
            .ok_or_else(|| BidiError::InvalidArgument(format!("no such realm: {realm_id}")))
    }

    /// Look up the realm backing a given CDP execution context, if any.
    pub async fn find_by_execution_context(
        &self,
        session_id: &str,
        execution_context_id: ExecutionContextId,
    ) -> Option<Arc<Realm>> {
        let realm_id = self
            .by_execution_context
            .read()
            .await
            .get(&(session_id.to_string(), execution_context_id))
            .cloned()?;
        self.by_realm_id.read().await.get(&realm_id).cloned()
    }

    /// All realms currently attached to a browsing context.
    pub async fn realms_for_context(&self, context_id: &str) -> Vec<Arc<Realm>> {
        self.by_realm_id
            .read()
            .await
            .values()
            .filter(|r| r.browsing_context_id == context_id)
            .cloned()
            .collect()
    }

    /// Remove the realm backing a destroyed CDP execution context, returning
    /// its id (for handle invalidation) if one existed.
    pub async fn remove_by_execution_context(
        &self,
        session_id: &str,
        execution_context_id: ExecutionContextId,
    ) -> Option<RealmId> {
        let key = (session_id.to_string(), execution_context_id);
        let realm_id = self.by_execution_context.write().await.remove(&key)?;
        self.by_realm_id.write().await.remove(&realm_id);
        debug!(realm = %realm_id, "realm destroyed");
        Some(realm_id)
    }

    /// Remove every realm backed by a CDP session (`executionContextsCleared`),
    /// returning the removed realm ids (for handle invalidation).
    pub async fn clear_session(&self, session_id: &str) -> Vec<RealmId> {
        let mut by_context = self.by_execution_context.write().await;
        let stale: Vec<_> = by_context
            .keys()
            .filter(|(sid, _)| sid == session_id)
            .cloned()
            .collect();

        let mut by_realm = self.by_realm_id.write().await;
        let mut removed = Vec::with_capacity(stale.len());
        for key in stale {
            if let Some(realm_id) = by_context.remove(&key) {
                by_realm.remove(&realm_id);
                removed.push(realm_id);
            }
        }
        debug!(session = %session_id, count = removed.len(), "session realms cleared");
        removed
    }
}
