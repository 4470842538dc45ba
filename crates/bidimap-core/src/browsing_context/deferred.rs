//! A cancellable, multi-waiter "await an event that may or may not come"
//! primitive — the portable substitute for a `Deferred` utility.

use tokio::sync::watch;

/// A value that becomes available exactly once, and can be awaited by any
/// number of callers concurrently.
///
/// Unlike a `oneshot` channel, a `Deferred` may be waited on by more than
/// one caller (e.g. two in-flight `navigate(wait=complete)` calls against
/// the same context) and exposes `resolve`/`reject` through a shared
/// reference rather than consuming a sender.
pub struct Deferred<T> {
    tx: watch::Sender<Option<Result<T, String>>>,
}

impl<T: Clone> Deferred<T> {
    /// Create a new, unresolved deferred.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Resolve the deferred with a value, waking every waiter.
    ///
    /// A no-op if the deferred was already resolved or rejected.
    pub fn resolve(&self, value: T) {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Ok(value));
            true
        });
    }

    /// Reject the deferred, waking every waiter with an error reason.
    ///
    /// A no-op if the deferred was already resolved or rejected.
    pub fn reject(&self, reason: impl Into<String>) {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Err(reason.into()));
            true
        });
    }

    /// Wait for the deferred to resolve or reject.
    ///
    /// Returns `Err` both for an explicit `reject` and for the degenerate
    /// case where every sender was dropped without ever resolving.
    pub async fn wait(&self) -> Result<T, String> {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err("deferred dropped before resolution".to_string());
            }
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Deferred;
    use std::sync::Arc;

    #[tokio::test]
    async fn resolves_and_returns_value() {
        let deferred = Deferred::new();
        deferred.resolve(42);
        assert_eq!(deferred.wait().await, Ok(42));
    }

    #[tokio::test]
    async fn rejects_with_reason() {
        let deferred: Deferred<()> = Deferred::new();
        deferred.reject("document changed");
        assert_eq!(deferred.wait().await, Err("document changed".to_string()));
    }

    #[tokio::test]
    async fn second_resolve_is_ignored() {
        let deferred = Deferred::new();
        deferred.resolve(1);
        deferred.reject("too late");
        assert_eq!(deferred.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn multiple_waiters_all_observe_resolution() {
        let deferred = Arc::new(Deferred::new());
        let a = deferred.clone();
        let b = deferred.clone();
        let handle_a = tokio::spawn(async move { a.wait().await });
        let handle_b = tokio::spawn(async move { b.wait().await });
        deferred.resolve("loaded".to_string());
        assert_eq!(handle_a.await.unwrap(), Ok("loaded".to_string()));
        assert_eq!(handle_b.await.unwrap(), Ok("loaded".to_string()));
    }

    #[tokio::test]
    async fn wait_before_and_after_resolution_both_succeed() {
        let deferred = Arc::new(Deferred::new());
        let waiter = deferred.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        tokio::task::yield_now().await;
        deferred.resolve(7);
        assert_eq!(handle.await.unwrap(), Ok(7));
        // A fresh wait after resolution returns immediately.
        assert_eq!(deferred.wait().await, Ok(7));
    }
}
