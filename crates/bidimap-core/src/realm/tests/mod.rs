use super::{RealmRegistry, RealmType};

#[test]
fn realm_type_wire_strings_match_bidi_spelling() {
    assert_eq!(RealmType::Window.wire(), "window");
    assert_eq!(RealmType::DedicatedWorker.wire(), "dedicated-worker");
    assert_eq!(RealmType::SharedWorker.wire(), "shared-worker");
    assert_eq!(RealmType::ServiceWorker.wire(), "service-worker");
    assert_eq!(RealmType::Worker.wire(), "worker");
    assert_eq!(RealmType::PaintWorklet.wire(), "paint-worklet");
    assert_eq!(RealmType::AudioWorklet.wire(), "audio-worklet");
    assert_eq!(RealmType::Worklet.wire(), "worklet");
}

#[tokio::test]
async fn create_and_fetch_realm() {
    let registry = RealmRegistry::new();
    let realm = registry
        .create_realm(
            "T1".to_string(),
            "session-1".to_string(),
            7,
            "https://example.com".to_string(),
            RealmType::Window,
            None,
        )
        .await;

    let fetched = registry.get(&realm.realm_id).await.unwrap();
    assert_eq!(fetched.browsing_context_id, "T1");
    assert_eq!(fetched.execution_context_id, 7);
}

#[tokio::test]
async fn unknown_realm_is_invalid_argument() {
    let registry = RealmRegistry::new();
    let err = registry.get("nonexistent").await.unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[tokio::test]
async fn find_by_execution_context_round_trips() {
    let registry = RealmRegistry::new();
    let realm = registry
        .create_realm(
            "T1".to_string(),
            "session-1".to_string(),
            3,
            "https://example.com".to_string(),
            RealmType::Window,
            None,
        )
        .await;

    let found = registry
        .find_by_execution_context("session-1", 3)
        .await
        .unwrap();
    assert_eq!(found.realm_id, realm.realm_id);

    assert!(
        registry
            .find_by_execution_context("session-1", 999)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn realms_for_context_filters_by_context() {
    let registry = RealmRegistry::new();
    registry
        .create_realm(
            "T1".to_string(),
            "session-1".to_string(),
            1,
            "https://a.example".to_string(),
            RealmType::Window,
            None,
        )
        .await;
    registry
        .create_realm(
            "T2".to_string(),
            "session-2".to_string(),
            2,
            "https://b.example".to_string(),
            RealmType::Window,
            None,
        )
        .await;

    let realms = registry.realms_for_context("T1").await;
    assert_eq!(realms.len(), 1);
    assert_eq!(realms[0].browsing_context_id, "T1");
}

#[tokio::test]
async fn remove_by_execution_context_drops_realm() {
    let registry = RealmRegistry::new();
    let realm = registry
        .create_realm(
            "T1".to_string(),
            "session-1".to_string(),
            5,
            "https://example.com".to_string(),
            RealmType::Window,
            None,
        )
        .await;

    let removed = registry.remove_by_execution_context("session-1", 5).await;
    assert_eq!(removed, Some(realm.realm_id.clone()));
    assert!(registry.get(&realm.realm_id).await.is_err());
    assert!(
        registry
            .find_by_execution_context("session-1", 5)
            .await
            .is_none()
    );
    assert!(registry.remove_by_execution_context("session-1", 5).await.is_none());
}

#[tokio::test]
async fn clear_session_removes_only_that_sessions_realms() {
    let registry = RealmRegistry::new();
    let kept = registry
        .create_realm(
            "T1".to_string(),
            "session-1".to_string(),
            1,
            "https://a.example".to_string(),
            RealmType::Window,
            None,
        )
        .await;
    let cleared = registry
        .create_realm(
            "T2".to_string(),
            "session-2".to_string(),
            2,
            "https://b.example".to_string(),
            RealmType::Window,
            None,
        )
        .await;

    let removed = registry.clear_session("session-2").await;

    assert_eq!(removed, vec![cleared.realm_id.clone()]);
    assert!(registry.get(&kept.realm_id).await.is_ok());
    assert!(registry.get(&cleared.realm_id).await.is_err());
}

#[tokio::test]
async fn sandbox_realm_carries_sandbox_name() {
    let registry = RealmRegistry::new();
    let realm = registry
        .create_realm(
            "T1".to_string(),
            "session-1".to_string(),
            9,
            "https://example.com".to_string(),
            RealmType::Window,
            Some("my-sandbox".to_string()),
        )
        .await;
    assert_eq!(realm.sandbox.as_deref(), Some("my-sandbox"));
}
