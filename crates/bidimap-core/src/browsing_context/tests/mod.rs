use super::{BrowsingContext, BrowsingContextStore};

fn top_level(id: &str) -> BrowsingContext {
    BrowsingContext::new(id.to_string(), None, format!("session-{id}"))
}

#[tokio::test]
async fn add_and_fetch_context() {
    let store = BrowsingContextStore::new();
    store.add_context(top_level("T1")).await.unwrap();
    let ctx = store.get_context("T1").await.unwrap();
    assert_eq!(ctx.id(), "T1");
    assert_eq!(ctx.url().await, "about:blank");
}

#[tokio::test]
async fn duplicate_context_id_is_rejected() {
    let store = BrowsingContextStore::new();
    store.add_context(top_level("T1")).await.unwrap();
    let err = store.add_context(top_level("T1")).await.unwrap_err();
    assert_eq!(err.code(), "invalid argument");
}

#[tokio::test]
async fn unknown_context_is_no_such_frame() {
    let store = BrowsingContextStore::new();
    let err = store.get_context("missing").await.unwrap_err();
    assert_eq!(err.code(), "no such frame");
}

#[tokio::test]
async fn forest_structure_and_top_level_walk() {
    let store = BrowsingContextStore::new();
    store.add_context(top_level("T1")).await.unwrap();
    store
        .add_context(BrowsingContext::new(
            "F1".to_string(),
            Some("T1".to_string()),
            "session-T1".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(store.children_of("T1").await, vec!["F1".to_string()]);
    assert_eq!(
        store.find_top_level_context_id("F1").await.unwrap(),
        "T1".to_string()
    );
}

#[tokio::test]
async fn delete_removes_descendants_and_invalidates_waiters() {
    let store = BrowsingContextStore::new();
    store.add_context(top_level("T1")).await.unwrap();
    store
        .add_context(BrowsingContext::new(
            "F1".to_string(),
            Some("T1".to_string()),
            "session-T1".to_string(),
        ))
        .await
        .unwrap();

    let frame = store.get_context("F1").await.unwrap();
    let (_, dom_ready, ..) = frame.lifecycle().await;

    store.delete("T1").await;

    assert!(!store.has_context("T1").await);
    assert!(!store.has_context("F1").await);
    assert_eq!(dom_ready.wait().await, Err("context destroyed".to_string()));
}

#[tokio::test]
async fn deleting_an_unknown_context_is_a_no_op() {
    let store = BrowsingContextStore::new();
    store.delete("never-existed").await;
}

#[tokio::test]
async fn get_tree_serializes_forest() {
    let store = BrowsingContextStore::new();
    store.add_context(top_level("T1")).await.unwrap();
    store
        .add_context(BrowsingContext::new(
            "F1".to_string(),
            Some("T1".to_string()),
            "session-T1".to_string(),
        ))
        .await
        .unwrap();

    let tree = store.get_tree(None, None).await.unwrap();
    let contexts = tree["contexts"].as_array().unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0]["context"], "T1");
    let children = contexts[0]["children"].as_array().unwrap();
    assert_eq!(children[0]["context"], "F1");
}

#[tokio::test]
async fn get_tree_respects_max_depth() {
    let store = BrowsingContextStore::new();
    store.add_context(top_level("T1")).await.unwrap();
    store
        .add_context(BrowsingContext::new(
            "F1".to_string(),
            Some("T1".to_string()),
            "session-T1".to_string(),
        ))
        .await
        .unwrap();

    let tree = store.get_tree(None, Some(0)).await.unwrap();
    assert!(tree["contexts"][0]["children"].is_null());
}

#[tokio::test]
async fn start_navigation_rejects_previous_gates() {
    let ctx = top_level("T1");
    let (_, dom_ready, ..) = ctx.lifecycle().await;
    ctx.start_navigation(Some("L1".to_string())).await;
    assert_eq!(dom_ready.wait().await, Err("document changed".to_string()));
    assert_eq!(ctx.document_id().await, Some("L1".to_string()));
}

#[tokio::test]
async fn record_lifecycle_event_ignores_stale_loader() {
    let ctx = top_level("T1");
    ctx.start_navigation(Some("L1".to_string())).await;
    ctx.record_lifecycle_event("load", "stale-loader").await;
    let (_, _, load, ..) = ctx.lifecycle().await;
    assert!(tokio::time::timeout(std::time::Duration::from_millis(10), load.wait())
        .await
        .is_err());
}

#[tokio::test]
async fn record_lifecycle_event_resolves_matching_loader() {
    let ctx = top_level("T1");
    ctx.start_navigation(Some("L1".to_string())).await;
    let (_, dom_ready, ..) = ctx.lifecycle().await;
    ctx.record_lifecycle_event("DOMContentLoaded", "L1").await;
    assert_eq!(dom_ready.wait().await, Ok(()));
}

#[tokio::test]
async fn reset_target_unblocked_rejects_previous_waiter_and_installs_fresh_gate() {
    let ctx = top_level("T1");
    let first = ctx.target_unblocked().await;
    ctx.reset_target_unblocked().await;
    assert_eq!(
        first.wait().await,
        Err("target reattached".to_string())
    );

    let second = ctx.target_unblocked().await;
    ctx.unblock_target().await;
    assert_eq!(second.wait().await, Ok(()));
}

#[tokio::test]
async fn same_document_navigation_updates_url_and_resolves() {
    let ctx = top_level("T1");
    let (_, _, _, navigated, _) = ctx.lifecycle().await;
    ctx.same_document_navigation("https://example.com/#frag").await;
    assert_eq!(ctx.url().await, "https://example.com/#frag");
    assert_eq!(navigated.wait().await, Ok(()));
}
