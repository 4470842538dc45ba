use serde_json::json;

use super::*;

async fn ok(_ctx: String) -> Result<(), BidiError> {
    Ok(())
}

#[tokio::test]
async fn register_without_subscribers_emits_nothing() {
    let mgr = EventManager::new();
    let out = mgr
        .register_event("browsingContext.load", Some("ctx-1"), json!({"context": "ctx-1"}))
        .await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn subscribe_then_register_delivers_to_channel() {
    let mgr = EventManager::new();
    mgr.subscribe(
        &["browsingContext.load".to_string()],
        &["ctx-1".to_string()],
        None,
        ok,
    )
    .await
    .unwrap();

    let out = mgr
        .register_event("browsingContext.load", Some("ctx-1"), json!({"context": "ctx-1"}))
        .await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["method"], "browsingContext.load");
    assert!(out[0].get("channel").is_none());
}

#[tokio::test]
async fn global_subscription_matches_every_context() {
    let mgr = EventManager::new();
    mgr.subscribe(&["log.entryAdded".to_string()], &[], None, ok)
        .await
        .unwrap();

    let a = mgr.register_event("log.entryAdded", Some("ctx-a"), json!({"n": 1})).await;
    let b = mgr.register_event("log.entryAdded", Some("ctx-b"), json!({"n": 2})).await;
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
}

#[tokio::test]
async fn empty_contexts_array_is_equivalent_to_global() {
    let mgr = EventManager::new();
    mgr.subscribe(&["browsingContext.load".to_string()], &[], Some("ch1".to_string()), ok)
        .await
        .unwrap();

    let out = mgr
        .register_event("browsingContext.load", Some("anything"), json!({}))
        .await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["channel"], "ch1");
}

#[tokio::test]
async fn subscribe_validates_contexts_before_recording() {
    let mgr = EventManager::new();
    let err = mgr
        .subscribe(
            &["browsingContext.load".to_string()],
            &["missing".to_string()],
            None,
            |_| async { Err(BidiError::NoSuchFrame("no such frame: missing".to_string())) },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BidiError::NoSuchFrame(_)));
    assert!(!mgr.has_subscriber("browsingContext.load", Some("missing")).await);
}

#[tokio::test]
async fn replay_on_subscribe_returns_buffered_log_entries_in_order() {
    let mgr = EventManager::new();
    // Buffer entries accumulate even with no subscriber yet, since
    // log.entryAdded is buffer-able.
    mgr.register_event("log.entryAdded", Some("ctx-1"), json!({"n": 1})).await;
    mgr.register_event("log.entryAdded", Some("ctx-1"), json!({"n": 2})).await;

    let replayed = mgr
        .subscribe(&["log.entryAdded".to_string()], &["ctx-1".to_string()], None, ok)
        .await
        .unwrap();

    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0]["params"]["n"], 1);
    assert_eq!(replayed[1]["params"]["n"], 2);
}

#[tokio::test]
async fn replay_does_not_redeliver_already_sent_events() {
    let mgr = EventManager::new();
    mgr.subscribe(&["log.entryAdded".to_string()], &["ctx-1".to_string()], None, ok)
        .await
        .unwrap();
    mgr.register_event("log.entryAdded", Some("ctx-1"), json!({"n": 1})).await;

    // Re-subscribing the same (event, context, channel) should only
    // replay what hasn't been sent to this exact channel yet, i.e.
    // nothing, since the live emission above already advanced lastSent.
    let replayed = mgr
        .subscribe(&["log.entryAdded".to_string()], &["ctx-1".to_string()], None, ok)
        .await
        .unwrap();
    assert!(replayed.is_empty());
}

#[tokio::test]
async fn non_buffered_events_are_not_replayed() {
    let mgr = EventManager::new();
    mgr.register_event("browsingContext.load", Some("ctx-1"), json!({"n": 1})).await;

    let replayed = mgr
        .subscribe(&["browsingContext.load".to_string()], &["ctx-1".to_string()], None, ok)
        .await
        .unwrap();
    assert!(replayed.is_empty());
}

#[tokio::test]
async fn unsubscribe_stops_future_delivery() {
    let mgr = EventManager::new();
    mgr.subscribe(&["browsingContext.load".to_string()], &["ctx-1".to_string()], None, ok)
        .await
        .unwrap();
    mgr.unsubscribe(&["browsingContext.load".to_string()], &["ctx-1".to_string()], &None)
        .await;

    let out = mgr
        .register_event("browsingContext.load", Some("ctx-1"), json!({}))
        .await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn distinct_channels_each_get_independent_replay_cursors() {
    let mgr = EventManager::new();
    mgr.subscribe(&["log.entryAdded".to_string()], &["ctx-1".to_string()], Some("a".to_string()), ok)
        .await
        .unwrap();
    mgr.register_event("log.entryAdded", Some("ctx-1"), json!({"n": 1})).await;

    // A second channel subscribing later should still see the buffered
    // entry, independent of channel "a" already having it delivered live.
    let replayed = mgr
        .subscribe(&["log.entryAdded".to_string()], &["ctx-1".to_string()], Some("b".to_string()), ok)
        .await
        .unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0]["channel"], "b");
}
