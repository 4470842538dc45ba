use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use super::*;

fn counting_installer() -> (
    impl FnMut(ContextId, String, Option<String>) -> std::future::Ready<Result<CdpPreloadScriptId, BidiError>>,
    Arc<AtomicU64>,
) {
    let counter = Arc::new(AtomicU64::new(0));
    let counter_clone = counter.clone();
    let installer = move |_ctx: ContextId, _src: String, _sandbox: Option<String>| {
        let n = counter_clone.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(format!("cdp-script-{n}")))
    };
    (installer, counter)
}

#[tokio::test]
async fn add_wraps_source_and_binds_every_target() {
    let store = PreloadScriptStore::new();
    let (installer, counter) = counting_installer();

    let id = store
        .add_preload_script(
            None,
            "() => window.__marker = 1".to_string(),
            None,
            vec!["ctx-a".to_string(), "ctx-b".to_string()],
            installer,
        )
        .await
        .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(!id.is_empty());

    let globals = store.global_scripts().await;
    assert_eq!(globals.len(), 1);
    let (global_id, source, sandbox) = &globals[0];
    assert_eq!(global_id, &id);
    assert_eq!(source, "(() => window.__marker = 1)();");
    assert_eq!(sandbox, &None);
}

#[tokio::test]
async fn context_scoped_script_is_not_a_global_script() {
    let store = PreloadScriptStore::new();
    let (installer, _counter) = counting_installer();

    store
        .add_preload_script(
            Some("ctx-a".to_string()),
            "() => 1".to_string(),
            Some("sandbox-1".to_string()),
            vec!["ctx-a".to_string()],
            installer,
        )
        .await
        .unwrap();

    assert!(store.global_scripts().await.is_empty());
}

#[tokio::test]
async fn remove_tears_down_every_binding() {
    let store = PreloadScriptStore::new();
    let (installer, _counter) = counting_installer();

    let id = store
        .add_preload_script(
            None,
            "() => 1".to_string(),
            None,
            vec!["ctx-a".to_string(), "ctx-b".to_string()],
            installer,
        )
        .await
        .unwrap();

    let torn_down = Arc::new(Mutex::new(Vec::new()));
    let torn_down_clone = torn_down.clone();
    store
        .remove_preload_script(&id, move |ctx, cdp_id| {
            let torn_down = torn_down_clone.clone();
            async move {
                torn_down.lock().await.push((ctx, cdp_id));
            }
        })
        .await
        .unwrap();

    let recorded = torn_down.lock().await;
    assert_eq!(recorded.len(), 2);
    assert!(store.global_scripts().await.is_empty());
}

#[tokio::test]
async fn remove_unknown_script_is_no_such_script() {
    let store = PreloadScriptStore::new();
    let err = store
        .remove_preload_script("does-not-exist", |_, _| async {})
        .await
        .unwrap_err();
    assert!(matches!(err, BidiError::NoSuchScript(_)));
}

#[tokio::test]
async fn record_binding_extends_future_removal() {
    let store = PreloadScriptStore::new();
    let (installer, _counter) = counting_installer();

    let id = store
        .add_preload_script(None, "() => 1".to_string(), None, vec![], installer)
        .await
        .unwrap();

    store
        .record_binding(&id, "ctx-late".to_string(), "cdp-late".to_string())
        .await;

    let torn_down = Arc::new(Mutex::new(Vec::new()));
    let torn_down_clone = torn_down.clone();
    store
        .remove_preload_script(&id, move |ctx, cdp_id| {
            let torn_down = torn_down_clone.clone();
            async move {
                torn_down.lock().await.push((ctx, cdp_id));
            }
        })
        .await
        .unwrap();

    let recorded = torn_down.lock().await;
    assert_eq!(recorded.as_slice(), &[("ctx-late".to_string(), "cdp-late".to_string())]);
}
