//! Cross-app state through the lifecycle: mount wires listeners, unmount
//! drops them.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use atrium_core::{AppDescriptor, AppStatus, RawExports, lifecycle_fn};
use atrium_runtime::FrameworkHooks;
use atrium_test::{register_exports, script_url, serve_app};
use serde_json::{Map, Value, json};

use common::{harness_with_state, quiet_config};

fn initial() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("theme".to_string(), json!("light"));
    map
}

fn patch(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

/// Exports whose mount patches the shared state and registers a listener.
fn stateful_exports(heard: Arc<AtomicUsize>) -> RawExports {
    RawExports::new()
        .with_mount(lifecycle_fn(move |props| {
            let heard = Arc::clone(&heard);
            async move {
                let state = props.state.expect("mount props carry a state handle");
                let changed = state.set_global_state(patch("theme", json!("dark")));
                assert_eq!(changed, vec!["theme".to_string()]);
                // Undeclared keys are dropped for applications.
                assert!(state.set_global_state(patch("cart", json!([]))).is_empty());
                state.on_global_state_change(
                    Arc::new(move |_next, _prev| {
                        heard.fetch_add(1, Ordering::SeqCst);
                    }),
                    false,
                );
                Ok(())
            }
        }))
        .with_unmount(lifecycle_fn(|_props| async { Ok(()) }))
}

#[tokio::test]
async fn test_mounted_app_reads_and_writes_declared_state() {
    let h = harness_with_state(initial());
    let heard = Arc::new(AtomicUsize::new(0));

    let entry = serve_app(&h.fetcher, "shop");
    register_exports(
        h.runtime.scripts(),
        script_url("shop"),
        stateful_exports(Arc::clone(&heard)),
    );
    h.runtime.surface().insert_container("#shop");
    h.runtime
        .register_apps(
            vec![AppDescriptor::new("shop", entry.as_str(), "#shop", "/shop")],
            FrameworkHooks::default(),
        )
        .unwrap();

    h.runtime.start(quiet_config()).await.unwrap();
    h.runtime.navigate("/shop").await.unwrap();

    assert_eq!(h.runtime.state().snapshot()["theme"], json!("dark"));
    assert!(!h.runtime.state().snapshot().contains_key("cart"));

    // While mounted the app hears host-side changes.
    h.runtime.state().set_host_state(patch("theme", json!("sepia")));
    assert_eq!(heard.load(Ordering::SeqCst), 1);

    // Unmount deregisters everything the instance registered.
    h.runtime.navigate("/").await.unwrap();
    assert_eq!(h.runtime.app_status("shop"), Some(AppStatus::NotMounted));
    h.runtime.state().set_host_state(patch("theme", json!("light")));
    assert_eq!(heard.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_host_listener_sees_next_and_previous() {
    let h = harness_with_state(initial());
    let seen: Arc<std::sync::Mutex<Vec<(Value, Value)>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    h.runtime.state().on_host_state_change(
        Arc::new(move |next, prev| {
            seen_clone
                .lock()
                .unwrap()
                .push((next["theme"].clone(), prev["theme"].clone()));
        }),
        false,
    );

    let shop = h.add_app("shop", "#shop", "/shop");
    h.runtime.start(quiet_config()).await.unwrap();
    h.runtime.navigate("/shop").await.unwrap();
    assert_eq!(shop.count("mount"), 1);

    h.runtime.state().set_host_state(patch("theme", json!("dark")));
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[(json!("dark"), json!("light"))]
    );
}
