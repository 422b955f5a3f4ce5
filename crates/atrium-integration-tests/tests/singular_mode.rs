//! Singular-mode ordering: a mount never overlaps the previous unmount.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use atrium_core::{AppDescriptor, AppStatus, RawExports, lifecycle_fn};
use atrium_runtime::FrameworkHooks;
use atrium_test::{register_exports, script_url, serve_app};

use common::{harness, quiet_config};

type Timeline = Arc<Mutex<Vec<String>>>;

fn timed_exports(label: &str, log: Timeline, unmount_delay: Duration) -> RawExports {
    let mount_label = format!("{label}:mount");
    let unmount_label = format!("{label}:unmount");
    let mount_log = Arc::clone(&log);
    let unmount_log = log;
    RawExports::new()
        .with_mount(lifecycle_fn(move |_props| {
            let log = Arc::clone(&mount_log);
            let label = mount_label.clone();
            async move {
                log.lock().unwrap().push(label);
                Ok(())
            }
        }))
        .with_unmount(lifecycle_fn(move |_props| {
            let log = Arc::clone(&unmount_log);
            let label = unmount_label.clone();
            async move {
                tokio::time::sleep(unmount_delay).await;
                log.lock().unwrap().push(label);
                Ok(())
            }
        }))
}

#[tokio::test]
async fn test_slow_unmount_finishes_before_the_next_mount() {
    let h = harness();
    let log: Timeline = Arc::new(Mutex::new(Vec::new()));

    for (name, delay) in [("shop", Duration::from_millis(50)), ("admin", Duration::ZERO)] {
        let entry = serve_app(&h.fetcher, name);
        register_exports(
            h.runtime.scripts(),
            script_url(name),
            timed_exports(name, Arc::clone(&log), delay),
        );
        h.runtime.surface().insert_container(format!("#{name}"));
        h.runtime
            .register_apps(
                vec![AppDescriptor::new(
                    name,
                    entry.as_str(),
                    format!("#{name}"),
                    format!("/{name}").as_str(),
                )],
                FrameworkHooks::default(),
            )
            .unwrap();
    }

    h.runtime.start(quiet_config()).await.unwrap();
    h.runtime.navigate("/shop").await.unwrap();
    h.runtime.navigate("/admin").await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["shop:mount", "shop:unmount", "admin:mount"]
    );
    assert_eq!(h.runtime.app_status("shop"), Some(AppStatus::NotMounted));
    assert_eq!(h.runtime.app_status("admin"), Some(AppStatus::Mounted));
}

#[tokio::test]
async fn test_queued_trigger_settles_after_the_running_pass() {
    let h = harness();
    let log: Timeline = Arc::new(Mutex::new(Vec::new()));

    let entry = serve_app(&h.fetcher, "shop");
    register_exports(
        h.runtime.scripts(),
        script_url("shop"),
        timed_exports("shop", Arc::clone(&log), Duration::from_millis(30)),
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

    // Navigate away and immediately back: the second trigger queues behind
    // the slow unmount pass and observes the final location.
    let (a, b) = tokio::join!(h.runtime.navigate("/"), h.runtime.navigate("/shop"));
    a.unwrap();
    b.unwrap();

    assert_eq!(h.runtime.navigation().location().path(), "/shop");
    assert_eq!(h.runtime.app_status("shop"), Some(AppStatus::Mounted));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["shop:mount", "shop:unmount", "shop:mount"]
    );
}

#[tokio::test]
async fn test_queued_navigation_still_honors_guards() {
    let h = harness();
    let log: Timeline = Arc::new(Mutex::new(Vec::new()));

    for (name, delay) in [("shop", Duration::from_millis(50)), ("admin", Duration::ZERO)] {
        let entry = serve_app(&h.fetcher, name);
        register_exports(
            h.runtime.scripts(),
            script_url(name),
            timed_exports(name, Arc::clone(&log), delay),
        );
        h.runtime.surface().insert_container(format!("#{name}"));
        h.runtime
            .register_apps(
                vec![AppDescriptor::new(
                    name,
                    entry.as_str(),
                    format!("#{name}"),
                    format!("/{name}").as_str(),
                )],
                FrameworkHooks::default(),
            )
            .unwrap();
    }
    h.runtime
        .add_navigation_guard(Arc::new(|event| event.to.path() != "/admin"));

    h.runtime.start(quiet_config()).await.unwrap();
    h.runtime.navigate("/shop").await.unwrap();

    // The first navigation holds a pass open through the slow unmount; the
    // guarded one lands mid-pass and queues behind it.
    let (a, b) = tokio::join!(h.runtime.navigate("/"), h.runtime.navigate("/admin"));
    a.unwrap();
    b.unwrap();

    // The queued navigation was cancelled and reverted, not routed.
    assert_eq!(h.runtime.navigation().location().path(), "/");
    assert_eq!(h.runtime.app_status("admin"), Some(AppStatus::NotLoaded));
    assert_eq!(h.runtime.app_status("shop"), Some(AppStatus::NotMounted));
    assert_eq!(*log.lock().unwrap(), vec!["shop:mount", "shop:unmount"]);
}
