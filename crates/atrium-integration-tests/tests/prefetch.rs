//! Prefetch warms resolver caches in the background without executing
//! anything.

mod common;

use std::sync::Arc;
use std::time::Duration;

use atrium_core::AppStatus;
use atrium_runtime::{PrefetchConfig, RuntimeConfig};
use atrium_test::StaticFetcher;

use common::harness;

/// Poll until the fetcher has seen `expected` requests, or panic.
async fn wait_for_calls(fetcher: &Arc<StaticFetcher>, expected: usize) {
    let deadline = async {
        while fetcher.calls() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), deadline)
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {expected} fetches, saw {} before the deadline",
                fetcher.calls()
            )
        });
}

#[tokio::test]
async fn test_prefetch_all_warms_every_entry_without_mounting() {
    let h = harness();
    let shop = h.add_app("shop", "#shop", "/shop");
    let admin = h.add_app("admin", "#admin", "/admin");

    let mut config = RuntimeConfig::default();
    config.prefetch = PrefetchConfig::All;
    h.runtime.start(config).await.unwrap();

    // Markup, stylesheet, and script body per application.
    wait_for_calls(&h.fetcher, 6).await;
    assert_eq!(h.runtime.app_status("shop"), Some(AppStatus::NotLoaded));
    assert_eq!(h.runtime.app_status("admin"), Some(AppStatus::NotLoaded));
    assert!(shop.calls().is_empty());
    assert!(admin.calls().is_empty());

    // The warmed entry mounts without touching the network again.
    h.runtime.navigate("/shop").await.unwrap();
    assert_eq!(h.runtime.app_status("shop"), Some(AppStatus::Mounted));
    assert_eq!(h.fetcher.calls(), 6);
}

#[tokio::test]
async fn test_named_prefetch_warms_only_the_named_entries() {
    let h = harness();
    h.add_app("shop", "#shop", "/shop");
    h.add_app("admin", "#admin", "/admin");

    let mut config = RuntimeConfig::default();
    config.prefetch = PrefetchConfig::Named(vec!["admin".to_string()]);
    h.runtime.start(config).await.unwrap();

    wait_for_calls(&h.fetcher, 3).await;
    // Give a stray shop warm a chance to surface before asserting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.fetcher.calls(), 3);
}

#[tokio::test]
async fn test_after_first_mount_defers_warming() {
    let h = harness();
    h.add_app("shop", "#shop", "/shop");
    h.add_app("admin", "#admin", "/admin");

    // The default strategy warms the rest once the first mount settles.
    h.runtime.start(RuntimeConfig::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.fetcher.calls(), 0);

    // Mounting shop costs two fetches (markup and stylesheet); the first
    // mount then triggers warming admin's three.
    h.runtime.navigate("/shop").await.unwrap();
    wait_for_calls(&h.fetcher, 5).await;
    assert_eq!(h.runtime.app_status("admin"), Some(AppStatus::NotLoaded));
}
