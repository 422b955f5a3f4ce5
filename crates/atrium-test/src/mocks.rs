//! Mock implementations for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use atrium_core::{LifecycleError, RawExports, lifecycle_fn};
use atrium_entry::{FetchError, Fetcher};

/// In-memory [`Fetcher`] serving canned bodies.
///
/// Uses `std::sync::Mutex` internally so bodies can be swapped mid-test,
/// e.g. to let a retry succeed after an injected failure. Unknown addresses
/// answer with a 404 status.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    bodies: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    /// Empty fetcher; every fetch fails with a 404.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `body` for `url`.
    #[must_use]
    pub fn with(self: Arc<Self>, url: impl Into<String>, body: impl Into<String>) -> Arc<Self> {
        self.set(url, body);
        self
    }

    /// Install or replace the body served for `url`.
    pub fn set(&self, url: impl Into<String>, body: impl Into<String>) {
        if let Ok(mut bodies) = self.bodies.lock() {
            bodies.insert(url.into(), body.into());
        }
    }

    /// Drop the body for `url`, turning it back into a 404.
    pub fn remove(&self, url: &str) {
        if let Ok(mut bodies) = self.bodies.lock() {
            bodies.remove(url);
        }
    }

    /// Total number of fetch calls observed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.bodies.lock().ok().and_then(|b| b.get(url).cloned());
        body.ok_or(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// A scripted micro-app: builds a [`RawExports`] surface whose hooks record
/// their invocations and can be told to fail per phase.
#[derive(Debug, Clone, Default)]
pub struct ScriptedApp {
    calls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
}

impl ScriptedApp {
    /// App whose hooks all succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `phase` fail with `message` every time it runs.
    #[must_use]
    pub fn failing(self, phase: &str, message: &str) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(phase.to_string(), message.to_string());
        }
        self
    }

    /// Every hook invocation so far, in order (`"mount"`, `"unmount"`, ...).
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of invocations of `phase`.
    #[must_use]
    pub fn count(&self, phase: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|p| *p == phase).count())
            .unwrap_or_default()
    }

    /// The full lifecycle surface (bootstrap, mount, unmount, unload,
    /// update), every hook recording into this app's call log.
    #[must_use]
    pub fn exports(&self) -> RawExports {
        RawExports::new()
            .with_bootstrap(self.hook("bootstrap"))
            .with_mount(self.hook("mount"))
            .with_unmount(self.hook("unmount"))
            .with_unload(self.hook("unload"))
            .with_update(self.hook("update"))
    }

    /// A minimal surface carrying only mount and unmount.
    #[must_use]
    pub fn minimal_exports(&self) -> RawExports {
        RawExports::new()
            .with_mount(self.hook("mount"))
            .with_unmount(self.hook("unmount"))
    }

    fn hook(&self, phase: &str) -> atrium_core::LifecycleFn {
        let phase = phase.to_string();
        let calls = Arc::clone(&self.calls);
        let failures = Arc::clone(&self.failures);
        lifecycle_fn(move |_props| {
            let phase = phase.clone();
            let calls = Arc::clone(&calls);
            let failures = Arc::clone(&failures);
            async move {
                if let Ok(mut log) = calls.lock() {
                    log.push(phase.clone());
                }
                let failure = failures.lock().ok().and_then(|f| f.get(&phase).cloned());
                match failure {
                    Some(message) => Err(LifecycleError::msg(message)),
                    None => Ok(()),
                }
            }
        })
    }
}
