//! Shared harness for runtime integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use atrium_core::Location;
use atrium_entry::Fetcher;
use atrium_runtime::{AtriumRuntime, FrameworkHooks, RuntimeConfig};
use atrium_test::{ScriptedApp, StaticFetcher, install_app};
use serde_json::{Map, Value};

/// A runtime wired to an in-memory fetcher.
pub struct Harness {
    pub runtime: Arc<AtriumRuntime>,
    pub fetcher: Arc<StaticFetcher>,
}

/// Build an unstarted runtime at `http://localhost/`.
pub fn harness() -> Harness {
    harness_with_state(Map::new())
}

/// Build an unstarted runtime with the given initial cross-app state.
pub fn harness_with_state(initial_state: Map<String, Value>) -> Harness {
    let fetcher = StaticFetcher::new();
    let runtime = AtriumRuntime::builder()
        .with_fetcher(Arc::clone(&fetcher) as Arc<dyn Fetcher>)
        .with_initial_location(Location::parse("http://localhost/").unwrap())
        .with_initial_state(initial_state)
        .build();
    Harness { runtime, fetcher }
}

/// A routing configuration with prefetch off, so fetch counts in tests only
/// reflect real loads.
pub fn quiet_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.prefetch = atrium_runtime::PrefetchConfig::Disabled;
    config
}

impl Harness {
    /// Serve a scripted app, register it, and make sure its container
    /// exists on the surface.
    pub fn add_app(&self, name: &str, container: &str, rule: &str) -> ScriptedApp {
        let app = ScriptedApp::new();
        self.add_scripted(&app, name, container, rule);
        app
    }

    /// Like [`add_app`](Self::add_app) for a pre-built [`ScriptedApp`].
    pub fn add_scripted(&self, app: &ScriptedApp, name: &str, container: &str, rule: &str) {
        let descriptor = install_app(
            &self.fetcher,
            self.runtime.scripts(),
            app,
            name,
            container,
            rule,
        );
        self.runtime.surface().insert_container(container);
        self.runtime
            .register_apps(vec![descriptor], FrameworkHooks::default())
            .unwrap();
    }
}
