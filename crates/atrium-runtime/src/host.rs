//! The host runtime.
//!
//! [`AtriumRuntime`] owns every seam: the registry, the entry resolver, the
//! script registry, the shared global context, the mount surface, and the
//! three buses. Everything else in this crate is an `impl` block over it.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{info, warn};

use atrium_core::{AppDescriptor, AppStatus, Location, MountSurface, NavigationOrigin};
use atrium_entry::{EntryResolver, Fetcher, HttpFetcher};
use atrium_events::{GlobalStateBus, NavigationBus, NavigationEvent, RuntimeEventBus};
use atrium_sandbox::{ScriptRegistry, SharedGlobal};

use crate::config::{RuntimeConfig, SandboxConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::hooks::FrameworkHooks;
use crate::lifecycle::SingletonBarrier;
use crate::prefetch::PrefetchStrategy;
use crate::registry::AppRegistry;
use crate::reroute::RerouteState;

/// Veto over a navigation before the routing pass acts on it. Returning
/// `false` cancels the navigation and the location is silently reverted.
pub type NavigationGuard = Arc<dyn Fn(&NavigationEvent) -> bool + Send + Sync>;

/// Default location the runtime starts at when none is given.
const DEFAULT_LOCATION: &str = "http://localhost/";

/// The orchestrating host.
pub struct AtriumRuntime {
    config: Mutex<RuntimeConfig>,
    started: AtomicBool,
    registry: AppRegistry,
    resolver: Arc<EntryResolver>,
    scripts: ScriptRegistry,
    shared_global: Arc<SharedGlobal>,
    surface: Arc<MountSurface>,
    state: Arc<GlobalStateBus>,
    events: RuntimeEventBus,
    navigation: Arc<NavigationBus>,
    hooks: Mutex<FrameworkHooks>,
    reroute_state: Mutex<RerouteState>,
    first_mount_fired: AtomicBool,
    singleton: SingletonBarrier,
    guards: Mutex<Vec<NavigationGuard>>,
    prefetch_override: Mutex<Option<PrefetchStrategy>>,
}

/// Builder for [`AtriumRuntime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    fetcher: Option<Arc<dyn Fetcher>>,
    initial_location: Option<Location>,
    initial_state: Map<String, Value>,
    prefetch_strategy: Option<PrefetchStrategy>,
}

impl RuntimeBuilder {
    /// Use a custom fetcher instead of the HTTP default.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Start at `location` instead of the localhost default.
    #[must_use]
    pub fn with_initial_location(mut self, location: Location) -> Self {
        self.initial_location = Some(location);
        self
    }

    /// Declare the initial cross-app state.
    #[must_use]
    pub fn with_initial_state(mut self, state: Map<String, Value>) -> Self {
        self.initial_state = state;
        self
    }

    /// Override the configured prefetch strategy, e.g. with a classifier.
    #[must_use]
    pub fn with_prefetch_strategy(mut self, strategy: PrefetchStrategy) -> Self {
        self.prefetch_strategy = Some(strategy);
        self
    }

    /// Build the runtime.
    #[must_use]
    pub fn build(self) -> Arc<AtriumRuntime> {
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::new()));
        let location = self
            .initial_location
            .unwrap_or_else(|| Location::parse(DEFAULT_LOCATION).expect("default location is valid"));
        Arc::new(AtriumRuntime {
            config: Mutex::new(RuntimeConfig::default()),
            started: AtomicBool::new(false),
            registry: AppRegistry::new(),
            resolver: EntryResolver::new(fetcher),
            scripts: ScriptRegistry::new(),
            shared_global: SharedGlobal::new(),
            surface: Arc::new(MountSurface::new()),
            state: GlobalStateBus::new(self.initial_state),
            events: RuntimeEventBus::new(),
            navigation: NavigationBus::new(location),
            hooks: Mutex::new(FrameworkHooks::default()),
            reroute_state: Mutex::new(RerouteState::default()),
            first_mount_fired: AtomicBool::new(false),
            singleton: SingletonBarrier::new(),
            guards: Mutex::new(Vec::new()),
            prefetch_override: Mutex::new(self.prefetch_strategy),
        })
    }
}

impl AtriumRuntime {
    /// Start building a runtime.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Register applications and attach framework hooks to their lifecycles.
    ///
    /// Containers are not created here; the host declares them on the
    /// [`MountSurface`] itself, and a missing container surfaces as a
    /// retryable load error of the affected application.
    ///
    /// # Errors
    ///
    /// Rejects duplicate names and empty container selectors; earlier
    /// registrations in the batch stay in place.
    pub fn register_apps(
        &self,
        apps: Vec<AppDescriptor>,
        hooks: FrameworkHooks,
    ) -> RuntimeResult<()> {
        for descriptor in apps {
            info!(app = %descriptor.name, container = %descriptor.container, "registering application");
            self.registry.register(descriptor)?;
        }
        self.hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(hooks);
        Ok(())
    }

    /// Start routing: store the configuration, watch the navigation bus, and
    /// run the initial pass over the current location.
    ///
    /// Idempotent; a second start is ignored.
    ///
    /// # Errors
    ///
    /// Surfaces host-hook failures from the initial routing pass.
    pub async fn start(self: &Arc<Self>, config: RuntimeConfig) -> RuntimeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("runtime already started");
            return Ok(());
        }
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = config;
        info!("runtime starting");

        self.spawn_navigation_listener();
        self.schedule_prefetch();
        self.reroute(None).await
    }

    /// Run a routing pass without a navigation, picking up registrations and
    /// status changes.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotStarted`] before [`start`](Self::start).
    pub async fn trigger_app_change(self: &Arc<Self>) -> RuntimeResult<()> {
        self.ensure_started()?;
        self.reroute(None).await
    }

    /// Navigate to `target` (absolute or relative) and route.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotStarted`] before start, or an invalid
    /// location error for an unresolvable target.
    pub async fn navigate(self: &Arc<Self>, target: &str) -> RuntimeResult<()> {
        self.ensure_started()?;
        let event = self.navigation.navigate(target, NavigationOrigin::Framework)?;
        if self.config_snapshot().url_reroute_only && event.from == event.to {
            return Ok(());
        }
        self.reroute(Some(event)).await
    }

    /// Unmount (if needed) and unload an application, returning it to the
    /// not-loaded state. If its rule still matches, the following pass
    /// reloads it from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownApp`] for an unregistered name.
    pub async fn unload_app(self: &Arc<Self>, name: &str) -> RuntimeResult<()> {
        self.ensure_started()?;
        let app = self
            .registry
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownApp {
                name: name.to_string(),
            })?;
        app.request_unload();
        if app.status() == AppStatus::Mounted {
            // Failures here already broke the instance; the pass moves on.
            let _ = self.run_unmount(&app).await;
        }
        self.reroute(None).await
    }

    /// Attach a navigation guard. Guards run in registration order; the
    /// first `false` cancels the navigation.
    pub fn add_navigation_guard(&self, guard: NavigationGuard) {
        self.guards
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(guard);
    }

    /// Current status of a registered application.
    #[must_use]
    pub fn app_status(&self, name: &str) -> Option<AppStatus> {
        self.registry.get(name).map(|app| app.status())
    }

    /// The mount surface.
    #[must_use]
    pub fn surface(&self) -> &Arc<MountSurface> {
        &self.surface
    }

    /// The navigation bus.
    #[must_use]
    pub fn navigation(&self) -> &Arc<NavigationBus> {
        &self.navigation
    }

    /// The routing event bus.
    #[must_use]
    pub fn events(&self) -> &RuntimeEventBus {
        &self.events
    }

    /// The script module registry.
    #[must_use]
    pub fn scripts(&self) -> &ScriptRegistry {
        &self.scripts
    }

    /// The entry resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<EntryResolver> {
        &self.resolver
    }

    /// The cross-app state bus.
    #[must_use]
    pub fn state(&self) -> &Arc<GlobalStateBus> {
        &self.state
    }

    /// The shared global context backing every sandbox.
    #[must_use]
    pub fn shared_global(&self) -> &Arc<SharedGlobal> {
        &self.shared_global
    }

    fn spawn_navigation_listener(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut rx = self.navigation.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                // Framework-origin navigations reroute inline in navigate().
                if event.origin != NavigationOrigin::External {
                    continue;
                }
                let Some(runtime) = weak.upgrade() else {
                    break;
                };
                if let Err(err) = runtime.reroute(Some(event)).await {
                    warn!(error = %err, "routing pass after navigation failed");
                }
            }
        });
    }

    fn ensure_started(&self) -> RuntimeResult<()> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RuntimeError::NotStarted)
        }
    }

    pub(crate) fn navigation_allowed(&self, event: &NavigationEvent) -> bool {
        let guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
        guards.iter().all(|guard| guard(event))
    }

    pub(crate) fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub(crate) fn reroute_state(&self) -> &Mutex<RerouteState> {
        &self.reroute_state
    }

    pub(crate) fn singleton(&self) -> &SingletonBarrier {
        &self.singleton
    }

    pub(crate) fn hooks_snapshot(&self) -> FrameworkHooks {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn config_snapshot(&self) -> RuntimeConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn sandbox_config(&self) -> SandboxConfig {
        self.config_snapshot().sandbox
    }

    pub(crate) fn is_singular(&self) -> bool {
        self.config_snapshot().singular
    }

    /// Record the first mount; returns `true` exactly once.
    pub(crate) fn mark_first_mount(&self) -> bool {
        !self.first_mount_fired.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn first_mount_done(&self) -> bool {
        self.first_mount_fired.load(Ordering::SeqCst)
    }

    pub(crate) fn prefetch_strategy(&self) -> PrefetchStrategy {
        let override_slot = self
            .prefetch_override
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match override_slot.as_ref() {
            Some(strategy) => strategy.clone(),
            None => PrefetchStrategy::from(self.config_snapshot().prefetch),
        }
    }
}

impl std::fmt::Debug for AtriumRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtriumRuntime")
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("apps", &self.registry.all().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_triggers_require_start() {
        let runtime = AtriumRuntime::builder().build();
        let err = runtime.trigger_app_change().await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotStarted));
        let err = runtime.navigate("/shop").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotStarted));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let runtime = AtriumRuntime::builder().build();
        runtime.start(RuntimeConfig::default()).await.unwrap();
        runtime.start(RuntimeConfig::default()).await.unwrap();
        runtime.trigger_app_change().await.unwrap();
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let runtime = AtriumRuntime::builder().build();
        let apps = vec![
            AppDescriptor::new("shop", "http://localhost:2222", "#shop", "/shop"),
            AppDescriptor::new("shop", "http://localhost:3333", "#shop", "/other"),
        ];
        let err = runtime
            .register_apps(apps, FrameworkHooks::default())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateApp { .. }));
        // The first registration of the batch survives.
        assert_eq!(runtime.app_status("shop"), Some(AppStatus::NotLoaded));
    }
}
