//! The application registry and the routing diff.

use atrium_core::{AppDescriptor, AppStatus, Location};
use atrium_events::AppStatusDetail;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{RuntimeError, RuntimeResult};
use crate::loader::LoadedApp;

/// A registered application with its per-instance runtime state.
pub struct AppInstance {
    /// Immutable registration record.
    pub descriptor: AppDescriptor,
    /// Stable id of this activation, used for scoping and attribution.
    pub instance_id: String,
    status: Mutex<AppStatus>,
    unload_requested: AtomicBool,
    /// Serializes load attempts for this instance.
    pub(crate) load_lock: tokio::sync::Mutex<()>,
    loaded: Mutex<Option<Arc<LoadedApp>>>,
}

impl AppInstance {
    pub(crate) fn new(descriptor: AppDescriptor) -> Arc<Self> {
        let instance_id = format!(
            "{}-{}",
            descriptor.name,
            &Uuid::new_v4().simple().to_string()[..8]
        );
        Arc::new(Self {
            descriptor,
            instance_id,
            status: Mutex::new(AppStatus::NotLoaded),
            unload_requested: AtomicBool::new(false),
            load_lock: tokio::sync::Mutex::new(()),
            loaded: Mutex::new(None),
        })
    }

    /// Current lifecycle status.
    pub fn status(&self) -> AppStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_status(&self, status: AppStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Whether the activity rule matches the location.
    pub fn should_be_active(&self, location: &Location) -> bool {
        self.descriptor.active_rule.matches(location)
    }

    pub(crate) fn request_unload(&self) {
        self.unload_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn unload_requested(&self) -> bool {
        self.unload_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_unload_request(&self) {
        self.unload_requested.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_loaded(&self, loaded: Arc<LoadedApp>) {
        *self.loaded.lock().unwrap_or_else(|e| e.into_inner()) = Some(loaded);
    }

    pub(crate) fn loaded(&self) -> Option<Arc<LoadedApp>> {
        self.loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn take_loaded(&self) -> Option<Arc<LoadedApp>> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl std::fmt::Debug for AppInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppInstance")
            .field("name", &self.descriptor.name)
            .field("instance_id", &self.instance_id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// The routing diff for one pass: which instances change, and how.
#[derive(Default)]
pub struct AppChanges {
    /// Instances whose unload was requested and that are ready to unload.
    pub to_unload: Vec<Arc<AppInstance>>,
    /// Mounted instances whose rule no longer matches.
    pub to_unmount: Vec<Arc<AppInstance>>,
    /// Unloaded instances whose rule matches.
    pub to_load: Vec<Arc<AppInstance>>,
    /// Loaded-but-idle instances whose rule matches.
    pub to_mount: Vec<Arc<AppInstance>>,
}

impl AppChanges {
    /// Whether this pass changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_unload.is_empty()
            && self.to_unmount.is_empty()
            && self.to_load.is_empty()
            && self.to_mount.is_empty()
    }
}

/// Registry of all applications known to the runtime.
#[derive(Default)]
pub struct AppRegistry {
    apps: Mutex<Vec<Arc<AppInstance>>>,
}

impl AppRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::DuplicateApp`] when the name is taken and
    /// [`RuntimeError::EmptyContainer`] when no container selector was given.
    pub fn register(&self, descriptor: AppDescriptor) -> RuntimeResult<Arc<AppInstance>> {
        if descriptor.container.trim().is_empty() {
            return Err(RuntimeError::EmptyContainer {
                name: descriptor.name.clone(),
            });
        }
        let mut apps = self.apps.lock().unwrap_or_else(|e| e.into_inner());
        if apps.iter().any(|app| app.descriptor.name == descriptor.name) {
            return Err(RuntimeError::DuplicateApp {
                name: descriptor.name,
            });
        }
        let instance = AppInstance::new(descriptor);
        apps.push(instance.clone());
        Ok(instance)
    }

    /// Look up an application by name.
    pub fn get(&self, name: &str) -> Option<Arc<AppInstance>> {
        self.apps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|app| app.descriptor.name == name)
            .cloned()
    }

    /// Snapshot of all registered instances, in registration order.
    pub fn all(&self) -> Vec<Arc<AppInstance>> {
        self.apps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Status details for event payloads.
    pub fn statuses(&self) -> Vec<AppStatusDetail> {
        self.all()
            .iter()
            .map(|app| AppStatusDetail {
                name: app.descriptor.name.clone(),
                status: app.status().to_string(),
            })
            .collect()
    }

    /// Compute the routing diff against a location.
    ///
    /// Instances mid-transition or broken are left alone; they are picked up
    /// by a later pass once their in-flight transition settles.
    pub fn app_changes(&self, location: &Location) -> AppChanges {
        let mut changes = AppChanges::default();
        for app in self.all() {
            let active = app.should_be_active(location);
            match app.status() {
                AppStatus::NotLoaded | AppStatus::LoadError => {
                    if active {
                        changes.to_load.push(app);
                    }
                }
                AppStatus::NotBootstrapped | AppStatus::NotMounted => {
                    if app.unload_requested() {
                        changes.to_unload.push(app);
                    } else if active {
                        changes.to_mount.push(app);
                    }
                }
                AppStatus::Mounted => {
                    if !active {
                        changes.to_unmount.push(app);
                    }
                }
                // In-flight or terminal; skip.
                _ => {}
            }
        }
        changes
    }
}
