//! The exported lifecycle contract produced by a micro-app's entry script.

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::surface::MountSurface;

/// Error returned by an application lifecycle function.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct LifecycleError(pub String);

impl LifecycleError {
    /// Build an error from any displayable value.
    pub fn msg(msg: impl fmt::Display) -> Self {
        Self(msg.to_string())
    }
}

/// A single lifecycle function: `props -> future of unit-or-error`.
pub type LifecycleFn =
    Arc<dyn Fn(LifecycleProps) -> BoxFuture<'static, Result<(), LifecycleError>> + Send + Sync>;

/// Wrap an async closure into a [`LifecycleFn`].
pub fn lifecycle_fn<F, Fut>(f: F) -> LifecycleFn
where
    F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), LifecycleError>> + Send + 'static,
{
    Arc::new(move |props| Box::pin(f(props)))
}

/// Listener invoked with `(next_state, previous_state)` on every change.
pub type StateListener = Arc<dyn Fn(&Map<String, Value>, &Map<String, Value>) + Send + Sync>;

/// Per-instance handle onto the cross-app state bus.
///
/// Implemented by the state bus; handed to applications through
/// [`LifecycleProps`] so children never touch each other's sandboxed globals.
pub trait GlobalStateActions: Send + Sync {
    /// Apply a patch to the shared state; returns the keys that changed.
    fn set_global_state(&self, patch: Map<String, Value>) -> Vec<String>;
    /// Register a change listener for this instance. With `immediate`, the
    /// listener fires once right away with the current state.
    fn on_global_state_change(&self, listener: StateListener, immediate: bool);
    /// Deregister every listener this instance registered.
    fn off_global_state_change(&self);
}

/// Props handed to every lifecycle invocation.
#[derive(Clone)]
pub struct LifecycleProps {
    /// Application name.
    pub name: String,
    /// Instance id of the current activation.
    pub instance_id: String,
    /// The mount surface, present for mount/unmount phases.
    pub surface: Option<Arc<MountSurface>>,
    /// Selector of the container the app's wrapper lives under.
    pub container: Option<String>,
    /// User props from the descriptor (or an `update` call).
    pub props: Value,
    /// State bus handle for this instance.
    pub state: Option<Arc<dyn GlobalStateActions>>,
}

impl LifecycleProps {
    /// Minimal props carrying only the app identity.
    #[must_use]
    pub fn bare(name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_id: instance_id.into(),
            surface: None,
            container: None,
            props: Value::Null,
            state: None,
        }
    }
}

impl fmt::Debug for LifecycleProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleProps")
            .field("name", &self.name)
            .field("instance_id", &self.instance_id)
            .field("container", &self.container)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

/// Export-surface validation failure.
#[derive(Debug, Error)]
pub enum ExportsError {
    /// No mount lifecycle was exported.
    #[error("application {app} does not export a mount lifecycle")]
    MissingMount {
        /// The application name.
        app: String,
    },
    /// No unmount lifecycle was exported.
    #[error("application {app} does not export an unmount lifecycle")]
    MissingUnmount {
        /// The application name.
        app: String,
    },
}

/// Raw export surface as discovered from an entry script, before validation.
#[derive(Default, Clone)]
pub struct RawExports {
    /// Optional bootstrap hook.
    pub bootstrap: Option<LifecycleFn>,
    /// Mount hook (required for a valid surface).
    pub mount: Option<LifecycleFn>,
    /// Unmount hook (required for a valid surface).
    pub unmount: Option<LifecycleFn>,
    /// Optional unload hook.
    pub unload: Option<LifecycleFn>,
    /// Optional update hook.
    pub update: Option<LifecycleFn>,
}

impl RawExports {
    /// Empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bootstrap hook.
    #[must_use]
    pub fn with_bootstrap(mut self, f: LifecycleFn) -> Self {
        self.bootstrap = Some(f);
        self
    }

    /// Set the mount hook.
    #[must_use]
    pub fn with_mount(mut self, f: LifecycleFn) -> Self {
        self.mount = Some(f);
        self
    }

    /// Set the unmount hook.
    #[must_use]
    pub fn with_unmount(mut self, f: LifecycleFn) -> Self {
        self.unmount = Some(f);
        self
    }

    /// Set the unload hook.
    #[must_use]
    pub fn with_unload(mut self, f: LifecycleFn) -> Self {
        self.unload = Some(f);
        self
    }

    /// Set the update hook.
    #[must_use]
    pub fn with_update(mut self, f: LifecycleFn) -> Self {
        self.update = Some(f);
        self
    }

    /// Whether this smells like a usable lifecycle surface.
    ///
    /// Used during fallback discovery to decide whether a candidate binding
    /// actually carries lifecycles.
    #[must_use]
    pub fn looks_valid(&self) -> bool {
        self.mount.is_some() && self.unmount.is_some()
    }

    /// Validate into a usable export surface.
    ///
    /// # Errors
    ///
    /// Returns [`ExportsError`] if mount or unmount is absent; this is a
    /// fatal registration error for the owning application.
    pub fn validate(self, app: &str) -> Result<AppExports, ExportsError> {
        let mount = self.mount.ok_or_else(|| ExportsError::MissingMount {
            app: app.to_string(),
        })?;
        let unmount = self.unmount.ok_or_else(|| ExportsError::MissingUnmount {
            app: app.to_string(),
        })?;
        Ok(AppExports {
            bootstrap: self.bootstrap,
            mount,
            unmount,
            unload: self.unload,
            update: self.update,
        })
    }
}

impl fmt::Debug for RawExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawExports")
            .field("bootstrap", &self.bootstrap.is_some())
            .field("mount", &self.mount.is_some())
            .field("unmount", &self.unmount.is_some())
            .field("unload", &self.unload.is_some())
            .field("update", &self.update.is_some())
            .finish()
    }
}

/// Validated export surface of a micro-app.
#[derive(Clone)]
pub struct AppExports {
    /// Optional bootstrap hook, run once per load.
    pub bootstrap: Option<LifecycleFn>,
    /// Mount hook.
    pub mount: LifecycleFn,
    /// Unmount hook.
    pub unmount: LifecycleFn,
    /// Optional unload hook, run when the app is removed from the registry.
    pub unload: Option<LifecycleFn>,
    /// Optional update hook for prop pushes while mounted.
    pub update: Option<LifecycleFn>,
}

impl fmt::Debug for AppExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppExports")
            .field("bootstrap", &self.bootstrap.is_some())
            .field("unload", &self.unload.is_some())
            .field("update", &self.update.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> LifecycleFn {
        lifecycle_fn(|_props| async { Ok(()) })
    }

    #[test]
    fn test_validate_requires_mount_and_unmount() {
        let err = RawExports::new()
            .with_unmount(noop())
            .validate("shop")
            .unwrap_err();
        assert!(matches!(err, ExportsError::MissingMount { .. }));

        let err = RawExports::new()
            .with_mount(noop())
            .validate("shop")
            .unwrap_err();
        assert!(matches!(err, ExportsError::MissingUnmount { .. }));

        let exports = RawExports::new()
            .with_mount(noop())
            .with_unmount(noop())
            .validate("shop")
            .unwrap();
        assert!(exports.bootstrap.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_fn_invocation() {
        let f = lifecycle_fn(|props: LifecycleProps| async move {
            if props.name == "boom" {
                Err(LifecycleError::msg("exploded"))
            } else {
                Ok(())
            }
        });

        assert!(f(LifecycleProps::bare("ok", "ok-1")).await.is_ok());
        let err = f(LifecycleProps::bare("boom", "boom-1")).await.unwrap_err();
        assert_eq!(err.to_string(), "exploded");
    }
}
