//! Host-side framework hooks.
//!
//! Framework hooks run around application lifecycles and receive the
//! descriptor of the affected app. A hook failure is a framework error and
//! aborts the transition without breaking the application.

use atrium_core::{AppDescriptor, LifecycleError};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{RuntimeError, RuntimeResult};

/// A framework hook: `descriptor -> future of unit-or-error`.
pub type AppHookFn =
    Arc<dyn Fn(AppDescriptor) -> BoxFuture<'static, Result<(), LifecycleError>> + Send + Sync>;

/// Wrap an async closure into an [`AppHookFn`].
pub fn app_hook<F, Fut>(f: F) -> AppHookFn
where
    F: Fn(AppDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), LifecycleError>> + Send + 'static,
{
    Arc::new(move |descriptor| Box::pin(f(descriptor)))
}

/// Hooks the host attaches to every registered application's transitions.
#[derive(Default, Clone)]
pub struct FrameworkHooks {
    /// Run before an application's entry is executed.
    pub before_load: Vec<AppHookFn>,
    /// Run before an application mounts.
    pub before_mount: Vec<AppHookFn>,
    /// Run after an application mounted.
    pub after_mount: Vec<AppHookFn>,
    /// Run before an application unmounts.
    pub before_unmount: Vec<AppHookFn>,
    /// Run after an application unmounted.
    pub after_unmount: Vec<AppHookFn>,
}

impl FrameworkHooks {
    /// Empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a before-load hook.
    #[must_use]
    pub fn with_before_load(mut self, hook: AppHookFn) -> Self {
        self.before_load.push(hook);
        self
    }

    /// Append a before-mount hook.
    #[must_use]
    pub fn with_before_mount(mut self, hook: AppHookFn) -> Self {
        self.before_mount.push(hook);
        self
    }

    /// Append an after-mount hook.
    #[must_use]
    pub fn with_after_mount(mut self, hook: AppHookFn) -> Self {
        self.after_mount.push(hook);
        self
    }

    /// Append a before-unmount hook.
    #[must_use]
    pub fn with_before_unmount(mut self, hook: AppHookFn) -> Self {
        self.before_unmount.push(hook);
        self
    }

    /// Append an after-unmount hook.
    #[must_use]
    pub fn with_after_unmount(mut self, hook: AppHookFn) -> Self {
        self.after_unmount.push(hook);
        self
    }

    /// Merge another hook set into this one, preserving registration order.
    pub fn extend(&mut self, other: FrameworkHooks) {
        self.before_load.extend(other.before_load);
        self.before_mount.extend(other.before_mount);
        self.after_mount.extend(other.after_mount);
        self.before_unmount.extend(other.before_unmount);
        self.after_unmount.extend(other.after_unmount);
    }
}

impl fmt::Debug for FrameworkHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameworkHooks")
            .field("before_load", &self.before_load.len())
            .field("before_mount", &self.before_mount.len())
            .field("after_mount", &self.after_mount.len())
            .field("before_unmount", &self.before_unmount.len())
            .field("after_unmount", &self.after_unmount.len())
            .finish()
    }
}

/// Run a set of hooks in order against a descriptor.
///
/// # Errors
///
/// Returns [`RuntimeError::Hook`] for the first hook that fails.
pub async fn run_hooks(
    phase: &str,
    hooks: &[AppHookFn],
    descriptor: &AppDescriptor,
) -> RuntimeResult<()> {
    for hook in hooks {
        hook(descriptor.clone())
            .await
            .map_err(|e| RuntimeError::Hook {
                phase: phase.to_string(),
                message: e.to_string(),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn descriptor() -> AppDescriptor {
        AppDescriptor::new("shop", "http://localhost:2222", "#shop", "/shop")
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = log.clone();
        let b = log.clone();
        let hooks = FrameworkHooks::new()
            .with_before_mount(app_hook(move |_d| {
                let log = a.clone();
                async move {
                    log.lock().unwrap().push(1);
                    Ok(())
                }
            }))
            .with_before_mount(app_hook(move |d| {
                let log = b.clone();
                async move {
                    assert_eq!(d.name, "shop");
                    log.lock().unwrap().push(2);
                    Ok(())
                }
            }));

        run_hooks("before_mount", &hooks.before_mount, &descriptor())
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_hook_failure_maps_to_framework_error() {
        let hooks = FrameworkHooks::new()
            .with_before_load(app_hook(|_d| async { Err(LifecycleError::msg("nope")) }));
        let err = run_hooks("before_load", &hooks.before_load, &descriptor())
            .await
            .unwrap_err();
        match err {
            RuntimeError::Hook { phase, message } => {
                assert_eq!(phase, "before_load");
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
