//! Convenience effects layered over the event bus.

use std::sync::Arc;
use tracing::{debug, warn};

use atrium_core::AppStatus;
use atrium_events::RuntimeEvent;

use crate::host::AtriumRuntime;

impl AtriumRuntime {
    /// Run `f` once, after the first application finished mounting. If that
    /// already happened, `f` runs immediately on a background task.
    pub fn run_after_first_mounted<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.first_mount_done() {
            tokio::spawn(async move { f() });
            return;
        }
        let mut rx = self.events().subscribe();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(*event, RuntimeEvent::FirstMount { .. }) {
                    f();
                    break;
                }
            }
        });
    }

    /// Navigate to `target` whenever a routing pass settles with nothing
    /// mounted, so the host never shows an empty shell.
    pub fn set_default_mount_app(self: &Arc<Self>, target: impl Into<String>) {
        let target = target.into();
        let this = Arc::downgrade(self);
        let mut rx = self.events().subscribe();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !matches!(
                    *event,
                    RuntimeEvent::NoAppChange { .. } | RuntimeEvent::AppChange { .. }
                ) {
                    continue;
                }
                let Some(runtime) = this.upgrade() else {
                    break;
                };
                let nothing_mounted = runtime
                    .registry()
                    .all()
                    .iter()
                    .all(|app| app.status() != AppStatus::Mounted);
                if !nothing_mounted {
                    continue;
                }
                if runtime.navigation().location().path() == target {
                    // Already at the default and still empty; navigating
                    // again would spin.
                    continue;
                }
                debug!(target = %target, "nothing mounted, navigating to default app");
                if let Err(err) = runtime.navigate(&target).await {
                    warn!(error = %err, "default-app navigation failed");
                }
            }
        });
    }
}
