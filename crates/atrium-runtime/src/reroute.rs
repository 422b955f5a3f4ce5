//! The routing pass.
//!
//! One pass diffs the registry against the current location, tears down what
//! no longer belongs, brings up what does, and brackets the work with
//! routing events. Passes are single-flight: a trigger landing while a pass
//! runs queues behind it and is satisfied by one follow-up pass over the
//! then-current location.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use atrium_core::AppStatus;
use atrium_events::{EventMetadata, NavigationEvent, RuntimeEvent};

use crate::chain::ChainFailure;
use crate::error::{RuntimeError, RuntimeResult};
use crate::host::AtriumRuntime;
use crate::registry::AppInstance;

/// Single-flight state shared by every trigger.
#[derive(Default)]
pub(crate) struct RerouteState {
    underway: bool,
    waiters: Vec<oneshot::Sender<()>>,
    /// Navigations that landed while a pass was underway. The follow-up
    /// pass runs them through the guards before routing.
    pending_navs: Vec<Arc<NavigationEvent>>,
}

impl AtriumRuntime {
    /// Run a routing pass, or wait for the pass already underway plus one
    /// follow-up pass that observes this trigger's location.
    ///
    /// # Errors
    ///
    /// Per-application failures are absorbed (the failing instance is marked
    /// and its siblings proceed); only host-hook failures surface here.
    pub async fn reroute(self: &Arc<Self>, nav: Option<Arc<NavigationEvent>>) -> RuntimeResult<()> {
        let queued = {
            let mut state = self
                .reroute_state()
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if state.underway {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                if let Some(nav) = nav.clone() {
                    state.pending_navs.push(nav);
                }
                Some(rx)
            } else {
                state.underway = true;
                None
            }
        };

        if let Some(rx) = queued {
            debug!("routing pass underway, trigger queued");
            // The running pass always drains its waiters before finishing.
            let _ = rx.await;
            return Ok(());
        }

        let mut result = self.perform_pass(nav).await;
        loop {
            let (waiters, pending) = {
                let mut state = self
                    .reroute_state()
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                if state.waiters.is_empty() {
                    state.underway = false;
                    break;
                }
                (
                    std::mem::take(&mut state.waiters),
                    std::mem::take(&mut state.pending_navs),
                )
            };
            debug!(waiters = waiters.len(), "running follow-up routing pass");
            self.screen_pending_navigations(pending);
            let pass = self.perform_pass(None).await;
            result = result.and(pass);
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
        result
    }

    /// Run navigations that queued behind a pass through the guards, in
    /// arrival order. A cancelled navigation is reverted only while its
    /// target is still the live location; a later allowed navigation wins.
    fn screen_pending_navigations(&self, pending: Vec<Arc<NavigationEvent>>) {
        for nav in pending {
            if !self.navigation_allowed(&nav) && self.navigation().location() == nav.to {
                self.navigation().revert(nav.from.clone());
            }
        }
    }

    async fn perform_pass(self: &Arc<Self>, nav: Option<Arc<NavigationEvent>>) -> RuntimeResult<()> {
        if let Some(nav) = &nav
            && !self.navigation_allowed(nav)
        {
            self.navigation().revert(nav.from.clone());
            return Ok(());
        }

        let location = self.navigation().location();
        let changes = self.registry().app_changes(&location);
        let changed = !changes.is_empty();
        info!(
            location = location.href(),
            to_load = changes.to_load.len(),
            to_mount = changes.to_mount.len(),
            to_unmount = changes.to_unmount.len(),
            to_unload = changes.to_unload.len(),
            "routing pass"
        );

        self.events().publish(if changed {
            RuntimeEvent::BeforeAppChange {
                metadata: EventMetadata::new("runtime"),
                apps: self.registry().statuses(),
            }
        } else {
            RuntimeEvent::BeforeNoAppChange {
                metadata: EventMetadata::new("runtime"),
                apps: self.registry().statuses(),
            }
        });

        let mut framework_error: Option<RuntimeError> = None;

        // Teardown and loading proceed together; mounts wait for all of it.
        let unmounts = join_all(changes.to_unmount.iter().map(|app| {
            let this = Arc::clone(self);
            let app = Arc::clone(app);
            async move { this.run_unmount(&app).await }
        }));
        let unloads = join_all(changes.to_unload.iter().map(|app| {
            let this = Arc::clone(self);
            let app = Arc::clone(app);
            async move { this.run_unload(&app).await }
        }));
        let loads = join_all(changes.to_load.iter().map(|app| {
            let this = Arc::clone(self);
            let app = Arc::clone(app);
            async move {
                if let Err(err) = this.ensure_loaded(&app).await {
                    warn!(app = %app.descriptor.name, error = %err, "load failed during routing");
                }
            }
        }));
        let (unmount_results, unload_results, _) = tokio::join!(unmounts, unloads, loads);
        for failure in unmount_results
            .into_iter()
            .chain(unload_results)
            .filter_map(Result::err)
        {
            note_framework_failure(&mut framework_error, failure);
        }

        if changed {
            self.events().publish(RuntimeEvent::BeforeMountRoutingEvent {
                metadata: EventMetadata::new("runtime"),
                apps: self.registry().statuses(),
            });
        }

        let mounts: Vec<Arc<AppInstance>> = changes
            .to_mount
            .iter()
            .chain(changes.to_load.iter().filter(|app| app.status().is_loaded()))
            .map(Arc::clone)
            .collect();
        if self.is_singular() {
            // One live app at a time: mount sequentially, and never mount
            // over an instance that is still up.
            for app in &mounts {
                if let Some(live) = self.mounted_app() {
                    warn!(
                        app = %app.descriptor.name,
                        mounted = %live,
                        "singular mode, mount deferred until the live application unmounts"
                    );
                    continue;
                }
                if let Err(failure) = self.try_bootstrap_and_mount(app).await {
                    note_framework_failure(&mut framework_error, failure);
                }
            }
        } else {
            let mount_results = join_all(mounts.iter().map(|app| {
                let this = Arc::clone(self);
                let app = Arc::clone(app);
                async move { this.try_bootstrap_and_mount(&app).await }
            }))
            .await;
            for failure in mount_results.into_iter().filter_map(Result::err) {
                note_framework_failure(&mut framework_error, failure);
            }
        }

        let apps = self.registry().statuses();
        self.events().publish(if changed {
            RuntimeEvent::AppChange {
                metadata: EventMetadata::new("runtime"),
                apps: apps.clone(),
            }
        } else {
            RuntimeEvent::NoAppChange {
                metadata: EventMetadata::new("runtime"),
                apps: apps.clone(),
            }
        });
        self.events().publish(RuntimeEvent::RoutingEvent {
            metadata: EventMetadata::new("runtime"),
            apps,
        });

        match framework_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Bootstrap and mount one instance, re-checking its rule against the
    /// then-current location before and after the unmount barrier: a
    /// navigation landing mid-pass must not resurrect an app it deactivated.
    async fn try_bootstrap_and_mount(
        self: &Arc<Self>,
        app: &Arc<AppInstance>,
    ) -> Result<(), ChainFailure> {
        if !app.should_be_active(&self.navigation().location()) {
            return Ok(());
        }
        self.run_bootstrap(app).await?;
        let singular = self.is_singular();
        if singular {
            self.singleton().wait().await;
        }
        if !app.should_be_active(&self.navigation().location()) {
            debug!(app = %app.descriptor.name, "location moved on, mount skipped");
            return Ok(());
        }
        self.run_mount(app, None).await?;
        if singular && app.status() == AppStatus::Mounted {
            self.singleton().arm();
        }
        Ok(())
    }

    fn mounted_app(&self) -> Option<String> {
        self.registry()
            .all()
            .iter()
            .find(|app| app.status() == AppStatus::Mounted)
            .map(|app| app.descriptor.name.clone())
    }
}

fn note_framework_failure(slot: &mut Option<RuntimeError>, failure: ChainFailure) {
    // App-attributed failures were already absorbed by the lifecycle layer.
    if !failure.app_attributed && slot.is_none() {
        *slot = Some(failure.error);
    }
}
