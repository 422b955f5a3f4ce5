//! Per-instance lifecycle transitions.
//!
//! Bootstrap, mount, unmount, and unload are driven here as hook chains over
//! a loaded instance. In singular mode, mounts additionally gate on the
//! previous instance's unmount through the [`SingletonBarrier`].

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use atrium_core::{AppStatus, LifecycleProps, RenderPhase};
use atrium_events::RuntimeEvent;
use serde_json::Value;

use crate::chain::{ChainFailure, HookChain, step_fn};
use crate::error::RuntimeError;
use crate::hooks::run_hooks;
use crate::host::AtriumRuntime;
use crate::registry::AppInstance;

/// Gate serializing mounts behind the previous instance's unmount.
///
/// The barrier starts open. Every successful mount arms it; every settled
/// unmount (success or failure) opens it again, so a failed teardown can
/// never deadlock the next mount.
pub(crate) struct SingletonBarrier {
    sender: watch::Sender<bool>,
}

impl SingletonBarrier {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(true);
        Self { sender }
    }

    pub(crate) fn arm(&self) {
        self.sender.send_replace(false);
    }

    pub(crate) fn resolve(&self) {
        self.sender.send_replace(true);
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.sender.subscribe();
        // The sender outlives every waiter; a closed channel cannot happen.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl AtriumRuntime {
    /// Run the bootstrap hook once per load.
    pub(crate) async fn run_bootstrap(self: &Arc<Self>, app: &Arc<AppInstance>) -> Result<(), ChainFailure> {
        if app.status() != AppStatus::NotBootstrapped {
            return Ok(());
        }
        let Some(loaded) = app.loaded() else {
            return Ok(());
        };

        app.set_status(AppStatus::Bootstrapping);
        if let Some(bootstrap) = &loaded.exports.bootstrap {
            let props = self.lifecycle_props(app, None);
            if let Err(err) = bootstrap(props).await {
                let failure = ChainFailure {
                    step: "bootstrap",
                    app_attributed: true,
                    error: RuntimeError::Lifecycle {
                        app: app.descriptor.name.clone(),
                        phase: "bootstrap".to_string(),
                        message: err.to_string(),
                    },
                };
                self.report_app_failure(app, &failure);
                return Err(failure);
            }
        }
        app.set_status(AppStatus::NotMounted);
        Ok(())
    }

    /// Run the mount chain: render, sandbox activation, host hooks, the
    /// app's mount, and the final render.
    pub(crate) async fn run_mount(
        self: &Arc<Self>,
        app: &Arc<AppInstance>,
        props_override: Option<Value>,
    ) -> Result<(), ChainFailure> {
        if app.status() != AppStatus::NotMounted {
            return Ok(());
        }
        let Some(loaded) = app.loaded() else {
            return Ok(());
        };

        app.set_status(AppStatus::Mounting);

        let name = app.descriptor.name.clone();
        let container = app.descriptor.container.clone();
        let hooks = self.hooks_snapshot();
        let props = self.lifecycle_props(app, props_override);

        let chain = HookChain::new(format!("mount:{name}"))
            .app_step("render_mounting", {
                let this = Arc::clone(self);
                let loaded = Arc::clone(&loaded);
                let container = container.clone();
                step_fn(move || {
                    let this = Arc::clone(&this);
                    let loaded = Arc::clone(&loaded);
                    let container = container.clone();
                    async move {
                        this.surface().render(
                            &container,
                            Some(loaded.wrapper.clone()),
                            RenderPhase::Mounting,
                        )?;
                        Ok(())
                    }
                })
            })
            .step("sandbox_activate", {
                let loaded = Arc::clone(&loaded);
                step_fn(move || {
                    let loaded = Arc::clone(&loaded);
                    async move {
                        loaded.sandbox.activate();
                        Ok(())
                    }
                })
            })
            .step("before_mount_hooks", {
                let hooks = hooks.before_mount.clone();
                let descriptor = app.descriptor.clone();
                step_fn(move || {
                    let hooks = hooks.clone();
                    let descriptor = descriptor.clone();
                    async move { run_hooks("before_mount", &hooks, &descriptor).await }
                })
            })
            .app_step("mount", {
                let loaded = Arc::clone(&loaded);
                let name = name.clone();
                let props = props.clone();
                step_fn(move || {
                    let mount = Arc::clone(&loaded.exports.mount);
                    let name = name.clone();
                    let props = props.clone();
                    async move {
                        mount(props).await.map_err(|e| RuntimeError::Lifecycle {
                            app: name.clone(),
                            phase: "mount".to_string(),
                            message: e.to_string(),
                        })
                    }
                })
            })
            .app_step("render_mounted", {
                let this = Arc::clone(self);
                let loaded = Arc::clone(&loaded);
                let container = container.clone();
                step_fn(move || {
                    let this = Arc::clone(&this);
                    let loaded = Arc::clone(&loaded);
                    let container = container.clone();
                    async move {
                        this.surface().render(
                            &container,
                            Some(loaded.wrapper.clone()),
                            RenderPhase::Mounted,
                        )?;
                        Ok(())
                    }
                })
            })
            .step("after_mount_hooks", {
                let hooks = hooks.after_mount.clone();
                let descriptor = app.descriptor.clone();
                step_fn(move || {
                    let hooks = hooks.clone();
                    let descriptor = descriptor.clone();
                    async move { run_hooks("after_mount", &hooks, &descriptor).await }
                })
            });

        match chain.execute_all().await {
            Ok(()) => {
                app.set_status(AppStatus::Mounted);
                info!(app = %name, "application mounted");
                self.note_first_mount();
                Ok(())
            }
            Err(failure) => {
                if failure.app_attributed {
                    self.report_app_failure(app, &failure);
                } else {
                    // A host hook failed; the app itself is fine to retry.
                    app.set_status(AppStatus::NotMounted);
                }
                Err(failure)
            }
        }
    }

    /// Run the unmount chain. The singleton barrier is opened whether the
    /// chain succeeds or not.
    pub(crate) async fn run_unmount(self: &Arc<Self>, app: &Arc<AppInstance>) -> Result<(), ChainFailure> {
        if app.status() != AppStatus::Mounted {
            return Ok(());
        }
        let Some(loaded) = app.loaded() else {
            return Ok(());
        };

        app.set_status(AppStatus::Unmounting);

        let name = app.descriptor.name.clone();
        let container = app.descriptor.container.clone();
        let hooks = self.hooks_snapshot();
        let props = self.lifecycle_props(app, None);
        let sandbox_enabled = self.sandbox_config().enabled;

        let chain = HookChain::new(format!("unmount:{name}"))
            .step("before_unmount_hooks", {
                let hooks = hooks.before_unmount.clone();
                let descriptor = app.descriptor.clone();
                step_fn(move || {
                    let hooks = hooks.clone();
                    let descriptor = descriptor.clone();
                    async move { run_hooks("before_unmount", &hooks, &descriptor).await }
                })
            })
            .app_step("unmount", {
                let loaded = Arc::clone(&loaded);
                let name = name.clone();
                let props = props.clone();
                step_fn(move || {
                    let unmount = Arc::clone(&loaded.exports.unmount);
                    let name = name.clone();
                    let props = props.clone();
                    async move {
                        unmount(props).await.map_err(|e| RuntimeError::Lifecycle {
                            app: name.clone(),
                            phase: "unmount".to_string(),
                            message: e.to_string(),
                        })
                    }
                })
            })
            .step("sandbox_deactivate", {
                let loaded = Arc::clone(&loaded);
                step_fn(move || {
                    let loaded = Arc::clone(&loaded);
                    async move {
                        if sandbox_enabled {
                            loaded.sandbox.deactivate();
                        }
                        Ok(())
                    }
                })
            })
            .step("state_release", {
                let this = Arc::clone(self);
                let instance_id = app.instance_id.clone();
                step_fn(move || {
                    let this = Arc::clone(&this);
                    let instance_id = instance_id.clone();
                    async move {
                        this.state()
                            .actions_for(instance_id)
                            .off_global_state_change();
                        Ok(())
                    }
                })
            })
            .step("render_unmounted", {
                let this = Arc::clone(self);
                let container = container.clone();
                step_fn(move || {
                    let this = Arc::clone(&this);
                    let container = container.clone();
                    async move {
                        this.surface()
                            .render(&container, None, RenderPhase::Unmounted)?;
                        Ok(())
                    }
                })
            })
            .step("after_unmount_hooks", {
                let hooks = hooks.after_unmount.clone();
                let descriptor = app.descriptor.clone();
                step_fn(move || {
                    let hooks = hooks.clone();
                    let descriptor = descriptor.clone();
                    async move { run_hooks("after_unmount", &hooks, &descriptor).await }
                })
            });

        let result = chain.execute_all().await;
        // Open the barrier no matter what, or a failed teardown would block
        // every later mount.
        self.singleton().resolve();

        match result {
            Ok(()) => {
                app.set_status(AppStatus::NotMounted);
                info!(app = %name, "application unmounted");
                Ok(())
            }
            Err(failure) => {
                // Teardown state is indeterminate either way.
                self.report_app_failure(app, &failure);
                Err(failure)
            }
        }
    }

    /// Run the unload hook and drop everything the load produced.
    pub(crate) async fn run_unload(self: &Arc<Self>, app: &Arc<AppInstance>) -> Result<(), ChainFailure> {
        if !matches!(
            app.status(),
            AppStatus::NotBootstrapped | AppStatus::NotMounted
        ) {
            return Ok(());
        }

        app.set_status(AppStatus::Unloading);
        if let Some(loaded) = app.loaded() {
            if let Some(unload) = &loaded.exports.unload {
                let props = self.lifecycle_props(app, None);
                if let Err(err) = unload(props).await {
                    let failure = ChainFailure {
                        step: "unload",
                        app_attributed: true,
                        error: RuntimeError::Lifecycle {
                            app: app.descriptor.name.clone(),
                            phase: "unload".to_string(),
                            message: err.to_string(),
                        },
                    };
                    self.report_app_failure(app, &failure);
                    return Err(failure);
                }
            }
            // A never-mounted sandbox is still active at this point.
            loaded.sandbox.deactivate();
        }

        app.take_loaded();
        app.clear_unload_request();
        app.set_status(AppStatus::NotLoaded);
        info!(app = %app.descriptor.name, "application unloaded");
        Ok(())
    }

    /// Break the instance and log the failure once. Siblings are unaffected.
    pub(crate) fn report_app_failure(&self, app: &Arc<AppInstance>, failure: &ChainFailure) {
        error!(
            app = %app.descriptor.name,
            step = failure.step,
            error = %failure.error,
            "lifecycle failed, excluding application from routing"
        );
        app.set_status(AppStatus::SkipBecauseBroken);
    }

    /// Publish the one-time first-mount event.
    pub(crate) fn note_first_mount(&self) {
        if !self.mark_first_mount() {
            return;
        }
        self.events()
            .publish(RuntimeEvent::FirstMount {
                metadata: atrium_events::EventMetadata::new("runtime"),
            });
    }

    pub(crate) fn lifecycle_props(
        &self,
        app: &Arc<AppInstance>,
        props_override: Option<Value>,
    ) -> LifecycleProps {
        LifecycleProps {
            name: app.descriptor.name.clone(),
            instance_id: app.instance_id.clone(),
            surface: Some(Arc::clone(self.surface())),
            container: Some(app.descriptor.container.clone()),
            props: props_override.unwrap_or_else(|| app.descriptor.props.clone()),
            state: Some(self.state().actions_for(&app.instance_id)),
        }
    }
}
