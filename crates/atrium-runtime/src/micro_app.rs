//! Manually driven micro-apps.
//!
//! An app loaded here lives outside the routed registry: the caller owns its
//! lifecycle through the returned handle, and routing passes never touch it.

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use atrium_core::{AppDescriptor, AppStatus};

use crate::chain::ChainFailure;
use crate::error::{RuntimeError, RuntimeResult};
use crate::host::AtriumRuntime;
use crate::registry::AppInstance;

/// Caller-owned handle onto a manually loaded micro-app.
pub struct MicroAppHandle {
    runtime: Arc<AtriumRuntime>,
    instance: Arc<AppInstance>,
}

impl AtriumRuntime {
    /// Load, bootstrap, and mount an application outside the routed
    /// registry.
    ///
    /// # Errors
    ///
    /// Surfaces the load, bootstrap, or mount failure; the caller decides
    /// whether to retry with a fresh call.
    pub async fn load_micro_app(
        self: &Arc<Self>,
        descriptor: AppDescriptor,
    ) -> RuntimeResult<MicroAppHandle> {
        if descriptor.container.trim().is_empty() {
            return Err(RuntimeError::EmptyContainer {
                name: descriptor.name,
            });
        }
        info!(app = %descriptor.name, "loading manual micro-app");
        let instance = AppInstance::new(descriptor);

        self.ensure_loaded(&instance).await?;
        self.run_bootstrap(&instance).await.map_err(into_error)?;
        self.run_mount(&instance, None).await.map_err(into_error)?;

        Ok(MicroAppHandle {
            runtime: Arc::clone(self),
            instance,
        })
    }
}

impl MicroAppHandle {
    /// The instance's current status.
    #[must_use]
    pub fn status(&self) -> AppStatus {
        self.instance.status()
    }

    /// The app's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.instance.descriptor.name
    }

    /// Push new props through the app's update lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UpdateNotSupported`] when the app exports no
    /// update hook, or the hook's own failure.
    pub async fn update(&self, props: Value) -> RuntimeResult<()> {
        let name = &self.instance.descriptor.name;
        let loaded = self
            .instance
            .loaded()
            .ok_or_else(|| RuntimeError::UpdateNotSupported { name: name.clone() })?;
        let update = loaded
            .exports
            .update
            .clone()
            .ok_or_else(|| RuntimeError::UpdateNotSupported { name: name.clone() })?;

        let lifecycle_props = self.runtime.lifecycle_props(&self.instance, Some(props));
        update(lifecycle_props)
            .await
            .map_err(|e| RuntimeError::Lifecycle {
                app: name.clone(),
                phase: "update".to_string(),
                message: e.to_string(),
            })
    }

    /// Unmount the app; it stays loaded and can be mounted again.
    ///
    /// # Errors
    ///
    /// Surfaces the unmount chain's failure.
    pub async fn unmount(&self) -> RuntimeResult<()> {
        self.runtime
            .run_unmount(&self.instance)
            .await
            .map_err(into_error)
    }

    /// Mount the app again after an unmount.
    ///
    /// # Errors
    ///
    /// Surfaces the mount chain's failure.
    pub async fn mount(&self) -> RuntimeResult<()> {
        self.runtime
            .run_mount(&self.instance, None)
            .await
            .map_err(into_error)
    }

    /// Unmount (if mounted) and unload the app entirely.
    ///
    /// # Errors
    ///
    /// Surfaces the unmount or unload failure.
    pub async fn unload(&self) -> RuntimeResult<()> {
        if self.instance.status() == AppStatus::Mounted {
            self.runtime
                .run_unmount(&self.instance)
                .await
                .map_err(into_error)?;
        }
        self.instance.request_unload();
        self.runtime
            .run_unload(&self.instance)
            .await
            .map_err(into_error)
    }
}

impl std::fmt::Debug for MicroAppHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicroAppHandle")
            .field("name", &self.instance.descriptor.name)
            .field("status", &self.instance.status())
            .finish()
    }
}

fn into_error(failure: ChainFailure) -> RuntimeError {
    failure.error
}
