//! Application loading: entry resolution through export discovery.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};

use atrium_core::{AppExports, AppStatus, AppWrapper, RawExports, RenderPhase};
use atrium_entry::ScriptRef;
use atrium_sandbox::{Sandbox, SandboxOptions, ScriptSource, execute_scripts};

use crate::error::{RuntimeError, RuntimeResult};
use crate::hooks::run_hooks;
use crate::host::AtriumRuntime;
use crate::registry::AppInstance;

/// Binding carrying the app's asset base address into its sandbox.
pub const PUBLIC_PATH_KEY: &str = "__ATRIUM_PUBLIC_PATH__";

/// Binding telling the app it runs under an orchestrating host.
pub const POWERED_BY_KEY: &str = "__POWERED_BY_ATRIUM__";

/// Everything a load produces: the validated lifecycle surface, the
/// instance's sandbox, and the wrapper its markup renders into.
pub struct LoadedApp {
    /// Validated lifecycle exports.
    pub exports: AppExports,
    /// The instance's sandbox, reused across mount cycles.
    pub sandbox: Arc<Sandbox>,
    /// The wrapper holding the template and scoped styles.
    pub wrapper: AppWrapper,
}

impl AtriumRuntime {
    /// Load the application if it is not loaded yet.
    ///
    /// Load attempts for one instance are serialized; a second caller awaits
    /// the first attempt's outcome through the instance's load lock and then
    /// observes the settled status instead of loading twice.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AppBroken`] for an instance in the broken
    /// state, or the load failure itself. A failed load leaves the instance
    /// in `LoadError` (retryable), except an invalid export surface, which
    /// breaks the instance for good.
    pub(crate) async fn ensure_loaded(&self, app: &Arc<AppInstance>) -> RuntimeResult<()> {
        let _guard = app.load_lock.lock().await;

        let status = app.status();
        if status.is_broken() {
            return Err(RuntimeError::AppBroken {
                name: app.descriptor.name.clone(),
            });
        }
        if !status.can_load() {
            return Ok(());
        }

        app.set_status(AppStatus::LoadingSourceCode);
        info!(app = %app.descriptor.name, "loading application");

        match self.load_uncached(app).await {
            Ok(loaded) => {
                app.set_loaded(Arc::new(loaded));
                app.set_status(AppStatus::NotBootstrapped);
                Ok(())
            }
            Err(err) => {
                // Bad export surfaces never fix themselves on retry.
                let next = if matches!(err, RuntimeError::Exports(_)) {
                    AppStatus::SkipBecauseBroken
                } else {
                    AppStatus::LoadError
                };
                error!(app = %app.descriptor.name, error = %err, status = %next, "load failed");
                app.set_status(next);
                Err(err)
            }
        }
    }

    async fn load_uncached(&self, app: &Arc<AppInstance>) -> RuntimeResult<LoadedApp> {
        let name = &app.descriptor.name;
        let resolved = self.resolver().resolve(&app.descriptor.entry).await?;

        let mut wrapper = AppWrapper::new(&app.instance_id, name, resolved.template.clone());
        let sandbox_config = self.sandbox_config();
        if sandbox_config.scoped_css {
            let scope = wrapper.scope_selector();
            for url in &resolved.styles {
                let body = self.resolver().external_style(url).await?;
                wrapper.styles.push(atrium_css::rewrite(&body, &scope));
            }
        }

        self.surface()
            .render(&app.descriptor.container, Some(wrapper.clone()), RenderPhase::Loading)?;

        let mut options = SandboxOptions::new();
        for key in &sandbox_config.escape_keys {
            options = options.with_escape_key(key);
        }
        let sandbox = Arc::new(Sandbox::new(
            &app.instance_id,
            Arc::clone(self.shared_global()),
            options,
        ));
        sandbox.set(PUBLIC_PATH_KEY, json!(resolved.asset_public_path));
        sandbox.set(POWERED_BY_KEY, json!(true));

        let before_load = self.hooks_snapshot().before_load;
        run_hooks("before_load", &before_load, &app.descriptor).await?;

        let sources: Vec<ScriptSource> = resolved
            .scripts
            .iter()
            .map(|script| {
                let source = match script {
                    ScriptRef::External { url } => ScriptSource::new(url, ""),
                    ScriptRef::Inline { markup, code } => ScriptSource::new(markup, code),
                };
                if resolved.entry.as_deref() == Some(script.id()) {
                    source.entry()
                } else {
                    source
                }
            })
            .collect();

        let entry_exports = execute_scripts(&sandbox, self.scripts(), &sources).await?;
        let raw = discover_exports(entry_exports, &sandbox, name);
        debug!(app = %name, exports = ?raw, "export surface discovered");
        let exports = raw.validate(name)?;

        Ok(LoadedApp {
            exports,
            sandbox,
            wrapper,
        })
    }
}

/// Three-level export discovery: the entry script's return value, then the
/// binding behind the sandbox's most recent write, then a binding named
/// after the application itself.
fn discover_exports(
    entry_exports: Option<RawExports>,
    sandbox: &Arc<Sandbox>,
    name: &str,
) -> RawExports {
    if let Some(exports) = entry_exports
        && exports.looks_valid()
    {
        return exports;
    }
    if let Some(exports) = sandbox
        .latest_set_key()
        .and_then(|key| sandbox.get(&key))
        .and_then(|binding| binding.as_exports())
        && exports.looks_valid()
    {
        return (*exports).clone();
    }
    if let Some(exports) = sandbox
        .get(name)
        .and_then(|binding| binding.as_exports())
        && exports.looks_valid()
    {
        return (*exports).clone();
    }
    RawExports::default()
}
