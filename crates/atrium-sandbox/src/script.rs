//! Script module execution.
//!
//! An application's code arrives as an ordered list of [`ScriptSource`]
//! references. Each reference is resolved through a [`ScriptRegistry`] to a
//! [`ScriptModule`] and run against the instance's [`Sandbox`]. The entry
//! module's failure is fatal to the whole run; auxiliary module failures are
//! isolated and reported out of band so one broken side script cannot take
//! the application down.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error};

use atrium_core::RawExports;

use crate::error::{ScriptError, ScriptResult};
use crate::facade::Sandbox;

/// An ordered script reference produced by entry resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    /// Registry key the module is resolved by. For inline code this is the
    /// code itself.
    pub id: String,
    /// The script text as extracted from the entry.
    pub text: String,
    /// Whether this script carries the application's lifecycle exports.
    pub is_entry: bool,
}

impl ScriptSource {
    /// A non-entry script reference.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            is_entry: false,
        }
    }

    /// Mark this source as the entry script.
    #[must_use]
    pub fn entry(mut self) -> Self {
        self.is_entry = true;
        self
    }

    /// Inline code is distinguished from an address by its leading `<`.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.id.starts_with('<')
    }
}

/// Executable form of a script: runs against a sandbox and may yield the
/// application's raw lifecycle exports.
#[async_trait]
pub trait ScriptModule: Send + Sync {
    /// Run the module. Returning `Ok(None)` means the module executed for
    /// its side effects only.
    async fn run(&self, sandbox: Arc<Sandbox>) -> ScriptResult<Option<RawExports>>;
}

struct FnModule<F> {
    body: F,
}

#[async_trait]
impl<F> ScriptModule for FnModule<F>
where
    F: Fn(Arc<Sandbox>) -> ScriptResult<Option<RawExports>> + Send + Sync,
{
    async fn run(&self, sandbox: Arc<Sandbox>) -> ScriptResult<Option<RawExports>> {
        (self.body)(sandbox)
    }
}

/// Wrap a synchronous closure as a [`ScriptModule`].
pub fn script_module<F>(body: F) -> Arc<dyn ScriptModule>
where
    F: Fn(Arc<Sandbox>) -> ScriptResult<Option<RawExports>> + Send + Sync + 'static,
{
    Arc::new(FnModule { body })
}

/// Maps script references to their executable modules.
#[derive(Default)]
pub struct ScriptRegistry {
    modules: DashMap<String, Arc<dyn ScriptModule>>,
}

impl ScriptRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `id`, replacing any previous binding.
    pub fn register(&self, id: impl Into<String>, module: Arc<dyn ScriptModule>) {
        self.modules.insert(id.into(), module);
    }

    /// Resolve a script reference.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn ScriptModule>> {
        self.modules.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRegistry")
            .field("modules", &self.modules.len())
            .finish()
    }
}

/// Report an auxiliary failure without interrupting the run.
fn report_non_blocking(app: &str, err: ScriptError) {
    let app = app.to_string();
    tokio::spawn(async move {
        error!(app = %app, error = %err, "auxiliary script failed");
    });
}

/// Run `sources` in order against `sandbox`, resolving each through
/// `registry`.
///
/// The entry script's result is returned; an entry failure (unresolved or
/// raised) aborts the run. Auxiliary failures are logged asynchronously and
/// execution continues with the next source. The shared context's
/// currently-running-app slot is cleared once the run settles, regardless of
/// outcome.
pub async fn execute_scripts(
    sandbox: &Arc<Sandbox>,
    registry: &ScriptRegistry,
    sources: &[ScriptSource],
) -> ScriptResult<Option<RawExports>> {
    let mut entry_exports = None;
    for source in sources {
        debug!(
            sandbox = sandbox.id(),
            script = %source.id,
            entry = source.is_entry,
            "executing script"
        );
        let Some(module) = registry.resolve(&source.id) else {
            if source.is_entry {
                sandbox.shared().clear_current_app();
                return Err(ScriptError::UnresolvedModule {
                    source_id: source.id.clone(),
                });
            }
            report_non_blocking(
                sandbox.id(),
                ScriptError::UnresolvedModule {
                    source_id: source.id.clone(),
                },
            );
            continue;
        };
        match module.run(Arc::clone(sandbox)).await {
            Ok(exports) => {
                if source.is_entry {
                    entry_exports = exports;
                }
            }
            Err(err) => {
                if source.is_entry {
                    sandbox.shared().clear_current_app();
                    return Err(ScriptError::EntryScript {
                        source_id: source.id.clone(),
                        message: err.to_string(),
                    });
                }
                report_non_blocking(sandbox.id(), err);
            }
        }
    }
    sandbox.shared().clear_current_app();
    Ok(entry_exports)
}
