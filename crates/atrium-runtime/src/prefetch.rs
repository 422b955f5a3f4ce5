//! Entry prefetching.
//!
//! Prefetch only warms the resolver's caches: markup, stylesheets, and
//! external script bodies are fetched, nothing executes. A later real load
//! then hits the cache and skips the network entirely.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use atrium_core::AppDescriptor;
use atrium_events::RuntimeEvent;

use crate::config::PrefetchConfig;
use crate::host::AtriumRuntime;

/// Which applications to warm, and when.
#[derive(Clone)]
pub enum PrefetchStrategy {
    /// No prefetching.
    Disabled,
    /// Warm every registered entry immediately.
    All,
    /// Warm the still-unloaded entries once the first mount settles.
    AfterFirstMount,
    /// Warm the named entries immediately.
    Named(Vec<String>),
    /// Classify the registered apps into a [`PrefetchPlan`].
    Custom(Arc<dyn Fn(&[AppDescriptor]) -> PrefetchPlan + Send + Sync>),
}

impl fmt::Debug for PrefetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::All => f.write_str("All"),
            Self::AfterFirstMount => f.write_str("AfterFirstMount"),
            Self::Named(names) => f.debug_tuple("Named").field(names).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<PrefetchConfig> for PrefetchStrategy {
    fn from(config: PrefetchConfig) -> Self {
        match config {
            PrefetchConfig::Disabled => Self::Disabled,
            PrefetchConfig::All => Self::All,
            PrefetchConfig::AfterFirstMount => Self::AfterFirstMount,
            PrefetchConfig::Named(names) => Self::Named(names),
        }
    }
}

/// A classifier's verdict: what to warm now and what to defer.
#[derive(Debug, Clone, Default)]
pub struct PrefetchPlan {
    /// Warmed immediately.
    pub critical: Vec<String>,
    /// Warmed after the first mount.
    pub idle: Vec<String>,
}

impl AtriumRuntime {
    pub(crate) fn schedule_prefetch(self: &Arc<Self>) {
        let strategy = self.prefetch_strategy();
        debug!(strategy = ?strategy, "scheduling prefetch");
        match strategy {
            PrefetchStrategy::Disabled => {}
            PrefetchStrategy::All => {
                let names = self.registered_names();
                self.warm_by_name(&names);
            }
            PrefetchStrategy::AfterFirstMount => {
                self.warm_after_first_mount(None);
            }
            PrefetchStrategy::Named(names) => {
                self.warm_by_name(&names);
            }
            PrefetchStrategy::Custom(classify) => {
                let descriptors: Vec<AppDescriptor> = self
                    .registry()
                    .all()
                    .iter()
                    .map(|app| app.descriptor.clone())
                    .collect();
                let plan = classify(&descriptors);
                self.warm_by_name(&plan.critical);
                if !plan.idle.is_empty() {
                    self.warm_after_first_mount(Some(plan.idle));
                }
            }
        }
    }

    fn registered_names(&self) -> Vec<String> {
        self.registry()
            .all()
            .iter()
            .map(|app| app.descriptor.name.clone())
            .collect()
    }

    fn warm_by_name(self: &Arc<Self>, names: &[String]) {
        for name in names {
            let Some(app) = self.registry().get(name) else {
                warn!(app = %name, "prefetch requested for unregistered application");
                continue;
            };
            let resolver = Arc::clone(self.resolver());
            let entry = app.descriptor.entry.clone();
            let name = name.clone();
            tokio::spawn(async move {
                debug!(app = %name, "prefetching entry");
                if let Err(err) = resolver.warm(&entry).await {
                    // A failed warm is cached and will surface on the real load.
                    warn!(app = %name, error = %err, "prefetch failed");
                }
            });
        }
    }

    /// Warm `names` (or whatever is still unloaded) once the first mount
    /// fires. If it already fired, warm immediately.
    fn warm_after_first_mount(self: &Arc<Self>, names: Option<Vec<String>>) {
        if self.first_mount_done() {
            let names = names.unwrap_or_else(|| self.unloaded_names());
            self.warm_by_name(&names);
            return;
        }
        let this = Arc::clone(self);
        let mut rx = self.events().subscribe();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(*event, RuntimeEvent::FirstMount { .. }) {
                    let names = names.unwrap_or_else(|| this.unloaded_names());
                    this.warm_by_name(&names);
                    break;
                }
            }
        });
    }

    fn unloaded_names(&self) -> Vec<String> {
        self.registry()
            .all()
            .iter()
            .filter(|app| app.status().can_load())
            .map(|app| app.descriptor.name.clone())
            .collect()
    }
}
