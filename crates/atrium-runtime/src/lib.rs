//! Atrium Runtime - the lifecycle orchestrator.
//!
//! Registers micro-apps against activity rules, loads their entries through
//! the cached resolver, executes their scripts in per-instance sandboxes,
//! and drives mount/unmount transitions from location changes. One
//! [`AtriumRuntime`] instance owns the whole host.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod chain;
pub mod config;
pub mod effects;
pub mod error;
pub mod hooks;
mod host;
mod lifecycle;
pub mod loader;
pub mod micro_app;
pub mod prefetch;
pub mod registry;
mod reroute;

pub use chain::{ChainFailure, HookChain, StepFn, step_fn};
pub use config::{PrefetchConfig, RuntimeConfig, SandboxConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use hooks::{AppHookFn, FrameworkHooks, app_hook, run_hooks};
pub use host::{AtriumRuntime, NavigationGuard, RuntimeBuilder};
pub use loader::{LoadedApp, POWERED_BY_KEY, PUBLIC_PATH_KEY};
pub use micro_app::MicroAppHandle;
pub use prefetch::{PrefetchPlan, PrefetchStrategy};
pub use registry::{AppChanges, AppInstance, AppRegistry};
