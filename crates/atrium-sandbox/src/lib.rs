//! Atrium Sandbox - isolated global views for micro-app execution.
//!
//! Each application instance executes against a [`Sandbox`]: a facade over
//! the [`SharedGlobal`] context that records the instance's own mutations,
//! keeps them invisible to other instances, and can be suspended, resumed,
//! and torn down without leaking into the shared namespace.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod facade;
pub mod global;
pub mod script;

pub use error::{ScriptError, ScriptResult};
pub use facade::{MODULE_LOADER_GLOBALS, Sandbox, SandboxOptions};
pub use global::{BindingValue, SELF_KEYS, SharedGlobal};
pub use script::{ScriptModule, ScriptRegistry, ScriptSource, execute_scripts, script_module};
