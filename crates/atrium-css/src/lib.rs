//! Atrium CSS - style scoping for micro-apps.
//!
//! Rewrites an application's style sheets so every rule only applies under
//! the application's scope-tagged wrapper. Root selectors map onto the
//! wrapper itself; everything else gets prefixed.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod node;
pub mod rewrite;

pub use node::{StyleNode, process};
pub use rewrite::rewrite;
