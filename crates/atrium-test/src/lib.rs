//! Atrium Test - shared test utilities for the Atrium host runtime.
//!
//! Provides an in-memory fetcher, a scripted micro-app with call recording
//! and failure injection, and fixtures wiring the two together, for use as
//! a dev-dependency across the workspace.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
