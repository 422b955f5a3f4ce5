//! Atrium Core - Foundation types for the Atrium micro-app host runtime.
//!
//! This crate provides:
//! - Application descriptors and the activity rule contract
//! - The per-instance lifecycle status state machine
//! - The exported lifecycle contract (`RawExports` / `AppExports`)
//! - The DOM-like mount surface owned by the orchestrator
//! - Location and navigation-origin types

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod app;
pub mod error;
pub mod exports;
pub mod location;
pub mod surface;

pub use app::{ActiveRule, AppDescriptor, AppStatus, EntrySource};
pub use error::{CoreError, CoreResult};
pub use exports::{
    AppExports, ExportsError, GlobalStateActions, LifecycleError, LifecycleFn, LifecycleProps,
    RawExports, StateListener, lifecycle_fn,
};
pub use location::{Location, NavigationOrigin};
pub use surface::{AppWrapper, MountSurface, RenderPhase};
