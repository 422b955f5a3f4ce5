//! Atrium Events - the runtime's buses.
//!
//! Three seams connect the orchestrator to everything around it: the
//! [`NavigationBus`] carrying origin-tagged location changes, the
//! [`RuntimeEventBus`] broadcasting routing lifecycle events, and the
//! [`GlobalStateBus`] sharing state between mounted applications.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bus;
pub mod event;
pub mod navigation;
pub mod state;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventReceiver, RuntimeEventBus};
pub use event::{AppStatusDetail, EventMetadata, RuntimeEvent};
pub use navigation::{NavigationBus, NavigationEvent};
pub use state::GlobalStateBus;
