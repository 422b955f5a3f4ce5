//! Orchestration event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Source component that generated the event.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Per-application status detail carried by routing events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStatusDetail {
    /// Application name.
    pub name: String,
    /// Status at the time of the event, in wire form (`NOT_LOADED` etc.).
    pub status: String,
}

/// Events emitted around each routing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// A routing pass that will change mounted applications is starting.
    BeforeAppChange {
        /// Event metadata.
        metadata: EventMetadata,
        /// Status of every registered application.
        apps: Vec<AppStatusDetail>,
    },

    /// A routing pass that changes nothing is starting.
    BeforeNoAppChange {
        /// Event metadata.
        metadata: EventMetadata,
        /// Status of every registered application.
        apps: Vec<AppStatusDetail>,
    },

    /// Unmounts have settled; mounts are about to begin.
    BeforeMountRoutingEvent {
        /// Event metadata.
        metadata: EventMetadata,
        /// Status of every registered application.
        apps: Vec<AppStatusDetail>,
    },

    /// A routing pass finished and the mounted set changed.
    AppChange {
        /// Event metadata.
        metadata: EventMetadata,
        /// Status of every registered application.
        apps: Vec<AppStatusDetail>,
    },

    /// A routing pass finished without changing the mounted set.
    NoAppChange {
        /// Event metadata.
        metadata: EventMetadata,
        /// Status of every registered application.
        apps: Vec<AppStatusDetail>,
    },

    /// A routing pass finished (emitted alongside the change/no-change pair).
    RoutingEvent {
        /// Event metadata.
        metadata: EventMetadata,
        /// Status of every registered application.
        apps: Vec<AppStatusDetail>,
    },

    /// The first application finished mounting.
    FirstMount {
        /// Event metadata.
        metadata: EventMetadata,
    },
}

impl RuntimeEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BeforeAppChange { .. } => "before_app_change",
            Self::BeforeNoAppChange { .. } => "before_no_app_change",
            Self::BeforeMountRoutingEvent { .. } => "before_mount_routing_event",
            Self::AppChange { .. } => "app_change",
            Self::NoAppChange { .. } => "no_app_change",
            Self::RoutingEvent { .. } => "routing_event",
            Self::FirstMount { .. } => "first_mount",
        }
    }

    /// Whether the event fires before the routing pass does any work.
    #[must_use]
    pub fn is_pre_routing(&self) -> bool {
        matches!(
            self,
            Self::BeforeAppChange { .. }
                | Self::BeforeNoAppChange { .. }
                | Self::BeforeMountRoutingEvent { .. }
        )
    }
}
