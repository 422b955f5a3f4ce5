//! The navigation side channel.
//!
//! The runtime owns one logical location. Applications and the host change
//! it only through this bus, which records the origin of every change and
//! lets the routing pass revert a cancelled navigation without re-emitting.

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use atrium_core::{CoreError, CoreResult, Location, NavigationOrigin};

/// A location change.
#[derive(Debug, Clone)]
pub struct NavigationEvent {
    /// The location before the change.
    pub from: Location,
    /// The location after the change.
    pub to: Location,
    /// Who initiated the change.
    pub origin: NavigationOrigin,
}

/// Single owned dispatcher for location changes.
#[derive(Debug)]
pub struct NavigationBus {
    location: Mutex<Location>,
    sender: broadcast::Sender<Arc<NavigationEvent>>,
}

impl NavigationBus {
    /// Bus starting at `initial`.
    #[must_use]
    pub fn new(initial: Location) -> Arc<Self> {
        let (sender, _) = broadcast::channel(256);
        Arc::new(Self {
            location: Mutex::new(initial),
            sender,
        })
    }

    /// The current location.
    #[must_use]
    pub fn location(&self) -> Location {
        let location = self.location.lock().unwrap_or_else(|e| e.into_inner());
        location.clone()
    }

    /// Change the location and emit a [`NavigationEvent`].
    ///
    /// `target` may be an absolute address or a reference relative to the
    /// current location.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidLocation`] when `target` cannot be
    /// resolved against the current location.
    pub fn navigate(&self, target: &str, origin: NavigationOrigin) -> CoreResult<Arc<NavigationEvent>> {
        let event = {
            let mut location = self.location.lock().unwrap_or_else(|e| e.into_inner());
            let base = Url::parse(location.href())
                .map_err(|e| CoreError::InvalidLocation(e.to_string()))?;
            let resolved = base
                .join(target)
                .map_err(|e| CoreError::InvalidLocation(e.to_string()))?;
            let to = Location::parse(resolved.as_str())?;
            if to == *location {
                debug!(target, "navigation to the current location skipped");
                return Ok(Arc::new(NavigationEvent {
                    from: location.clone(),
                    to,
                    origin,
                }));
            }
            let from = std::mem::replace(&mut *location, to.clone());
            Arc::new(NavigationEvent { from, to, origin })
        };

        info!(
            from = event.from.href(),
            to = event.to.href(),
            origin = %event.origin,
            "navigated"
        );
        if self.sender.send(Arc::clone(&event)).is_err() {
            debug!("no navigation receivers");
        }
        Ok(event)
    }

    /// Put the location back to `to` without emitting.
    ///
    /// Used by the routing pass when a pre-routing hook cancels a
    /// navigation: observers must never see the cancelled location.
    pub fn revert(&self, to: Location) {
        let mut location = self.location.lock().unwrap_or_else(|e| e.into_inner());
        if *location != to {
            warn!(
                from = location.href(),
                to = to.href(),
                "navigation cancelled, location reverted"
            );
            *location = to;
        }
    }

    /// Subscribe to location changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<NavigationEvent>> {
        self.sender.subscribe()
    }
}
