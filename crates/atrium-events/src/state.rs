//! The cross-app state bus.
//!
//! One shared JSON map, owned by the host. Applications receive a per-owner
//! handle at mount and can only update keys the host declared at
//! initialization; the host itself may introduce new keys. Listeners are
//! notified synchronously with the next and previous snapshots, and every
//! listener an owner registered is dropped when that owner unmounts.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use atrium_core::{GlobalStateActions, StateListener};

/// Marker owner for the host itself.
const HOST_OWNER: &str = "host";

/// The shared state store and its listeners.
pub struct GlobalStateBus {
    state: Mutex<Map<String, Value>>,
    listeners: Mutex<HashMap<String, Vec<StateListener>>>,
}

impl GlobalStateBus {
    /// Bus initialized with the host's declared state.
    #[must_use]
    pub fn new(initial: Map<String, Value>) -> Arc<Self> {
        info!(keys = initial.len(), "global state initialized");
        Arc::new(Self {
            state: Mutex::new(initial),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.clone()
    }

    /// Apply a patch as the host; new keys are allowed.
    pub fn set_host_state(&self, patch: Map<String, Value>) -> Vec<String> {
        self.apply(HOST_OWNER, patch, true)
    }

    /// Register a host-level listener.
    pub fn on_host_state_change(&self, listener: StateListener, immediate: bool) {
        self.register(HOST_OWNER, listener, immediate);
    }

    /// Per-owner handle handed to an application at mount.
    #[must_use]
    pub fn actions_for(self: &Arc<Self>, owner: impl Into<String>) -> Arc<dyn GlobalStateActions> {
        Arc::new(OwnerActions {
            bus: Arc::clone(self),
            owner: owner.into(),
        })
    }

    fn apply(&self, owner: &str, patch: Map<String, Value>, allow_new: bool) -> Vec<String> {
        let (previous, next, changed) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let previous = state.clone();
            let mut changed = Vec::new();
            for (key, value) in patch {
                if allow_new || state.contains_key(&key) {
                    changed.push(key.clone());
                    state.insert(key, value);
                } else {
                    warn!(owner, key, "state key not declared at initialization, ignored");
                }
            }
            (previous, state.clone(), changed)
        };

        debug!(owner, changed = ?changed, "global state updated");
        self.notify(&next, &previous);
        changed
    }

    fn register(&self, owner: &str, listener: StateListener, immediate: bool) {
        {
            let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners
                .entry(owner.to_string())
                .or_default()
                .push(Arc::clone(&listener));
        }
        if immediate {
            let current = self.snapshot();
            listener(&current, &current);
        }
    }

    fn deregister(&self, owner: &str) -> usize {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let removed = listeners.remove(owner).map_or(0, |l| l.len());
        if removed > 0 {
            debug!(owner, removed, "state listeners deregistered");
        }
        removed
    }

    fn notify(&self, next: &Map<String, Value>, previous: &Map<String, Value>) {
        // Snapshot under the lock, invoke outside it: listeners may
        // re-enter the bus.
        let snapshot: Vec<StateListener> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.values().flatten().map(Arc::clone).collect()
        };
        for listener in snapshot {
            listener(next, previous);
        }
    }
}

impl std::fmt::Debug for GlobalStateBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let owners = self
            .listeners
            .lock()
            .map(|l| l.len())
            .unwrap_or_default();
        f.debug_struct("GlobalStateBus")
            .field("keys", &self.snapshot().len())
            .field("owners", &owners)
            .finish()
    }
}

struct OwnerActions {
    bus: Arc<GlobalStateBus>,
    owner: String,
}

impl GlobalStateActions for OwnerActions {
    fn set_global_state(&self, patch: Map<String, Value>) -> Vec<String> {
        self.bus.apply(&self.owner, patch, false)
    }

    fn on_global_state_change(&self, listener: StateListener, immediate: bool) {
        self.bus.register(&self.owner, listener, immediate);
    }

    fn off_global_state_change(&self) {
        self.bus.deregister(&self.owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn initial() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("user".to_string(), json!("alice"));
        map.insert("theme".to_string(), json!("light"));
        map
    }

    fn patch(key: &str, value: Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        map
    }

    #[test]
    fn test_listeners_see_next_and_previous() {
        let bus = GlobalStateBus::new(initial());
        let seen: Arc<Mutex<Vec<(Value, Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let actions = bus.actions_for("shop-1");
        actions.on_global_state_change(
            Arc::new(move |next, prev| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((next["theme"].clone(), prev["theme"].clone()));
            }),
            false,
        );

        let changed = actions.set_global_state(patch("theme", json!("dark")));
        assert_eq!(changed, vec!["theme".to_string()]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(json!("dark"), json!("light"))]);
    }

    #[test]
    fn test_undeclared_keys_rejected_for_apps_but_not_host() {
        let bus = GlobalStateBus::new(initial());
        let actions = bus.actions_for("shop-1");

        let changed = actions.set_global_state(patch("cart", json!([1, 2])));
        assert!(changed.is_empty());
        assert!(!bus.snapshot().contains_key("cart"));

        let changed = bus.set_host_state(patch("cart", json!([1, 2])));
        assert_eq!(changed, vec!["cart".to_string()]);
        assert!(bus.snapshot().contains_key("cart"));
    }

    #[test]
    fn test_immediate_fires_with_current_state_twice_over() {
        let bus = GlobalStateBus::new(initial());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);

        bus.actions_for("shop-1").on_global_state_change(
            Arc::new(move |next, prev| {
                assert_eq!(next, prev);
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
            true,
        );
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_only_drops_the_owner_in_question() {
        let bus = GlobalStateBus::new(initial());
        let shop_count = Arc::new(AtomicUsize::new(0));
        let admin_count = Arc::new(AtomicUsize::new(0));

        let shop = bus.actions_for("shop-1");
        let admin = bus.actions_for("admin-1");
        {
            let c = Arc::clone(&shop_count);
            shop.on_global_state_change(
                Arc::new(move |_, _| {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
                false,
            );
        }
        {
            let c = Arc::clone(&admin_count);
            admin.on_global_state_change(
                Arc::new(move |_, _| {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
                false,
            );
        }

        shop.off_global_state_change();
        bus.set_host_state(patch("theme", json!("dark")));

        assert_eq!(shop_count.load(Ordering::SeqCst), 0);
        assert_eq!(admin_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_every_listener_hears_every_change() {
        let bus = GlobalStateBus::new(initial());
        let count = Arc::new(AtomicUsize::new(0));
        for owner in ["a", "b", "c"] {
            let c = Arc::clone(&count);
            bus.actions_for(owner).on_global_state_change(
                Arc::new(move |_, _| {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
                false,
            );
        }
        bus.set_host_state(patch("theme", json!("dark")));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
