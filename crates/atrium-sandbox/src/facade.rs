//! The per-instance sandbox facade.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::global::{BindingValue, SELF_KEYS, SharedGlobal};

/// Module-loader globals that must be written through to the shared context
/// so cross-script module resolution keeps working for legacy bundles.
pub const MODULE_LOADER_GLOBALS: &[&str] = &["System", "__cjsWrapper"];

/// Sandbox construction options.
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    /// Keys allowed to escape the facade and be written to the shared
    /// context. Their prior bindings are restored when the last active
    /// sandbox deactivates.
    pub escape_keys: HashSet<String>,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            escape_keys: MODULE_LOADER_GLOBALS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl SandboxOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow an extra key to escape the facade.
    #[must_use]
    pub fn with_escape_key(mut self, key: impl Into<String>) -> Self {
        self.escape_keys.insert(key.into());
        self
    }
}

/// Isolated view of the shared global context for one application instance.
///
/// Reads fall back from the facade to the shared context; writes land in the
/// facade (except the escape allow-list, written through with the prior
/// binding saved). The facade never exposes a binding it did not create or
/// explicitly allow-list.
pub struct Sandbox {
    id: String,
    shared: Arc<SharedGlobal>,
    facade: Mutex<HashMap<String, BindingValue>>,
    mutated: Mutex<HashSet<String>>,
    latest_set_key: Mutex<Option<String>>,
    running: AtomicBool,
    escape_keys: HashSet<String>,
    /// Prior shared bindings for keys this sandbox wrote through.
    /// `None` means the key did not exist before the write.
    escaped_prev: Mutex<HashMap<String, Option<BindingValue>>>,
}

impl Sandbox {
    /// Construct and activate a sandbox over `shared`.
    ///
    /// The shared context's protected bindings are snapshotted into the
    /// private facade, with self-referential keys resolving back to the
    /// facade instead of the shared context.
    #[must_use]
    pub fn new(id: impl Into<String>, shared: Arc<SharedGlobal>, options: SandboxOptions) -> Self {
        let id = id.into();
        let mut facade = HashMap::new();

        for key in shared.protected_keys() {
            if let Some(value) = shared.get(&key) {
                facade.insert(key, value);
            }
        }
        for key in SELF_KEYS {
            facade.insert((*key).to_string(), BindingValue::SelfRef);
        }

        let active = shared.sandbox_activated();
        debug!(sandbox = %id, active, "sandbox created");

        Self {
            id,
            shared,
            facade: Mutex::new(facade),
            mutated: Mutex::new(HashSet::new()),
            latest_set_key: Mutex::new(None),
            running: AtomicBool::new(true),
            escape_keys: options.escape_keys,
            escaped_prev: Mutex::new(HashMap::new()),
        }
    }

    /// The sandbox's instance id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The shared context this sandbox is backed by.
    #[must_use]
    pub fn shared(&self) -> &Arc<SharedGlobal> {
        &self.shared
    }

    /// Whether the sandbox is currently active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Read a binding.
    ///
    /// Self-referential keys resolve to [`BindingValue::SelfRef`]; intrinsic
    /// keys resolve against the shared context (standing in for rebinding a
    /// platform function's receiver to the real namespace); everything else
    /// resolves facade-first with shared fallback.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<BindingValue> {
        if SELF_KEYS.contains(&key) {
            return Some(BindingValue::SelfRef);
        }
        if self.shared.is_intrinsic(key) {
            return self.shared.get(key);
        }
        let facade = self.facade.lock().unwrap_or_else(|e| e.into_inner());
        facade.get(key).cloned().or_else(|| self.shared.get(key))
    }

    /// Write a binding.
    ///
    /// While active, the write registers this instance as the currently
    /// executing application, records the key in the mutated set, and lands
    /// in the facade — unless the key is on the escape allow-list, in which
    /// case it is written through to the shared context with the prior
    /// binding saved for restoration. While inactive, the write is accepted
    /// but discarded with a warning.
    pub fn set(&self, key: impl Into<String>, value: impl Into<BindingValue>) {
        let key = key.into();
        if !self.is_running() {
            warn!(sandbox = %self.id, key, "set on inactive sandbox discarded");
            return;
        }

        self.shared.set_current_app(&self.id);

        if self.escape_keys.contains(&key) {
            let mut prev = self.escaped_prev.lock().unwrap_or_else(|e| e.into_inner());
            prev.entry(key.clone())
                .or_insert_with(|| self.shared.get(&key));
            self.shared.insert(key.clone(), value.into());
        } else {
            let mut facade = self.facade.lock().unwrap_or_else(|e| e.into_inner());
            facade.insert(key.clone(), value.into());
        }

        let mut mutated = self.mutated.lock().unwrap_or_else(|e| e.into_inner());
        mutated.insert(key.clone());
        let mut latest = self
            .latest_set_key
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *latest = Some(key);
    }

    /// Delete a binding from the facade.
    ///
    /// Shared bindings are untouched; deleting a key this sandbox never
    /// wrote is a no-op, as in the source semantics.
    pub fn delete(&self, key: &str) {
        let mut facade = self.facade.lock().unwrap_or_else(|e| e.into_inner());
        if facade.remove(key).is_some() {
            let mut mutated = self.mutated.lock().unwrap_or_else(|e| e.into_inner());
            mutated.remove(key);
        }
    }

    /// Existence check spanning facade and shared context, so duck-typed
    /// checks behave as if the sandboxed namespace were complete.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let facade = self.facade.lock().unwrap_or_else(|e| e.into_inner());
        facade.contains_key(key) || self.shared.contains(key)
    }

    /// Enumerate the union of facade and shared keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let facade = self.facade.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: HashSet<String> = facade.keys().cloned().collect();
        keys.extend(self.shared.keys());
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        keys
    }

    /// Keys this sandbox has written since activation.
    #[must_use]
    pub fn mutated_keys(&self) -> Vec<String> {
        let mutated = self.mutated.lock().unwrap_or_else(|e| e.into_inner());
        mutated.iter().cloned().collect()
    }

    /// The most recently written key, the fallback pointer for discovering
    /// an entry script's exported lifecycle.
    #[must_use]
    pub fn latest_set_key(&self) -> Option<String> {
        let latest = self
            .latest_set_key
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        latest.clone()
    }

    /// Resume a suspended sandbox.
    pub fn activate(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            let active = self.shared.sandbox_activated();
            debug!(sandbox = %self.id, active, "sandbox activated");
        }
    }

    /// Suspend the sandbox.
    ///
    /// When the last active sandbox over the shared context deactivates,
    /// every key this sandbox wrote through is restored to its
    /// pre-activation binding (or removed if it had none).
    pub fn deactivate(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!(
            sandbox = %self.id,
            mutated = ?self.mutated_keys(),
            "sandbox deactivating, facade mutations retired"
        );

        let active = self.shared.sandbox_deactivated();
        if active == 0 {
            let mut prev = self.escaped_prev.lock().unwrap_or_else(|e| e.into_inner());
            for (key, binding) in prev.drain() {
                match binding {
                    Some(binding) => {
                        debug!(sandbox = %self.id, key, "restoring escaped global");
                        self.shared.insert(key, binding);
                    },
                    None => {
                        debug!(sandbox = %self.id, key, "removing escaped global");
                        self.shared.remove(&key);
                    },
                }
            }
        }
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .field("mutated", &self.mutated_keys().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sandbox(id: &str, shared: &Arc<SharedGlobal>) -> Sandbox {
        Sandbox::new(id, Arc::clone(shared), SandboxOptions::default())
    }

    #[test]
    fn test_writes_stay_in_facade() {
        let shared = SharedGlobal::new();
        shared.insert("theme", json!("light"));

        let sb = sandbox("shop", &shared);
        sb.set("theme", json!("dark"));

        assert_eq!(sb.get("theme").unwrap().as_json(), Some(&json!("dark")));
        // The shared context never saw the write.
        assert_eq!(
            shared.get("theme").unwrap().as_json(),
            Some(&json!("light"))
        );
    }

    #[test]
    fn test_fallback_law() {
        let shared = SharedGlobal::new();
        shared.insert("locale", json!("en"));

        let sb = sandbox("shop", &shared);
        // Before any write, a facade read of an unset key equals the shared value.
        assert_eq!(sb.get("locale").unwrap().as_json(), Some(&json!("en")));
    }

    #[test]
    fn test_two_sandboxes_do_not_observe_each_other() {
        let shared = SharedGlobal::new();
        let a = sandbox("a", &shared);
        let b = sandbox("b", &shared);

        a.set("shared-key", json!("from-a"));
        b.set("shared-key", json!("from-b"));

        assert_eq!(
            a.get("shared-key").unwrap().as_json(),
            Some(&json!("from-a"))
        );
        assert_eq!(
            b.get("shared-key").unwrap().as_json(),
            Some(&json!("from-b"))
        );
        assert!(!shared.contains("shared-key"));
    }

    #[test]
    fn test_self_reference_never_escapes() {
        let shared = SharedGlobal::new();
        shared.insert("globalThis", json!("the-real-global"));
        shared.mark_protected("globalThis");

        let sb = sandbox("shop", &shared);
        assert!(matches!(
            sb.get("globalThis"),
            Some(BindingValue::SelfRef)
        ));
        assert!(matches!(sb.get("window"), Some(BindingValue::SelfRef)));
    }

    #[test]
    fn test_intrinsics_read_through() {
        let shared = SharedGlobal::new();
        shared.insert("fetch", json!("native-fetch"));
        shared.mark_intrinsic("fetch");

        let sb = sandbox("shop", &shared);
        assert_eq!(
            sb.get("fetch").unwrap().as_json(),
            Some(&json!("native-fetch"))
        );
    }

    #[test]
    fn test_write_through_and_restore() {
        let shared = SharedGlobal::new();
        shared.insert("System", json!("host-loader"));

        let sb = sandbox("shop", &shared);
        sb.set("System", json!("app-loader"));
        // Escape keys are physically applied to the shared context.
        assert_eq!(
            shared.get("System").unwrap().as_json(),
            Some(&json!("app-loader"))
        );

        sb.deactivate();
        // Last deactivation restores the prior binding.
        assert_eq!(
            shared.get("System").unwrap().as_json(),
            Some(&json!("host-loader"))
        );
    }

    #[test]
    fn test_write_through_removed_when_previously_absent() {
        let shared = SharedGlobal::new();
        let sb = sandbox("shop", &shared);
        sb.set("__cjsWrapper", json!({"id": 1}));
        assert!(shared.contains("__cjsWrapper"));

        sb.deactivate();
        assert!(!shared.contains("__cjsWrapper"));
    }

    #[test]
    fn test_restore_waits_for_last_active_sandbox() {
        let shared = SharedGlobal::new();
        let a = sandbox("a", &shared);
        let b = sandbox("b", &shared);

        a.set("System", json!("a-loader"));
        a.deactivate();
        // b is still active, so the escaped write must survive.
        assert!(shared.contains("System"));

        b.deactivate();
        assert!(!shared.contains("System"));
    }

    #[test]
    fn test_inactive_writes_are_discarded() {
        let shared = SharedGlobal::new();
        let sb = sandbox("shop", &shared);
        sb.deactivate();

        sb.set("ghost", json!(1));
        assert!(sb.get("ghost").is_none());
        assert!(!shared.contains("ghost"));

        sb.activate();
        sb.set("ghost", json!(2));
        assert_eq!(sb.get("ghost").unwrap().as_json(), Some(&json!(2)));
    }

    #[test]
    fn test_has_and_keys_span_both() {
        let shared = SharedGlobal::new();
        shared.insert("host-only", json!(true));

        let sb = sandbox("shop", &shared);
        sb.set("app-only", json!(true));

        assert!(sb.contains("host-only"));
        assert!(sb.contains("app-only"));
        let keys = sb.keys();
        assert!(keys.contains(&"host-only".to_string()));
        assert!(keys.contains(&"app-only".to_string()));
    }

    #[test]
    fn test_delete_only_touches_facade() {
        let shared = SharedGlobal::new();
        shared.insert("kept", json!(1));

        let sb = sandbox("shop", &shared);
        sb.set("mine", json!(2));
        sb.delete("mine");
        sb.delete("kept");

        assert!(sb.get("mine").is_none());
        assert!(shared.contains("kept"));
        assert!(sb.mutated_keys().is_empty());
    }

    #[test]
    fn test_latest_set_key_and_attribution() {
        let shared = SharedGlobal::new();
        let sb = sandbox("shop", &shared);
        sb.set("first", json!(1));
        sb.set("second", json!(2));
        assert_eq!(sb.latest_set_key(), Some("second".to_string()));
        assert_eq!(shared.current_app(), Some("shop".to_string()));
    }
}
