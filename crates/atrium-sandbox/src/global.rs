//! The shared global context.
//!
//! In the ported design the mutable global namespace is an explicit context
//! object rather than ambient lookup: every sandbox holds a handle to one
//! [`SharedGlobal`] and mediates all reads and writes against it.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

use atrium_core::RawExports;

/// Keys whose reads are self-referential: they must resolve back to the
/// reading sandbox's facade, never to the shared context, or a script could
/// trivially escape its sandbox.
pub const SELF_KEYS: &[&str] = &["globalThis", "window", "self"];

/// A value bound to a global key.
#[derive(Clone)]
pub enum BindingValue {
    /// Plain data.
    Json(Value),
    /// A lifecycle export surface written by an entry script.
    Exports(Arc<RawExports>),
    /// The namespace's reference to itself; resolves to the reading facade.
    SelfRef,
}

impl BindingValue {
    /// The export surface, when this binding carries one.
    #[must_use]
    pub fn as_exports(&self) -> Option<Arc<RawExports>> {
        match self {
            Self::Exports(exports) => Some(Arc::clone(exports)),
            _ => None,
        }
    }

    /// The JSON value, when this binding carries plain data.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Exports(_) => f.write_str("Exports(..)"),
            Self::SelfRef => f.write_str("SelfRef"),
        }
    }
}

impl From<Value> for BindingValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl PartialEq for BindingValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Exports(a), Self::Exports(b)) => Arc::ptr_eq(a, b),
            (Self::SelfRef, Self::SelfRef) => true,
            _ => false,
        }
    }
}

/// The shared global namespace all sandboxes are backed by.
///
/// Intrinsic keys model platform bindings with accessor semantics: reads of
/// them always resolve against the shared context (the value-model stand-in
/// for rebinding a platform function's implicit receiver to the real
/// namespace). Protected keys model non-removable bindings and are
/// snapshotted into every facade at construction.
pub struct SharedGlobal {
    bindings: DashMap<String, BindingValue>,
    intrinsics: Mutex<HashSet<String>>,
    protected: Mutex<HashSet<String>>,
    active_sandboxes: AtomicUsize,
    current_app: Mutex<Option<String>>,
}

impl SharedGlobal {
    /// Empty shared context.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bindings: DashMap::new(),
            intrinsics: Mutex::new(HashSet::new()),
            protected: Mutex::new(HashSet::new()),
            active_sandboxes: AtomicUsize::new(0),
            current_app: Mutex::new(None),
        })
    }

    /// Bind `key` directly in the shared context.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<BindingValue>) {
        self.bindings.insert(key.into(), value.into());
    }

    /// Read a binding from the shared context.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<BindingValue> {
        self.bindings.get(key).map(|entry| entry.value().clone())
    }

    /// Remove a binding; returns the previous value if any.
    pub fn remove(&self, key: &str) -> Option<BindingValue> {
        self.bindings.remove(key).map(|(_, v)| v)
    }

    /// Whether the shared context holds `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    /// All keys currently bound in the shared context.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.bindings.iter().map(|e| e.key().clone()).collect()
    }

    /// Mark `key` as an intrinsic: reads always resolve against this context.
    pub fn mark_intrinsic(&self, key: impl Into<String>) {
        let mut intrinsics = self.intrinsics.lock().unwrap_or_else(|e| e.into_inner());
        intrinsics.insert(key.into());
    }

    /// Whether `key` is an intrinsic.
    #[must_use]
    pub fn is_intrinsic(&self, key: &str) -> bool {
        let intrinsics = self.intrinsics.lock().unwrap_or_else(|e| e.into_inner());
        intrinsics.contains(key)
    }

    /// Mark `key` as protected: snapshotted into every facade.
    pub fn mark_protected(&self, key: impl Into<String>) {
        let mut protected = self.protected.lock().unwrap_or_else(|e| e.into_inner());
        protected.insert(key.into());
    }

    /// The protected key set.
    #[must_use]
    pub fn protected_keys(&self) -> Vec<String> {
        let protected = self.protected.lock().unwrap_or_else(|e| e.into_inner());
        protected.iter().cloned().collect()
    }

    /// Record which application is currently executing against the context.
    pub fn set_current_app(&self, id: &str) {
        let mut current = self.current_app.lock().unwrap_or_else(|e| e.into_inner());
        if current.as_deref() != Some(id) {
            trace!(app = id, "current running app changed");
            *current = Some(id.to_string());
        }
    }

    /// The application attributed with the latest write, if any.
    #[must_use]
    pub fn current_app(&self) -> Option<String> {
        let current = self.current_app.lock().unwrap_or_else(|e| e.into_inner());
        current.clone()
    }

    /// Clear the attribution slot, typically after a script run settles.
    pub fn clear_current_app(&self) {
        let mut current = self.current_app.lock().unwrap_or_else(|e| e.into_inner());
        *current = None;
    }

    pub(crate) fn sandbox_activated(&self) -> usize {
        self.active_sandboxes.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn sandbox_deactivated(&self) -> usize {
        self.active_sandboxes.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Number of currently active sandboxes over this context.
    #[must_use]
    pub fn active_sandboxes(&self) -> usize {
        self.active_sandboxes.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for SharedGlobal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedGlobal")
            .field("bindings", &self.bindings.len())
            .field("active_sandboxes", &self.active_sandboxes())
            .finish_non_exhaustive()
    }
}
