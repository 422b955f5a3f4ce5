//! Application descriptors, activity rules, and the lifecycle status machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::location::Location;

/// Where a micro-app's entry comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntrySource {
    /// A remote locator, fetched and parsed as markup.
    Remote(String),
    /// An explicit manifest of scripts, styles, and markup.
    Manifest {
        /// Ordered script references.
        #[serde(default)]
        scripts: Vec<String>,
        /// Ordered style references.
        #[serde(default)]
        styles: Vec<String>,
        /// Markup template the placeholders are injected into.
        #[serde(default)]
        markup: String,
    },
}

impl EntrySource {
    /// Cache identity for this entry.
    ///
    /// Remote entries are cached by locator; manifest entries by their
    /// ordered contents.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self {
            Self::Remote(url) => url.clone(),
            Self::Manifest {
                scripts,
                styles,
                markup,
            } => format!(
                "manifest:{}:{}:{}",
                scripts.join(","),
                styles.join(","),
                markup.len()
            ),
        }
    }
}

impl From<&str> for EntrySource {
    fn from(url: &str) -> Self {
        Self::Remote(url.to_string())
    }
}

impl From<String> for EntrySource {
    fn from(url: String) -> Self {
        Self::Remote(url)
    }
}

/// Predicate deciding whether an application should be active for a location.
#[derive(Clone)]
pub enum ActiveRule {
    /// Active when the location path starts with the prefix.
    Prefix(String),
    /// Arbitrary predicate over the current location.
    Predicate(Arc<dyn Fn(&Location) -> bool + Send + Sync>),
}

impl ActiveRule {
    /// Build a predicate rule from a closure.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Location) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Evaluate the rule against a location.
    #[must_use]
    pub fn matches(&self, location: &Location) -> bool {
        match self {
            Self::Prefix(prefix) => location.path_starts_with(prefix),
            Self::Predicate(f) => f(location),
        }
    }
}

impl fmt::Debug for ActiveRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix(p) => f.debug_tuple("Prefix").field(p).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for ActiveRule {
    fn from(prefix: &str) -> Self {
        Self::Prefix(prefix.to_string())
    }
}

/// Immutable registration record for a micro-app.
///
/// Created once at registration time and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct AppDescriptor {
    /// Unique application name.
    pub name: String,
    /// Entry source.
    pub entry: EntrySource,
    /// Selector of the mount container this app renders into.
    pub container: String,
    /// Rule deciding when the app should be active.
    pub active_rule: ActiveRule,
    /// Initial props handed to the app's lifecycle functions.
    pub props: Value,
}

impl AppDescriptor {
    /// Create a descriptor with empty props.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        entry: impl Into<EntrySource>,
        container: impl Into<String>,
        active_rule: impl Into<ActiveRule>,
    ) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            container: container.into(),
            active_rule: active_rule.into(),
            props: Value::Null,
        }
    }

    /// Attach initial props.
    #[must_use]
    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }
}

/// Lifecycle status of an application instance.
///
/// Transitions are driven exclusively by the orchestrator. `LoadError` is
/// retryable; `SkipBecauseBroken` is terminal until re-registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    /// Registered but not yet loaded.
    NotLoaded,
    /// Entry resolution and script preparation in flight.
    LoadingSourceCode,
    /// Loaded, bootstrap not yet run.
    NotBootstrapped,
    /// Bootstrap hook chain in flight.
    Bootstrapping,
    /// Bootstrapped (or unmounted) and ready to mount.
    NotMounted,
    /// Mount hook chain in flight.
    Mounting,
    /// Mounted and live.
    Mounted,
    /// Unmount hook chain in flight.
    Unmounting,
    /// Unload hook chain in flight.
    Unloading,
    /// The last load attempt failed; the next trigger retries from scratch.
    LoadError,
    /// A lifecycle hook failed; excluded from routing until re-registered.
    SkipBecauseBroken,
}

impl AppStatus {
    /// Whether the instance currently counts as loaded.
    #[must_use]
    pub fn is_loaded(self) -> bool {
        !matches!(
            self,
            Self::NotLoaded | Self::LoadingSourceCode | Self::LoadError
        )
    }

    /// Whether a load may be attempted from this status.
    #[must_use]
    pub fn can_load(self) -> bool {
        matches!(self, Self::NotLoaded | Self::LoadError)
    }

    /// Whether the instance is excluded from routing for good.
    #[must_use]
    pub fn is_broken(self) -> bool {
        matches!(self, Self::SkipBecauseBroken)
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotLoaded => "NOT_LOADED",
            Self::LoadingSourceCode => "LOADING_SOURCE_CODE",
            Self::NotBootstrapped => "NOT_BOOTSTRAPPED",
            Self::Bootstrapping => "BOOTSTRAPPING",
            Self::NotMounted => "NOT_MOUNTED",
            Self::Mounting => "MOUNTING",
            Self::Mounted => "MOUNTED",
            Self::Unmounting => "UNMOUNTING",
            Self::Unloading => "UNLOADING",
            Self::LoadError => "LOAD_ERROR",
            Self::SkipBecauseBroken => "SKIP_BECAUSE_BROKEN",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_rule_prefix() {
        let rule = ActiveRule::from("/shop");
        let loc = Location::parse("http://localhost/shop/cart").unwrap();
        assert!(rule.matches(&loc));
        let other = Location::parse("http://localhost/admin").unwrap();
        assert!(!rule.matches(&other));
    }

    #[test]
    fn test_active_rule_predicate() {
        let rule = ActiveRule::predicate(|loc| loc.path().contains("cart"));
        let loc = Location::parse("http://localhost/shop/cart").unwrap();
        assert!(rule.matches(&loc));
    }

    #[test]
    fn test_status_predicates() {
        assert!(AppStatus::NotLoaded.can_load());
        assert!(AppStatus::LoadError.can_load());
        assert!(!AppStatus::Mounted.can_load());
        assert!(AppStatus::Mounted.is_loaded());
        assert!(!AppStatus::LoadError.is_loaded());
        assert!(AppStatus::SkipBecauseBroken.is_broken());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(AppStatus::NotLoaded.to_string(), "NOT_LOADED");
        assert_eq!(
            AppStatus::SkipBecauseBroken.to_string(),
            "SKIP_BECAUSE_BROKEN"
        );
    }

    #[test]
    fn test_entry_cache_key() {
        let a = EntrySource::from("http://localhost:2222");
        let b = EntrySource::from("http://localhost:2222");
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
