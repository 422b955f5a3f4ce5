//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Only one routed application may be live at a time; each mount waits
    /// for the previous instance's unmount to settle.
    pub singular: bool,
    /// Sandbox behavior.
    pub sandbox: SandboxConfig,
    /// Entry prefetch strategy.
    pub prefetch: PrefetchConfig,
    /// Only location changes trigger routing passes (manual triggers are
    /// still honored).
    pub url_reroute_only: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            singular: true,
            sandbox: SandboxConfig::default(),
            prefetch: PrefetchConfig::AfterFirstMount,
            url_reroute_only: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] when the text is not valid TOML for
    /// this schema.
    pub fn from_toml_str(text: &str) -> RuntimeResult<Self> {
        toml::from_str(text).map_err(|e| RuntimeError::Config(e.to_string()))
    }
}

/// Sandbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Whether applications execute against an isolating facade. When
    /// disabled, facade mutations are never retired, so globals leak across
    /// activations the way an unsandboxed host would.
    pub enabled: bool,
    /// Whether application style sheets are rewritten under the wrapper's
    /// scope selector.
    pub scoped_css: bool,
    /// Extra keys written through to the shared context, on top of the
    /// module-loader defaults.
    pub escape_keys: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scoped_css: true,
            escape_keys: Vec::new(),
        }
    }
}

/// Declarative prefetch strategies.
///
/// Classifier-driven prefetch is configured programmatically; see the
/// prefetch module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchConfig {
    /// No prefetching.
    Disabled,
    /// Warm every registered entry immediately at start.
    All,
    /// Warm the remaining entries once the first application mounted.
    AfterFirstMount,
    /// Warm the named entries immediately at start.
    Named(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.singular);
        assert!(config.sandbox.enabled);
        assert!(config.sandbox.scoped_css);
        assert_eq!(config.prefetch, PrefetchConfig::AfterFirstMount);
        assert!(!config.url_reroute_only);
    }

    #[test]
    fn test_from_toml() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            singular = false
            url_reroute_only = true

            [sandbox]
            enabled = true
            scoped_css = false
            escape_keys = ["__shared_runtime__"]

            [prefetch]
            named = ["shop", "admin"]
            "#,
        )
        .unwrap();
        assert!(!config.singular);
        assert!(config.url_reroute_only);
        assert!(!config.sandbox.scoped_css);
        assert_eq!(
            config.sandbox.escape_keys,
            vec!["__shared_runtime__".to_string()]
        );
        assert_eq!(
            config.prefetch,
            PrefetchConfig::Named(vec!["shop".to_string(), "admin".to_string()])
        );
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let err = RuntimeConfig::from_toml_str("singular = \"maybe\"").unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}
