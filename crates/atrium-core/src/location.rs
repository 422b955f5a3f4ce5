//! Location and navigation origin types.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{CoreError, CoreResult};

/// The host's current location.
///
/// A value snapshot, not a live handle: the navigation bus owns the current
/// location and hands out clones of it to activity rules and listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    href: String,
    path: String,
}

impl Location {
    /// Parse a location from an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidLocation`] if `href` is not an absolute URL.
    pub fn parse(href: impl Into<String>) -> CoreResult<Self> {
        let href = href.into();
        let url = Url::parse(&href).map_err(|e| CoreError::InvalidLocation(e.to_string()))?;
        Ok(Self {
            path: url.path().to_string(),
            href,
        })
    }

    /// The full URL this location was parsed from.
    #[must_use]
    pub fn href(&self) -> &str {
        &self.href
    }

    /// The path component of the location.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the location's path starts with `prefix`.
    #[must_use]
    pub fn path_starts_with(&self, prefix: &str) -> bool {
        self.path.starts_with(prefix)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.href)
    }
}

/// Who initiated a navigation.
///
/// Listeners use this marker to tell framework-driven navigation apart from
/// external (host-native) navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationOrigin {
    /// Navigation issued through the framework's own navigation bus.
    Framework,
    /// Navigation observed from outside the framework.
    External,
}

impl fmt::Display for NavigationOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framework => write!(f, "framework"),
            Self::External => write!(f, "external"),
        }
    }
}
