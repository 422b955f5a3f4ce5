//! The DOM-like mount surface.
//!
//! The surface is owned by the orchestrator: containers are registered by the
//! host, and child applications are only ever handed their own wrapper
//! sub-tree to manipulate.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{CoreError, CoreResult};

/// Attribute carrying the style-scoping tag on a wrapper element.
pub const SCOPE_ATTR: &str = "data-atrium";

/// Rendering phase, used for diagnostics and container-existence policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Initial render while the app is loading.
    Loading,
    /// Render right before the app's mount hook runs.
    Mounting,
    /// Render after the mount hook settled.
    Mounted,
    /// Teardown render; a missing container is tolerated here.
    Unmounted,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Mounting => write!(f, "mounting"),
            Self::Mounted => write!(f, "mounted"),
            Self::Unmounted => write!(f, "unmounted"),
        }
    }
}

/// One application's wrapper element: the sub-tree the app may manipulate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppWrapper {
    /// Instance id of the activation owning this wrapper.
    pub instance_id: String,
    /// The owning application's name.
    pub app_name: String,
    /// Wrapper attributes (includes the scope tag).
    pub attrs: BTreeMap<String, String>,
    /// The rewritten markup template rendered inside the wrapper.
    pub markup: String,
    /// Scoped stylesheet texts attached to the wrapper.
    pub styles: Vec<String>,
}

impl AppWrapper {
    /// Build a wrapper tagged with the scope attribute.
    #[must_use]
    pub fn new(
        instance_id: impl Into<String>,
        app_name: impl Into<String>,
        markup: impl Into<String>,
    ) -> Self {
        let instance_id = instance_id.into();
        let mut attrs = BTreeMap::new();
        attrs.insert(SCOPE_ATTR.to_string(), instance_id.clone());
        Self {
            instance_id,
            app_name: app_name.into(),
            attrs,
            markup: markup.into(),
            styles: Vec::new(),
        }
    }

    /// Set an extra attribute.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// The selector confining this wrapper's scoped styles.
    #[must_use]
    pub fn scope_selector(&self) -> String {
        format!("div[{SCOPE_ATTR}=\"{}\"]", self.instance_id)
    }
}

#[derive(Debug, Default)]
struct Container {
    children: Vec<AppWrapper>,
}

/// The mount surface: named containers holding app wrappers.
#[derive(Debug, Default)]
pub struct MountSurface {
    containers: Mutex<HashMap<String, Container>>,
}

impl MountSurface {
    /// Empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container under `selector`. Idempotent.
    pub fn insert_container(&self, selector: impl Into<String>) {
        let selector = selector.into();
        let mut containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        containers.entry(selector).or_default();
    }

    /// Remove a container and everything under it.
    pub fn remove_container(&self, selector: &str) {
        let mut containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        containers.remove(selector);
    }

    /// Whether a container is registered.
    #[must_use]
    pub fn has_container(&self, selector: &str) -> bool {
        let containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        containers.contains_key(selector)
    }

    /// Number of wrapper children under a container.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ContainerNotFound`] for an unregistered selector.
    pub fn child_count(&self, selector: &str) -> CoreResult<usize> {
        let containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        containers
            .get(selector)
            .map(|c| c.children.len())
            .ok_or_else(|| CoreError::ContainerNotFound {
                selector: selector.to_string(),
            })
    }

    /// Render `wrapper` into the container, or clear it when `wrapper` is
    /// `None`.
    ///
    /// The container is cleared before a new wrapper is appended, so a
    /// container never holds more than one wrapper. A wrapper already in
    /// place is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ContainerNotFound`] when the container is missing
    /// in any phase except [`RenderPhase::Unmounted`]; the container may
    /// legitimately disappear before teardown finishes.
    pub fn render(
        &self,
        selector: &str,
        wrapper: Option<AppWrapper>,
        phase: RenderPhase,
    ) -> CoreResult<()> {
        let mut containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        let Some(container) = containers.get_mut(selector) else {
            if phase == RenderPhase::Unmounted {
                trace!(selector, "container already gone at unmount render");
                return Ok(());
            }
            return Err(CoreError::ContainerNotFound {
                selector: selector.to_string(),
            });
        };

        match wrapper {
            Some(wrapper) => {
                if container
                    .children
                    .iter()
                    .any(|c| c.instance_id == wrapper.instance_id)
                {
                    trace!(selector, instance = %wrapper.instance_id, %phase, "wrapper already attached");
                    return Ok(());
                }
                debug!(selector, instance = %wrapper.instance_id, %phase, "attaching wrapper");
                container.children.clear();
                container.children.push(wrapper);
            },
            None => {
                debug!(selector, %phase, "clearing container");
                container.children.clear();
            },
        }
        Ok(())
    }

    /// Run `f` against the attached wrapper of `instance_id`.
    ///
    /// This is the sub-tree handle given to child applications: they can
    /// mutate their own wrapper but nothing else on the surface.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ContainerNotFound`] or
    /// [`CoreError::WrapperNotAttached`] when the target does not exist.
    pub fn with_wrapper<R>(
        &self,
        selector: &str,
        instance_id: &str,
        f: impl FnOnce(&mut AppWrapper) -> R,
    ) -> CoreResult<R> {
        let mut containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        let container =
            containers
                .get_mut(selector)
                .ok_or_else(|| CoreError::ContainerNotFound {
                    selector: selector.to_string(),
                })?;
        let wrapper = container
            .children
            .iter_mut()
            .find(|c| c.instance_id == instance_id)
            .ok_or_else(|| CoreError::WrapperNotAttached {
                instance_id: instance_id.to_string(),
                selector: selector.to_string(),
            })?;
        Ok(f(wrapper))
    }

    /// Snapshot of the wrapper of `instance_id`, if attached.
    #[must_use]
    pub fn wrapper(&self, selector: &str, instance_id: &str) -> Option<AppWrapper> {
        let containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        containers.get(selector).and_then(|c| {
            c.children
                .iter()
                .find(|w| w.instance_id == instance_id)
                .cloned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_clears_then_appends() {
        let surface = MountSurface::new();
        surface.insert_container("#app");

        let a = AppWrapper::new("shop", "shop", "<main></main>");
        surface
            .render("#app", Some(a), RenderPhase::Loading)
            .unwrap();
        assert_eq!(surface.child_count("#app").unwrap(), 1);

        let b = AppWrapper::new("admin", "admin", "<main></main>");
        surface
            .render("#app", Some(b), RenderPhase::Mounting)
            .unwrap();
        assert_eq!(surface.child_count("#app").unwrap(), 1);
        assert!(surface.wrapper("#app", "shop").is_none());
        assert!(surface.wrapper("#app", "admin").is_some());
    }

    #[test]
    fn test_render_missing_container() {
        let surface = MountSurface::new();
        let w = AppWrapper::new("shop", "shop", "");
        let err = surface
            .render("#nope", Some(w), RenderPhase::Mounting)
            .unwrap_err();
        assert!(matches!(err, CoreError::ContainerNotFound { .. }));

        // Teardown tolerates a container that is already gone.
        surface
            .render("#nope", None, RenderPhase::Unmounted)
            .unwrap();
    }

    #[test]
    fn test_rerender_same_wrapper_is_noop() {
        let surface = MountSurface::new();
        surface.insert_container("#app");
        let w = AppWrapper::new("shop", "shop", "<p>hi</p>");
        surface
            .render("#app", Some(w.clone()), RenderPhase::Loading)
            .unwrap();
        surface
            .render("#app", Some(w), RenderPhase::Mounting)
            .unwrap();
        assert_eq!(surface.child_count("#app").unwrap(), 1);
    }

    #[test]
    fn test_with_wrapper_scopes_mutation() {
        let surface = MountSurface::new();
        surface.insert_container("#app");
        let w = AppWrapper::new("shop", "shop", "");
        surface
            .render("#app", Some(w), RenderPhase::Mounted)
            .unwrap();

        surface
            .with_wrapper("#app", "shop", |w| {
                w.markup = "<p>rendered</p>".to_string();
            })
            .unwrap();
        assert_eq!(
            surface.wrapper("#app", "shop").unwrap().markup,
            "<p>rendered</p>"
        );

        let err = surface
            .with_wrapper("#app", "ghost", |_| ())
            .unwrap_err();
        assert!(matches!(err, CoreError::WrapperNotAttached { .. }));
    }

    #[test]
    fn test_scope_selector() {
        let w = AppWrapper::new("shop-2", "shop", "");
        assert_eq!(w.scope_selector(), "div[data-atrium=\"shop-2\"]");
    }
}
