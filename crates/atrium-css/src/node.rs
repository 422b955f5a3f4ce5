//! Scoping entry points.

use std::sync::Mutex;
use tracing::debug;

use crate::rewrite::rewrite;

/// A style sheet holder that may receive its content after attachment.
///
/// Frameworks routinely attach an empty sheet first and stream rules into it
/// later, so scoping has to work in both orders.
#[derive(Debug, Default)]
pub struct StyleNode {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    content: Option<String>,
    /// One-time marker; a processed node is never rewritten again.
    processed: bool,
    /// Scope waiting for content to arrive.
    deferred_scope: Option<String>,
}

impl StyleNode {
    /// A node that already carries its sheet.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                content: Some(content.into()),
                processed: false,
                deferred_scope: None,
            }),
        }
    }

    /// A node whose sheet will be populated later.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The current sheet text, if populated.
    #[must_use]
    pub fn content(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.content.clone()
    }

    /// Whether the node has been scoped.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.processed
    }

    /// Populate the sheet. If a scope was deferred on this node, the
    /// incoming content is rewritten immediately.
    pub fn set_content(&self, content: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.processed {
            return;
        }
        let content = content.into();
        if let Some(scope) = inner.deferred_scope.take() {
            debug!(scope, "scoping late-populated style node");
            inner.content = Some(rewrite(&content, &scope));
            inner.processed = true;
        } else {
            inner.content = Some(content);
        }
    }
}

/// Scope `node` under `scope`, at most once.
///
/// A node with content is rewritten in place and marked; re-processing a
/// marked node is a no-op. A node without content records the scope and is
/// rewritten when content first arrives.
pub fn process(node: &StyleNode, scope: &str) {
    let mut inner = node.inner.lock().unwrap_or_else(|e| e.into_inner());
    if inner.processed {
        return;
    }
    match inner.content.take() {
        Some(content) if !content.is_empty() => {
            inner.content = Some(rewrite(&content, scope));
            inner.processed = true;
        }
        other => {
            inner.content = other;
            inner.deferred_scope = Some(scope.to_string());
        }
    }
}
