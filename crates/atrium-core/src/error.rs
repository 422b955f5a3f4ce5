//! Core error types.

use thiserror::Error;

/// Errors raised by the foundation types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested mount container is not part of the mount surface.
    #[error("mount container not found: {selector}")]
    ContainerNotFound {
        /// The container selector that failed to resolve.
        selector: String,
    },

    /// A wrapper operation referenced an instance that is not attached.
    #[error("wrapper for instance {instance_id} is not attached to {selector}")]
    WrapperNotAttached {
        /// The wrapper's instance id.
        instance_id: String,
        /// The container it was expected under.
        selector: String,
    },

    /// An application locator could not be parsed.
    #[error("invalid location: {0}")]
    InvalidLocation(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
