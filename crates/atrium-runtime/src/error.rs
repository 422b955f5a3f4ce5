//! Runtime error types.

use thiserror::Error;

/// Errors that can occur in the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An application with this name is already registered.
    #[error("application already registered: {name}")]
    DuplicateApp {
        /// The application name.
        name: String,
    },

    /// A registration named no mount container.
    #[error("application {name} registered with an empty container selector")]
    EmptyContainer {
        /// The application name.
        name: String,
    },

    /// No application registered under this name.
    #[error("application not found: {name}")]
    UnknownApp {
        /// The application name.
        name: String,
    },

    /// The application is excluded from routing after a lifecycle failure.
    #[error("application {name} is broken and excluded from routing")]
    AppBroken {
        /// The application name.
        name: String,
    },

    /// The runtime has not been started yet.
    #[error("runtime not started")]
    NotStarted,

    /// The application exports no update lifecycle.
    #[error("application {name} does not export an update lifecycle")]
    UpdateNotSupported {
        /// The application name.
        name: String,
    },

    /// Entry resolution error.
    #[error("entry error: {0}")]
    Entry(#[from] atrium_entry::EntryError),

    /// Script execution error.
    #[error("script error: {0}")]
    Script(#[from] atrium_sandbox::ScriptError),

    /// Export surface validation error.
    #[error("exports error: {0}")]
    Exports(#[from] atrium_core::ExportsError),

    /// Surface or location error.
    #[error("core error: {0}")]
    Core(#[from] atrium_core::CoreError),

    /// An application lifecycle hook failed.
    #[error("application {app} failed during {phase}: {message}")]
    Lifecycle {
        /// The owning application.
        app: String,
        /// The lifecycle phase that failed.
        phase: String,
        /// The underlying failure.
        message: String,
    },

    /// A framework-level hook failed.
    #[error("framework hook failed during {phase}: {message}")]
    Hook {
        /// The hook phase that failed.
        phase: String,
        /// The underlying failure.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
