//! Sandbox error types.

use thiserror::Error;

/// Errors raised while executing an application's scripts.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// No module is registered for the script reference.
    #[error("no module registered for script {source_id}")]
    UnresolvedModule {
        /// The script reference that failed to resolve.
        source_id: String,
    },

    /// The designated entry script failed; fatal to the load.
    #[error("entry script {source_id} failed: {message}")]
    EntryScript {
        /// The entry script reference.
        source_id: String,
        /// The underlying failure.
        message: String,
    },

    /// A script body failed while running.
    #[error("script {source_id} failed: {message}")]
    Execution {
        /// The script reference.
        source_id: String,
        /// The underlying failure.
        message: String,
    },
}

impl ScriptError {
    /// Build an execution error for `source_id`.
    pub fn execution(source_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Execution {
            source_id: source_id.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for script execution.
pub type ScriptResult<T> = Result<T, ScriptError>;
