//! Entry resolution error types.

use thiserror::Error;

/// Errors raised while fetching a remote asset.
///
/// Cloneable so a cached resolution failure can be handed to every waiter of
/// the shared in-flight future.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The server answered with an error status.
    #[error("fetch of {url} answered status {status}")]
    Status {
        /// The requested address.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The request failed before a response arrived.
    #[error("fetch of {url} failed: {message}")]
    Transport {
        /// The requested address.
        url: String,
        /// The underlying transport failure.
        message: String,
    },
}

impl FetchError {
    /// Build a transport error for `url`.
    pub fn transport(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised while resolving an application entry.
#[derive(Debug, Clone, Error)]
pub enum EntryError {
    /// An asset fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The entry locator is not a parseable absolute address.
    #[error("invalid entry address {url}: {message}")]
    InvalidAddress {
        /// The offending locator.
        url: String,
        /// The parse failure.
        message: String,
    },

    /// More than one script in the markup is marked as the entry.
    #[error("entry {url} marks more than one script as the entry")]
    MultipleEntryScripts {
        /// The entry locator.
        url: String,
    },
}

/// Result type for entry resolution.
pub type EntryResult<T> = Result<T, EntryError>;
