//! Error types for quill-core

use thiserror::Error;

/// Result type alias using quill-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in quill-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No stored credential; `quill init` has not been run
    #[error("Not authenticated. Run `quill init` to sign in.")]
    AuthMissing,

    /// The authorization code was rejected during the exchange
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// The stored access token was refused by the service
    #[error("Access token expired or revoked. Run `quill init` to sign in again.")]
    AuthExpired,

    /// Transient network failures that survived retry exhaustion
    #[error("Sync failed: {0}")]
    SyncFailed(String),

    /// A retryable network condition: timeout, connect failure, or 5xx.
    /// Retried internally; callers see [`Error::SyncFailed`] on exhaustion.
    #[error("Transient network error: {0}")]
    NetworkTransient(String),

    /// Another invocation holds the index write lock
    #[error("The local index is in use by another quill process. Try again shortly.")]
    IndexBusy,

    /// Persisted state is unreadable or malformed
    #[error("Local index is corrupt: {0}. Re-run `quill sync` after clearing the data directory.")]
    IndexCorrupt(String),

    /// Malformed search filter arguments
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// HTTP error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;

        match &error {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Self::IndexBusy,
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    Self::IndexCorrupt(error.to_string())
                }
                _ => Self::Database(error.to_string()),
            },
            _ => Self::Database(error.to_string()),
        }
    }
}

impl Error {
    /// Whether this error represents a transient network condition worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkTransient(_) => true,
            Self::Http(error) => {
                error.is_timeout()
                    || error.is_connect()
                    || error
                        .status()
                        .is_some_and(|status| status.is_server_error())
            }
            _ => false,
        }
    }
}
