//! Domain Layer - Errors
//!
//! Hard failures abort an operation and reach the caller. Soft conditions
//! (signed out, collection not synced, query without a server id) are logged
//! by the services and never become a `DomainError`.

use thiserror::Error;

/// Common result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level errors
#[derive(Error, Debug)]
pub enum DomainError {
    /// A collection (or a parent that had to exist) could not be found
    #[error("Not found: {0}")]
    NotFound(String),

    /// An import payload is empty, malformed or carries the wrong version/type
    #[error("{0}")]
    InvalidDocument(String),

    /// The remote service returned no result where one was required
    #[error("Remote rejected: {0}")]
    RemoteRejected(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Remote error: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DomainError::NotFound(what.into())
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        DomainError::InvalidDocument(message.into())
    }

    pub fn remote_rejected(message: impl Into<String>) -> Self {
        DomainError::RemoteRejected(message.into())
    }
}
