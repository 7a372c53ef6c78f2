//! Error types shared by every core operation.

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A referenced user, group, directory or file does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The effective permission flag for the requested operation is false.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed input, such as a bad import mapping entry.
    #[error("{0}")]
    Invalid(String),

    /// A uniqueness constraint was violated, e.g. a duplicate (name, parent).
    #[error("{0}")]
    Conflict(String),

    /// The underlying store could not complete the operation.
    #[error("storage failure: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{} does not exist.", what))
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Error::Forbidden(reason.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}
