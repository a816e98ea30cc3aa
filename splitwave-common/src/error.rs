//! Common error types for splitwave

use thiserror::Error;

/// Common result type for splitwave operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across splitwave components
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map a file-level I/O failure, treating a vanished file as not-found.
    ///
    /// Sessions can be swept or deleted while another request is reading
    /// them; callers see that race as a missing resource.
    pub fn from_io(err: std::io::Error, what: impl Into<String>) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(what.into())
        } else {
            Error::Io(err)
        }
    }
}
