//! Error types for fetchtree

use thiserror::Error;

/// Result type alias for fetchtree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for fetchtree operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected repository URL
    #[error("Invalid git URL: {0}")]
    InvalidUrl(String),

    /// Git process could not be run
    #[error("Git error: {0}")]
    Git(String),

    /// The store actor is no longer running
    #[error("State store has shut down")]
    StoreClosed,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
