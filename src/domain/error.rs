//! Domain error types

use thiserror::Error;

/// Errors that can occur while analysing a capture
#[derive(Error, Debug)]
pub enum SigscopeError {
    #[error("Another task is already running")]
    Busy,

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("Task error: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for sigscope operations
pub type SigscopeResult<T> = Result<T, SigscopeError>;
