use thiserror::Error;

/// Custom error types for the tick clock
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid time: {0}")]
    InvalidTime(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid time error
    pub fn invalid_time(msg: impl Into<String>) -> Self {
        Error::InvalidTime(msg.into())
    }
}
