//! Error types for the offline queue

use thiserror::Error;

/// The main error type for offline queue operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (unknown keys, wrong types)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage errors from the queue database
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Re-injection into the host pipeline failed
    #[error("Re-injection error: {0}")]
    Reinjection(String),
}

/// A specialized Result type for offline queue operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Reinjection("provider unreachable".to_string());
        assert_eq!(err.to_string(), "Re-injection error: provider unreachable");
    }

    #[test]
    fn test_serde_error_converts() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
