//! Error types for engage.

use thiserror::Error;

/// Result type alias using engage's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for engage operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Inbound message event could not be parsed
    #[error("Invalid event format: {0}")]
    InvalidEventFormat(String),

    /// Availability grid has the wrong shape
    #[error("Invalid availability: {0}")]
    InvalidAvailability(String),

    /// Fewer than two members were supplied to the matcher
    #[error("Insufficient members: need at least 2, got {0}")]
    InsufficientMembers(usize),

    /// Preference structure cannot produce a complete pairing
    #[error("Degenerate preferences: {0}")]
    DegeneratePreferences(String),

    /// A transactional write failed and was rolled back
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_event_format() {
        let err = Error::InvalidEventFormat("channel_id is empty".to_string());
        assert_eq!(err.to_string(), "Invalid event format: channel_id is empty");
    }

    #[test]
    fn test_error_display_insufficient_members() {
        let err = Error::InsufficientMembers(1);
        assert_eq!(
            err.to_string(),
            "Insufficient members: need at least 2, got 1"
        );
    }

    #[test]
    fn test_error_display_degenerate_preferences() {
        let err = Error::DegeneratePreferences("member 3 has no candidates".to_string());
        assert_eq!(
            err.to_string(),
            "Degenerate preferences: member 3 has no candidates"
        );
    }

    #[test]
    fn test_error_display_transaction() {
        let err = Error::Transaction("connection reset".to_string());
        assert_eq!(err.to_string(), "Transaction failed: connection reset");
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout("flush exceeded 30000ms".to_string());
        assert_eq!(err.to_string(), "Timed out: flush exceeded 30000ms");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
