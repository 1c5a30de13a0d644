//! Error types for dutchtrace

use thiserror::Error;

/// Main error type for dutchtrace
#[derive(Error, Debug)]
pub enum AuctionError {
    // Auction errors
    #[error("No participants: an auction needs at least one bidder")]
    NoParticipants,

    #[error("Send to {bidder} failed: {reason}")]
    SendFailure { bidder: String, reason: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid auction state transition: {0}")]
    InvalidStateTransition(String),

    // Network errors
    #[error("Network connection error: {0}")]
    NetworkConnection(String),

    #[error("Message routing error: {0}")]
    MessageRouting(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuctionError {
    /// Whether the error is a per-bidder protocol fault the auction recovers from
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuctionError::SendFailure { .. }
                | AuctionError::MalformedResponse(_)
                | AuctionError::PeerNotFound(_)
                | AuctionError::MessageRouting(_)
        )
    }
}

/// Result type alias for dutchtrace operations
pub type Result<T> = std::result::Result<T, AuctionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AuctionError::PeerNotFound("bidder_7".to_string());
        assert_eq!(err.to_string(), "Peer not found: bidder_7");
    }

    #[test]
    fn test_send_failure_message() {
        let err = AuctionError::SendFailure {
            bidder: "alice".to_string(),
            reason: "channel closed".to_string(),
        };
        assert_eq!(err.to_string(), "Send to alice failed: channel closed");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_no_participants_is_fatal() {
        assert!(!AuctionError::NoParticipants.is_recoverable());
        assert!(!AuctionError::InvalidConfig("decay".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        fn json_error_function() -> Result<u64> {
            let value: u64 = serde_json::from_str("not json")?;
            Ok(value)
        }

        let result = json_error_function();
        assert!(matches!(result.unwrap_err(), AuctionError::Json(_)));
    }
}
