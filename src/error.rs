//! Error types for the cloud-link client.

use thiserror::Error;

use crate::codec::CodecError;

/// Errors surfaced by the cloud connection and packet layer.
#[derive(Debug, Error)]
pub enum CloudLinkError {
    /// The connection was built without a usable identity.
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// The broadcast endpoint rejected the identity (HTTP 401/403 on upgrade).
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Socket-level failure, closed connection or exhausted reconnect budget.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Packet payload could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl CloudLinkError {
    /// Whether retrying the connection may succeed.
    ///
    /// Rejected credentials and bad configuration will fail the same way on
    /// every attempt, so the reconnect loop treats them as terminal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CloudLinkError::WebSocketError(_) | CloudLinkError::TimeoutError(_)
        )
    }
}

impl From<serde_json::Error> for CloudLinkError {
    fn from(err: serde_json::Error) -> Self {
        CloudLinkError::SerializationError(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CloudLinkError>;
