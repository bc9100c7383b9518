//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The bytes did not form a valid message.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// A response carried neither a result nor an error in the expected shape.
    #[error("invalid function outcome: {0}")]
    InvalidOutcome(String),
}
