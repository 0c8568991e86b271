//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding or encoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Missing message type")]
    MissingType,

    #[error("Unknown message type: {0:?}")]
    UnknownType(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}
