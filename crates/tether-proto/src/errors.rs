//! Error types for handshake messages.

use thiserror::Error;

/// Errors that can occur while building, encoding or decoding handshake
/// messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Encoded message exceeds the maximum allowed size
    #[error("message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge {
        /// Actual message size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Failed to encode data as CBOR
    #[error("failed to encode CBOR: {0}")]
    CborEncode(String),

    /// Failed to decode CBOR data
    #[error("failed to decode CBOR: {0}")]
    CborDecode(String),

    /// Target address could not be parsed or is unusable
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// Convenient Result type alias for handshake operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
