//! Error types for the evaluator loop.
//!
//! These are the failures that end the loop. Errors raised by the submitted
//! code itself are [`crate::lang::Exception`]s and travel back to the caller
//! inside a response instead.

use thiserror::Error;

/// Fatal error for the read-evaluate-respond loop.
#[derive(Debug, Error)]
pub enum ReplError {
    /// I/O error on the input or output stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error (e.g. missing or non-text `statement`).
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Malformed frame on the input stream.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A single message exceeds the configured size limit.
    #[error("Message size {size} exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Input closed in the middle of a message.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using ReplError.
pub type Result<T> = std::result::Result<T, ReplError>;
