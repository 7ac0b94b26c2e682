//! Error types for rpc-channel.
//!
//! Two families:
//! - [`ChannelError`] - bind-time configuration errors and terminal
//!   transport/decoding failures of the dispatch loop.
//! - [`CallError`] - per-request failures that are reported back to the
//!   peer inside a response and never stop the loop.

use thiserror::Error;

/// Main error type for channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// I/O error while reading from or writing to the stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON frame could not be decoded or encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Buffered bytes grew past the frame limit without completing a value.
    #[error("Frame size {size} exceeds maximum {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// Stream ended in the middle of a frame.
    #[error("Stream closed with {0} bytes of an incomplete frame buffered")]
    TruncatedFrame(usize),

    /// A service is already bound to this channel.
    #[error("Can't bind to different objects: {bound} is already bound")]
    AlreadyBound { bound: &'static str },

    /// Two operations share a name, or the name is already routed.
    #[error("Duplicate definitions of {0}. Overloading is not supported.")]
    DuplicateMethod(String),

    /// The dispatch task was cancelled or panicked.
    #[error("Dispatch loop aborted: {0}")]
    Aborted(String),
}

impl ChannelError {
    /// True for failures caused by bytes that could not be parsed as a frame.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            ChannelError::Json(_)
                | ChannelError::MsgPackDecode(_)
                | ChannelError::FrameTooLarge { .. }
                | ChannelError::TruncatedFrame(_)
        )
    }

    /// True for failures of the underlying stream.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, ChannelError::Io(_))
    }
}

/// Failure of a single dispatched call.
///
/// The `Display` output is what the peer receives in `Response::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// No handler is routed under the requested name.
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    /// Positional arguments don't match the declared parameter count.
    #[error("Expected {expected} argument(s) but received {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    /// An argument could not be converted to its parameter type.
    #[error("Argument {index} could not be converted: {message}")]
    ArgumentConversion { index: usize, message: String },

    /// The operation returned an error.
    #[error("{0}")]
    Invocation(String),

    /// The operation panicked.
    #[error("{0}")]
    Panicked(String),

    /// The operation's return value could not be turned into a wire value.
    #[error("Result could not be encoded: {0}")]
    ResultEncoding(String),
}

/// Result type alias using ChannelError.
pub type Result<T> = std::result::Result<T, ChannelError>;
