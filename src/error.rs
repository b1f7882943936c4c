//! Error types
//!
//! Errors surfaced synchronously to callers of the stream controller.
//! Failures inside forwarding tasks (observer callbacks, connection sends)
//! are logged and never reach this type.

use crate::media::MediaKind;
use crate::stream::StreamState;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for stream operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Codec settings rejected by the codec policy
    #[error("unsupported {kind} codec: {format}")]
    UnsupportedCodec {
        /// Media kind the settings were meant for
        kind: MediaKind,
        /// Name of the rejected format
        format: String,
    },

    /// The connection reported it is not connected
    #[error("connection is not connected")]
    NotConnected,

    /// The connection has been dropped by its owner
    #[error("connection has been released")]
    ConnectionGone,

    /// The operation is not allowed in the current stream state
    #[error("operation not allowed while {state:?}")]
    InvalidState {
        /// State the stream was in
        state: StreamState,
    },

    /// Transport-level send failure reported by a connection
    #[error("send failed: {0}")]
    Send(String),
}
