//! Error types for frame decoding and encoding.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Protocol-level failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match any known frame shape.
    #[error("malformed frame: {0}")]
    Malformed(serde_json::Error),

    /// The frame exceeded [`MAX_FRAME_LEN`](crate::MAX_FRAME_LEN).
    #[error("frame too large: {len} bytes (limit {limit})")]
    TooLarge {
        /// Size of the rejected frame.
        len: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// A binary WebSocket message arrived; only text frames carry JSON.
    #[error("binary frames are not supported")]
    Binary,

    /// Serializing an outbound frame failed.
    #[error("failed to encode frame: {0}")]
    Encode(serde_json::Error),
}

impl ProtocolError {
    /// Static error code sent back to the client in an `error` frame.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_frame",
            Self::TooLarge { .. } => "frame_too_large",
            Self::Binary => "binary_frame",
            Self::Encode(_) => "encode_error",
        }
    }
}
