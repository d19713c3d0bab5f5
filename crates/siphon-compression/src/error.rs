//! Codec error type

use std::io;

/// Result type for codec operations
pub type Result<T, E = CompressionError> = std::result::Result<T, E>;

/// Failure reported by a codec adapter
///
/// The negotiation policy treats any of these as "this codec did not
/// succeed" and moves on to the next adapter.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// The encoder rejected a write or could not finalize its output
    #[error("I/O error while compressing: {0}")]
    Io(#[from] io::Error),

    /// The codec library reported a failure of its own
    #[error("{encoding} compression failed: {message}")]
    Codec {
        /// Token of the adapter that failed
        encoding: &'static str,
        /// Library message
        message: String,
    },
}

impl CompressionError {
    /// Create a codec error
    pub fn codec(encoding: &'static str, message: impl Into<String>) -> Self {
        CompressionError::Codec {
            encoding,
            message: message.into(),
        }
    }
}
