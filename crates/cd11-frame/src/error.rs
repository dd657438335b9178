use crate::header::FrameType;

/// Errors that can occur while reading, decoding, or encoding CD-1.1 frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended after part of a frame had been received.
    #[error("incomplete frame ({received} of {expected} bytes received)")]
    IncompleteFrame { expected: usize, received: usize },

    /// The abort predicate fired before a complete frame arrived.
    #[error("timed out waiting for frame")]
    Timeout,

    /// The declared frame length exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The fixed header is unusable, so the frame boundary cannot be located.
    #[error("invalid frame header: {0}")]
    InvalidHeader(String),

    /// The header's trailer offset disagrees with the body actually present.
    #[error("trailer offset mismatch (declared {declared}, actual {actual})")]
    TrailerOffsetMismatch { declared: i64, actual: i64 },

    /// A body field could not be decoded.
    #[error("malformed field '{field}': {reason}")]
    MalformedField { field: &'static str, reason: String },

    /// A `yyyyddd hh:mm:ss.mmm` timestamp had the right length but bad content.
    #[error("malformed timestamp '{0}'")]
    MalformedTimestamp(String),

    /// A frame of one type was required but another was supplied.
    #[error("expected {expected:?} frame, got {actual:?}")]
    UnexpectedFrameType {
        expected: FrameType,
        actual: FrameType,
    },
}

impl FrameError {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            reason: reason.into(),
        }
    }

    /// Whether a session can skip the offending frame and keep reading.
    ///
    /// Decode-level failures happen after the declared frame length has been
    /// consumed, so the stream is still positioned on a frame boundary.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::TrailerOffsetMismatch { .. }
                | FrameError::MalformedField { .. }
                | FrameError::MalformedTimestamp(_)
                | FrameError::UnexpectedFrameType { .. }
                | FrameError::Timeout
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
