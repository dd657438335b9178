/// Errors that can occur in broker and receiver operations.
#[derive(Debug, thiserror::Error)]
pub enum StationError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] cd11_frame::FrameError),

    /// Socket or file error outside frame I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requesting station has no route.
    #[error("unknown station '{0}'")]
    UnknownStation(String),

    /// The station has a route but is not acquired.
    #[error("station '{0}' is not acquired")]
    IgnoredStation(String),

    /// The connection handshake could not be completed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Operation timed out.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The record sink was dropped while the session was still running.
    #[error("record sink closed")]
    SinkClosed,
}

pub type Result<T> = std::result::Result<T, StationError>;
