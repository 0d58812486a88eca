use std::time::Duration;

/// Errors that can occur in agent and endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum KrpcError {
    /// Transport-level error, passed through unchanged.
    #[error("transport error: {0}")]
    Transport(#[from] krpc_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] krpc_frame::FrameError),

    /// The agent or its remote is not up yet. Retry later.
    #[error("not ready: {0}")]
    NotReady(String),

    /// The agent's link is disabled or its remote failed.
    #[error("no such device: {0}")]
    NoDevice(String),

    /// The lookup request itself is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No reply arrived in time.
    #[error("rpc timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint was torn down.
    #[error("endpoint {0} closed")]
    EndpointClosed(String),

    /// The dispatch worker thread could not be started.
    #[error("failed to spawn dispatch worker: {0}")]
    Spawn(std::io::Error),
}

impl KrpcError {
    /// True for errors the caller should answer by retrying later.
    pub fn is_deferred(&self) -> bool {
        matches!(self, KrpcError::NotReady(_))
    }
}

pub type Result<T> = std::result::Result<T, KrpcError>;
