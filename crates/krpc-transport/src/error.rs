/// Errors reported by a co-processor transport.
///
/// These are surfaced to endpoint users unchanged; the RPC layers above never
/// retry or translate them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open a channel on the link.
    #[error("failed to open channel {name}: {reason}")]
    Open { name: String, reason: String },

    /// The link refused an outbound message.
    #[error("failed to send on channel {addr}: {reason}")]
    Send { addr: u32, reason: String },

    /// The channel was already closed.
    #[error("channel {0} closed")]
    Closed(u32),

    /// The remote side of the link is not running.
    #[error("remote link down: {0}")]
    LinkDown(String),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
