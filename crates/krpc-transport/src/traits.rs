use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Byte order of 32-bit words on one side of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the CPU this code runs on.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// True when words must be swapped to go between native order and `self`.
    pub fn differs_from_native(self) -> bool {
        self != Self::native()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ByteOrder::Little => "little",
            ByteOrder::Big => "big",
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the link to a remote co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RemoteStatus {
    /// The remote has not signalled yet. Callers should retry later.
    Uninitialized = 0,
    /// The remote is running and accepts messages.
    Connected = 1,
    /// The remote failed to come up within its sync window.
    Disconnected = 2,
    /// The link is administratively disabled.
    Disabled = 3,
}

impl RemoteStatus {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(RemoteStatus::Uninitialized),
            1 => Some(RemoteStatus::Connected),
            2 => Some(RemoteStatus::Disconnected),
            3 => Some(RemoteStatus::Disabled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RemoteStatus::Uninitialized => "uninitialized",
            RemoteStatus::Connected => "connected",
            RemoteStatus::Disconnected => "disconnected",
            RemoteStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives inbound messages for one channel.
///
/// Called from the transport's receive context, possibly from several
/// threads at once. Implementations must not block beyond short critical
/// sections and must not run consumer code inline.
pub trait RxCallback: Send + Sync {
    /// Handle one raw message as it arrived on the wire from `src`.
    fn on_receive(&self, data: &[u8], src: u32) -> Result<()>;
}

/// One open channel on a transport link.
pub trait Channel: Send + Sync {
    /// Local address allocated by the transport when the channel opened.
    fn addr(&self) -> u32;

    /// Hand a complete, already wire-ordered message to the link.
    fn send(&self, data: &[u8]) -> Result<()>;

    /// Close the channel. No receive callbacks run after this returns.
    fn close(&self);
}

/// A connection to one remote co-processor.
pub trait Transport: Send + Sync {
    /// Link name used as the default channel name (`acpu`, `hifi`, ...).
    fn name(&self) -> &str;

    /// Byte order the remote expects on the wire.
    fn remote_order(&self) -> ByteOrder;

    /// Current state of the remote side.
    fn remote_status(&self) -> RemoteStatus;

    /// Open a channel and register `rx` for its inbound messages.
    fn open(&self, name: &str, rx: Arc<dyn RxCallback>) -> Result<Box<dyn Channel>>;

    /// Log ring buffer state for debugging a stuck link.
    fn dump_ring_buffer_info(&self) {}
}
