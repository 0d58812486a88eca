//! Co-processor message transport abstraction.
//!
//! The kernel RPC layers talk to a remote co-processor through a small set of
//! traits modelled on an rpmsg device:
//! - [`Transport`] is one link to a co-processor (byte order, remote status,
//!   channel factory, ring buffer diagnostics)
//! - [`Channel`] is one open address on that link
//! - [`RxCallback`] receives inbound messages in the link's receive context
//!
//! This is the lowest layer of krpc. [`LoopbackTransport`] is an in-process
//! link used for tests, demos and the diagnostics CLI.

pub mod error;
pub mod loopback;
pub mod traits;

pub use error::{Result, TransportError};
pub use loopback::{LoopbackConfig, LoopbackTransport, Responder, SentMessage};
pub use traits::{ByteOrder, Channel, RemoteStatus, RxCallback, Transport};
