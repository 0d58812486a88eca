//! Kernel RPC transport for co-processor links.
//!
//! krpc carries fixed-layout RPC frames between the host and its
//! co-processors (audio, video, DSP, RISC-V) over a message-oriented link,
//! converting word order at the boundary and dispatching inbound frames on
//! a per-endpoint worker thread.
//!
//! # Crate Structure
//!
//! - [`transport`]: link abstraction and an in-process loopback link
//! - [`frame`]: frame header, codec, word-order conversion, protocol constants
//! - [`agent`]: endpoints, agents and devicetree-driven agent lookup

/// Re-export transport types.
pub mod transport {
    pub use krpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use krpc_frame::*;
}

/// Re-export agent, endpoint and registry types.
pub mod agent {
    pub use krpc_agent::*;
}
