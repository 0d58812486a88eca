//! Kernel RPC agents and endpoints.
//!
//! An [`Agent`] stands for one established co-processor link and creates
//! [`Endpoint`]s on it. Each endpoint owns a transport channel, a FIFO of
//! inbound frames and a dispatch thread that feeds them to its
//! [`FrameHandler`]. Consumers find agents through an [`AgentRegistry`],
//! which follows devicetree phandles and defers while links are still
//! coming up.

pub mod agent;
pub mod devtree;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod registry;

pub use agent::{Agent, AgentKind, AgentState, WeakAgent};
pub use devtree::{DeviceTree, NodeId, StaticTree};
pub use endpoint::{Endpoint, EndpointConfig, EndpointStats, MAX_NAME_LEN};
pub use error::{KrpcError, Result};
pub use handler::{handler_fn, DispatchContext, FnHandler, FrameHandler, ReplyAck};
pub use registry::{AgentHandle, AgentRegistry, RegistryConfig, DEFAULT_PHANDLE_PROPERTY};
