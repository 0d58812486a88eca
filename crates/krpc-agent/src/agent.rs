use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use krpc_transport::{ByteOrder, RemoteStatus, Transport};
use tracing::info;

use crate::devtree::NodeId;
use crate::endpoint::{Endpoint, EndpointConfig};
use crate::error::{KrpcError, Result};
use crate::handler::FrameHandler;

/// Which co-processor link an agent serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Acpu,
    Vcpu,
    Ve3,
    Hifi,
    Hifi1,
    Kr4,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Acpu,
        AgentKind::Vcpu,
        AgentKind::Ve3,
        AgentKind::Hifi,
        AgentKind::Hifi1,
        AgentKind::Kr4,
    ];

    /// Short link name (`acpu`, `hifi1`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Acpu => "acpu",
            AgentKind::Vcpu => "vcpu",
            AgentKind::Ve3 => "ve3",
            AgentKind::Hifi => "hifi",
            AgentKind::Hifi1 => "hifi1",
            AgentKind::Kr4 => "kr4",
        }
    }

    /// Name tag reported by the agent.
    pub fn tag(self) -> &'static str {
        match self {
            AgentKind::Acpu => "acpu-agent",
            AgentKind::Vcpu => "vcpu-agent",
            AgentKind::Ve3 => "ve3-agent",
            AgentKind::Hifi => "hifi-agent",
            AgentKind::Hifi1 => "hifi1-agent",
            AgentKind::Kr4 => "kr4-agent",
        }
    }

    /// Devicetree compatible string that selects this kind.
    pub fn compatible(self) -> &'static str {
        match self {
            AgentKind::Acpu => "realtek,krpc-agent-acpu",
            AgentKind::Vcpu => "realtek,krpc-agent-vcpu",
            AgentKind::Ve3 => "realtek,krpc-agent-ve3",
            AgentKind::Hifi => "realtek,krpc-agent-hifi",
            AgentKind::Hifi1 => "realtek,krpc-agent-hifi1",
            AgentKind::Kr4 => "realtek,krpc-agent-kr4",
        }
    }

    pub fn from_compatible(compatible: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.compatible() == compatible)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = KrpcError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.tag() == s || kind.compatible() == s)
            .ok_or_else(|| KrpcError::InvalidArgument(format!("unknown agent kind '{s}'")))
    }
}

/// Lifecycle of an agent's link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Attached,
    Detached,
}

/// One established co-processor link; the factory for its endpoints.
///
/// Cheap to clone. Endpoints keep only a [`WeakAgent`].
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    transport: Arc<dyn Transport>,
    node: NodeId,
    kind: AgentKind,
    attached: AtomicBool,
    endpoint_config: EndpointConfig,
}

/// Non-owning reference to an [`Agent`].
#[derive(Clone, Default)]
pub struct WeakAgent {
    inner: Weak<AgentInner>,
}

impl WeakAgent {
    pub fn upgrade(&self) -> Option<Agent> {
        self.inner.upgrade().map(|inner| Agent { inner })
    }
}

impl Agent {
    /// Bind an agent to a freshly connected transport link.
    ///
    /// Does not open any endpoint.
    pub fn attach(transport: Arc<dyn Transport>, node: NodeId, kind: AgentKind) -> Self {
        Self::attach_with_config(transport, node, kind, EndpointConfig::default())
    }

    /// Bind an agent whose endpoints default to `endpoint_config`.
    pub fn attach_with_config(
        transport: Arc<dyn Transport>,
        node: NodeId,
        kind: AgentKind,
        endpoint_config: EndpointConfig,
    ) -> Self {
        info!(
            agent = kind.tag(),
            %node,
            link = transport.name(),
            order = %transport.remote_order(),
            "agent attached"
        );
        Self {
            inner: Arc::new(AgentInner {
                transport,
                node,
                kind,
                attached: AtomicBool::new(true),
                endpoint_config,
            }),
        }
    }

    /// Mark the link torn down. Later endpoint creation fails.
    pub fn detach(&self) {
        if self.inner.attached.swap(false, Ordering::SeqCst) {
            info!(agent = self.tag(), node = %self.inner.node, "agent detached");
        }
    }

    pub fn state(&self) -> AgentState {
        if self.inner.attached.load(Ordering::SeqCst) {
            AgentState::Attached
        } else {
            AgentState::Detached
        }
    }

    /// Open an endpoint with this agent's default endpoint configuration.
    pub fn create_endpoint<H>(&self, name: &str, handler: H) -> Result<Endpoint>
    where
        H: FrameHandler + 'static,
    {
        Endpoint::init(self, name, handler)
    }

    /// Open an endpoint with explicit configuration.
    pub fn create_endpoint_with_config<H>(
        &self,
        name: &str,
        handler: H,
        config: EndpointConfig,
    ) -> Result<Endpoint>
    where
        H: FrameHandler + 'static,
    {
        Endpoint::init_with_config(self, name, handler, config)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn node(&self) -> &NodeId {
        &self.inner.node
    }

    pub fn kind(&self) -> AgentKind {
        self.inner.kind
    }

    pub fn tag(&self) -> &'static str {
        self.inner.kind.tag()
    }

    pub fn remote_status(&self) -> RemoteStatus {
        self.inner.transport.remote_status()
    }

    pub fn remote_order(&self) -> ByteOrder {
        self.inner.transport.remote_order()
    }

    pub fn endpoint_config(&self) -> &EndpointConfig {
        &self.inner.endpoint_config
    }

    /// Ask the transport to log its ring buffer state.
    pub fn dump_ring_buffer_info(&self) {
        self.inner.transport.dump_ring_buffer_info();
    }

    pub fn downgrade(&self) -> WeakAgent {
        WeakAgent {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// True when both handles refer to the same agent.
    pub fn ptr_eq(&self, other: &Agent) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("tag", &self.tag())
            .field("node", &self.inner.node)
            .field("link", &self.inner.transport.name())
            .field("state", &self.state())
            .finish()
    }
}
