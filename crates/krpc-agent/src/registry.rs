use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use krpc_transport::{RemoteStatus, Transport};
use tracing::{debug, error, info};

use crate::agent::{Agent, AgentKind};
use crate::devtree::{DeviceTree, NodeId};
use crate::endpoint::{Endpoint, EndpointConfig};
use crate::error::{KrpcError, Result};
use crate::handler::FrameHandler;

/// Devicetree property consumers use to reference an agent.
pub const DEFAULT_PHANDLE_PROPERTY: &str = "realtek,krpc-agent";

/// Lookup configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Phandle list property on consumer nodes.
    pub phandle_property: String,
    /// How many levels above the agent node the governing link sits.
    pub link_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            phandle_property: DEFAULT_PHANDLE_PROPERTY.to_string(),
            link_depth: 2,
        }
    }
}

/// Agents bound to devicetree nodes, and phandle-driven lookup of them.
pub struct AgentRegistry {
    tree: Arc<dyn DeviceTree>,
    agents: RwLock<HashMap<NodeId, Agent>>,
    config: RegistryConfig,
}

impl AgentRegistry {
    pub fn new(tree: Arc<dyn DeviceTree>) -> Self {
        Self::with_config(tree, RegistryConfig::default())
    }

    pub fn with_config(tree: Arc<dyn DeviceTree>, config: RegistryConfig) -> Self {
        Self {
            tree,
            agents: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Bind a new agent for `transport` to `node`.
    ///
    /// An agent already bound to the node is detached and replaced.
    pub fn attach(&self, node: NodeId, transport: Arc<dyn Transport>, kind: AgentKind) -> Agent {
        self.attach_with_config(node, transport, kind, EndpointConfig::default())
    }

    /// Like [`attach`](Self::attach), with a default endpoint configuration
    /// for the agent.
    pub fn attach_with_config(
        &self,
        node: NodeId,
        transport: Arc<dyn Transport>,
        kind: AgentKind,
        endpoint_config: EndpointConfig,
    ) -> Agent {
        let agent = Agent::attach_with_config(transport, node.clone(), kind, endpoint_config);
        let previous = self
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node, agent.clone());
        if let Some(previous) = previous {
            previous.detach();
        }
        agent
    }

    /// Bind an agent whose kind is picked by devicetree `compatible` string.
    pub fn attach_compatible(
        &self,
        node: NodeId,
        transport: Arc<dyn Transport>,
        compatible: &str,
    ) -> Result<Agent> {
        let kind = AgentKind::from_compatible(compatible).ok_or_else(|| {
            KrpcError::InvalidArgument(format!("{node}: unsupported compatible '{compatible}'"))
        })?;
        Ok(self.attach(node, transport, kind))
    }

    /// Unbind and detach the agent on `node`.
    pub fn detach(&self, node: &NodeId) -> Option<Agent> {
        let agent = self
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node)?;
        agent.detach();
        Some(agent)
    }

    /// The agent bound to `node`, if any.
    pub fn agent(&self, node: &NodeId) -> Option<Agent> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node)
            .cloned()
    }

    /// All bound agents, ordered by node path.
    pub fn agents(&self) -> Vec<Agent> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Agent> = agents.values().cloned().collect();
        list.sort_by(|a, b| a.node().cmp(b.node()));
        list
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The link node governing `agent_node`.
    pub fn governing_link(&self, agent_node: &NodeId) -> Option<NodeId> {
        let mut node = agent_node.clone();
        for _ in 0..self.config.link_depth {
            node = self.tree.parent(&node)?;
        }
        Some(node)
    }

    /// Resolve entry `index` of the consumer's agent phandle list.
    ///
    /// [`KrpcError::NotReady`] means the agent or its remote is not up yet
    /// and the lookup should be retried. Every other error is final.
    pub fn resolve(&self, consumer: &NodeId, index: usize) -> Result<AgentHandle> {
        let property = &self.config.phandle_property;
        let Some(agent_node) = self.tree.parse_phandle(consumer, property, index) else {
            error!(%consumer, property = %property, index, "no agent phandle");
            return Err(KrpcError::InvalidArgument(format!(
                "{consumer}: no '{property}' entry at index {index}"
            )));
        };

        let link_available = self
            .governing_link(&agent_node)
            .is_some_and(|link| self.tree.is_available(&link));
        if !link_available {
            debug!(%consumer, agent = %agent_node, "agent link disabled");
            return Err(KrpcError::NoDevice(format!(
                "{agent_node}: link is disabled"
            )));
        }

        let Some(agent) = self.agent(&agent_node) else {
            debug!(%consumer, agent = %agent_node, "agent not probed yet");
            return Err(KrpcError::NotReady(format!("{agent_node}: agent not bound")));
        };

        match agent.remote_status() {
            RemoteStatus::Uninitialized => {
                debug!(%consumer, agent = agent.tag(), "remote not initialized");
                Err(KrpcError::NotReady(format!(
                    "{}: remote not initialized",
                    agent.tag()
                )))
            }
            status @ (RemoteStatus::Disconnected | RemoteStatus::Disabled) => {
                error!(%consumer, agent = agent.tag(), %status, "remote unusable");
                Err(KrpcError::NoDevice(format!("{}: remote {status}", agent.tag())))
            }
            RemoteStatus::Connected => {
                info!(%consumer, agent = agent.tag(), index, "agent resolved");
                Ok(AgentHandle {
                    agent,
                    consumer: consumer.clone(),
                    index,
                })
            }
        }
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.agents())
            .field("config", &self.config)
            .finish()
    }
}

/// A consumer's reference to a resolved agent.
///
/// Does not own the agent; detaching the agent's link is not blocked by it.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    agent: Agent,
    consumer: NodeId,
    index: usize,
}

impl AgentHandle {
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn consumer(&self) -> &NodeId {
        &self.consumer
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Open an endpoint on the resolved agent.
    pub fn create_endpoint<H>(&self, name: &str, handler: H) -> Result<Endpoint>
    where
        H: FrameHandler + 'static,
    {
        self.agent.create_endpoint(name, handler)
    }

    /// Give the reference back.
    pub fn release(self) {
        debug!(consumer = %self.consumer, agent = self.agent.tag(), "agent released");
    }
}

#[cfg(test)]
mod tests {
    use krpc_transport::{LoopbackConfig, LoopbackTransport};

    use super::*;
    use crate::agent::AgentState;
    use crate::devtree::StaticTree;
    use crate::handler::ReplyAck;

    const AGENT: &str = "/rpmsg/acpu/channel/krpc-agent";
    const LINK: &str = "/rpmsg/acpu";

    struct Fixture {
        tree: Arc<StaticTree>,
        registry: AgentRegistry,
        consumer: NodeId,
        agent_node: NodeId,
    }

    fn fixture() -> Fixture {
        let tree = Arc::new(StaticTree::new());
        let agent_node = tree.add_node(AGENT);
        let consumer = tree.add_node("/sound");
        tree.set_phandles(&consumer, DEFAULT_PHANDLE_PROPERTY, &[agent_node.clone()]);
        let registry = AgentRegistry::new(tree.clone());
        Fixture {
            tree,
            registry,
            consumer,
            agent_node,
        }
    }

    fn link(status: RemoteStatus) -> LoopbackTransport {
        LoopbackTransport::with_config(LoopbackConfig {
            status,
            ..LoopbackConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn governing_link_is_two_levels_up() {
        let f = fixture();
        assert_eq!(f.registry.governing_link(&f.agent_node), Some(NodeId::new(LINK)));
    }

    #[test]
    fn missing_phandle_is_invalid_argument() {
        let f = fixture();
        let err = f.registry.resolve(&f.consumer, 1).unwrap_err();
        assert!(matches!(err, KrpcError::InvalidArgument(_)));
        assert!(!err.is_deferred());
    }

    #[test]
    fn disabled_link_is_no_device() {
        let f = fixture();
        f.registry.attach(f.agent_node.clone(), Arc::new(link(RemoteStatus::Connected)), AgentKind::Acpu);
        f.tree.set_enabled(&NodeId::new(LINK), false);

        let err = f.registry.resolve(&f.consumer, 0).unwrap_err();
        assert!(matches!(err, KrpcError::NoDevice(_)));
    }

    #[test]
    fn unprobed_agent_defers() {
        let f = fixture();
        let err = f.registry.resolve(&f.consumer, 0).unwrap_err();
        assert!(matches!(err, KrpcError::NotReady(_)));
        assert!(err.is_deferred());
    }

    #[test]
    fn remote_status_decides_outcome() {
        let f = fixture();
        let link = link(RemoteStatus::Uninitialized);
        f.registry.attach(f.agent_node.clone(), Arc::new(link.clone()), AgentKind::Acpu);

        assert!(f.registry.resolve(&f.consumer, 0).unwrap_err().is_deferred());

        link.set_status(RemoteStatus::Disabled);
        let err = f.registry.resolve(&f.consumer, 0).unwrap_err();
        assert!(matches!(err, KrpcError::NoDevice(_)));

        link.set_status(RemoteStatus::Disconnected);
        let err = f.registry.resolve(&f.consumer, 0).unwrap_err();
        assert!(matches!(err, KrpcError::NoDevice(_)));

        link.set_status(RemoteStatus::Connected);
        let handle = f.registry.resolve(&f.consumer, 0).unwrap();
        assert_eq!(handle.agent().tag(), "acpu-agent");
        assert_eq!(handle.index(), 0);
        handle.release();
    }

    #[test]
    fn deferred_probe_succeeds_once_agent_attaches() {
        let f = fixture();
        let transport = link(RemoteStatus::Uninitialized);

        let mut attempts = 0;
        let handle = loop {
            attempts += 1;
            match f.registry.resolve(&f.consumer, 0) {
                Ok(handle) => break handle,
                Err(err) if err.is_deferred() => match attempts {
                    // The link driver probes after the consumer's first try,
                    // and the remote finishes booting after the second.
                    1 => {
                        f.registry.attach(
                            f.agent_node.clone(),
                            Arc::new(transport.clone()),
                            AgentKind::Acpu,
                        );
                    }
                    2 => transport.set_status(RemoteStatus::Connected),
                    _ => panic!("still deferred after {attempts} attempts"),
                },
                Err(err) => panic!("unexpected error: {err}"),
            }
        };

        assert_eq!(attempts, 3);
        let endpoint = handle.create_endpoint("snd_notify", ReplyAck).unwrap();
        assert_eq!(transport.open_channels(), vec![endpoint.id()]);
    }

    #[test]
    fn handle_does_not_block_detach() {
        let f = fixture();
        f.registry.attach(f.agent_node.clone(), Arc::new(link(RemoteStatus::Connected)), AgentKind::Acpu);
        let handle = f.registry.resolve(&f.consumer, 0).unwrap();

        let detached = f.registry.detach(&f.agent_node).unwrap();
        assert!(detached.ptr_eq(handle.agent()));
        assert_eq!(handle.agent().state(), AgentState::Detached);
        assert!(handle.create_endpoint("audio", ReplyAck).is_err());
        assert!(f.registry.resolve(&f.consumer, 0).unwrap_err().is_deferred());
    }

    #[test]
    fn reattach_replaces_previous_agent() {
        let f = fixture();
        let first = f.registry.attach(f.agent_node.clone(), Arc::new(link(RemoteStatus::Connected)), AgentKind::Acpu);
        let second = f.registry.attach(f.agent_node.clone(), Arc::new(link(RemoteStatus::Connected)), AgentKind::Acpu);

        assert_eq!(first.state(), AgentState::Detached);
        assert!(f.registry.agent(&f.agent_node).is_some_and(|a| a.ptr_eq(&second)));
        assert_eq!(f.registry.agents().len(), 1);
    }

    #[test]
    fn attach_by_compatible() {
        let f = fixture();
        let agent = f
            .registry
            .attach_compatible(f.agent_node.clone(), Arc::new(link(RemoteStatus::Connected)), "realtek,krpc-agent-hifi1")
            .unwrap();
        assert_eq!(agent.kind(), AgentKind::Hifi1);

        let err = f
            .registry
            .attach_compatible(f.agent_node.clone(), Arc::new(link(RemoteStatus::Connected)), "realtek,krpc-agent-npu")
            .unwrap_err();
        assert!(matches!(err, KrpcError::InvalidArgument(_)));
    }
}
