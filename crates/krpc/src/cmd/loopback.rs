use std::sync::Arc;

use krpc_agent::{AgentKind, AgentRegistry, NodeId, ReplyAck, StaticTree, DEFAULT_PHANDLE_PROPERTY};
use krpc_frame::{RpcFrame, DEFAULT_MAX_PAYLOAD, S_OK};
use krpc_transport::{ByteOrder, LoopbackConfig, LoopbackTransport};
use tracing::{debug, info};

use crate::cmd::{parse_duration, LoopbackArgs};
use crate::exit::{krpc_error, transport_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_report, LoopbackReport, OutputFormat};

const CONSUMER: &str = "/krpc-consumer";
const ENDPOINT_NAME: &str = "krpc-cli";

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let order = args.remote_order.resolve();

    let (tree, consumer, agent_node) = simulated_tree(args.agent);
    let registry = AgentRegistry::new(tree);

    let link = LoopbackTransport::with_config(LoopbackConfig {
        name: args.agent.as_str().to_string(),
        remote_order: order,
        status: args.status.into(),
        ..LoopbackConfig::default()
    })
    .map_err(|err| transport_error("link setup failed", err))?;
    if !args.silent {
        link.set_responder(move |_, data| answer(data, order));
    }
    registry.attach(agent_node.clone(), Arc::new(link.clone()), args.agent);

    let handle = registry
        .resolve(&consumer, 0)
        .map_err(|err| krpc_error("agent lookup failed", err))?;
    let endpoint = handle
        .create_endpoint(ENDPOINT_NAME, ReplyAck)
        .map_err(|err| krpc_error("endpoint init failed", err))?;

    let mut ok_replies = 0;
    for seq in 0..args.count {
        let request = RpcFrame::request(endpoint.id(), args.procedure, &[seq]);
        let reply = endpoint
            .call_timeout(&request, timeout)
            .map_err(|err| krpc_error("call failed", err))?;
        debug!(seq, value = ?reply.reply_value(), "reply");
        if reply.reply_value() == Some(S_OK) {
            ok_replies += 1;
        }
    }

    let report = LoopbackReport {
        agent: handle.agent().tag(),
        node: agent_node.to_string(),
        link: args.agent.as_str().to_string(),
        remote_order: order.to_string(),
        endpoint: endpoint.name().to_string(),
        endpoint_id: endpoint.id(),
        calls: args.count,
        ok_replies,
        ring_buffer_dumps: link.ring_buffer_dumps(),
        stats: endpoint.stats().into(),
    };

    endpoint.deinit();
    handle.release();
    registry.detach(&agent_node);
    info!(calls = report.calls, ok = report.ok_replies, "loopback finished");

    print_report(&report, format);
    if report.ok_replies == report.calls {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}

/// A consumer node whose agent phandle points at the kind's agent node.
fn simulated_tree(kind: AgentKind) -> (Arc<StaticTree>, NodeId, NodeId) {
    let tree = Arc::new(StaticTree::new());
    let agent_node = tree.add_node(&format!("/rpmsg/{kind}/channel/krpc-agent"));
    let consumer = tree.add_node(CONSUMER);
    tree.set_phandles(&consumer, DEFAULT_PHANDLE_PROPERTY, &[agent_node.clone()]);
    (tree, consumer, agent_node)
}

/// The simulated co-processor: echo the first parameter and report success.
fn answer(data: &[u8], order: ByteOrder) -> Option<Vec<u8>> {
    let request = RpcFrame::decode(data, order, DEFAULT_MAX_PAYLOAD).ok()?;
    let command = request.payload_word(0).unwrap_or(0);
    let reply = RpcFrame::reply_to(&request.header, &[command, S_OK]);
    reply.to_wire(order).ok().map(|wire| wire.to_vec())
}
