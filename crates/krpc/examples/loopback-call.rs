//! Loopback call example: one endpoint talking to a simulated big-endian
//! co-processor that answers every request with `S_OK`.
//!
//! Run with:
//!   cargo run --example loopback-call

use std::sync::Arc;

use krpc::agent::{Agent, AgentKind, NodeId, ReplyAck};
use krpc::frame::{RpcFrame, DEFAULT_MAX_PAYLOAD, S_OK};
use krpc::transport::{ByteOrder, LoopbackConfig, LoopbackTransport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let link = LoopbackTransport::with_config(LoopbackConfig {
        remote_order: ByteOrder::Big,
        ..LoopbackConfig::default()
    })?;

    // The "remote": echo the command word, report success.
    link.set_responder(|_, data| {
        let request = RpcFrame::decode(data, ByteOrder::Big, DEFAULT_MAX_PAYLOAD).ok()?;
        let command = request.payload_word(0)?;
        let reply = RpcFrame::reply_to(&request.header, &[command, S_OK]);
        reply.to_wire(ByteOrder::Big).ok().map(|wire| wire.to_vec())
    });

    let agent = Agent::attach(
        Arc::new(link.clone()),
        NodeId::new("/rpmsg/acpu/channel/krpc-agent"),
        AgentKind::Acpu,
    );
    let endpoint = agent.create_endpoint("snd_notify", ReplyAck)?;
    eprintln!("[host] endpoint {} id={}", endpoint.name(), endpoint.id());

    for command in [0x10, 0x11, 0x12] {
        let request = RpcFrame::request(endpoint.id(), 1, &[command]);
        let reply = endpoint.call(&request)?;
        eprintln!(
            "[host] command={command:#x} reply={:#x?}",
            reply.reply_value()
        );
    }

    for message in link.sent() {
        eprintln!("[wire] addr={} {} bytes", message.addr, message.data.len());
    }

    eprintln!("[host] stats: {:?}", endpoint.stats());
    endpoint.deinit();
    agent.detach();
    Ok(())
}
