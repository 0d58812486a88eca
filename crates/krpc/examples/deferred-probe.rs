//! Deferred probe example: a consumer resolves its agent while the link is
//! still coming up, retrying on `NotReady` until the remote is connected.
//!
//! Run with:
//!   cargo run --example deferred-probe

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use krpc::agent::{AgentKind, AgentRegistry, ReplyAck, StaticTree, DEFAULT_PHANDLE_PROPERTY};
use krpc::transport::{LoopbackConfig, LoopbackTransport, RemoteStatus};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tree = Arc::new(StaticTree::new());
    let agent_node = tree.add_node("/rpmsg/hifi/channel/krpc-agent");
    let consumer = tree.add_node("/sound");
    tree.set_phandles(&consumer, DEFAULT_PHANDLE_PROPERTY, &[agent_node.clone()]);

    let registry = Arc::new(AgentRegistry::new(tree));
    let link = LoopbackTransport::with_config(LoopbackConfig {
        name: "hifi".to_string(),
        status: RemoteStatus::Uninitialized,
        ..LoopbackConfig::default()
    })?;

    // The link driver: probe late, then let the remote finish booting.
    let prober = {
        let registry = Arc::clone(&registry);
        let link = link.clone();
        let agent_node = agent_node.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            registry.attach(agent_node, Arc::new(link.clone()), AgentKind::Hifi);
            eprintln!("[link] agent attached, remote booting");
            thread::sleep(Duration::from_millis(50));
            link.set_status(RemoteStatus::Connected);
            eprintln!("[link] remote connected");
        })
    };

    let handle = loop {
        match registry.resolve(&consumer, 0) {
            Ok(handle) => break handle,
            Err(err) if err.is_deferred() => {
                eprintln!("[consumer] deferred: {err}");
                thread::sleep(Duration::from_millis(20));
            }
            Err(err) => return Err(err.into()),
        }
    };
    prober.join().map_err(|_| "prober thread panicked")?;

    let endpoint = handle.create_endpoint("hifi_ctl", ReplyAck)?;
    eprintln!(
        "[consumer] resolved {} and opened endpoint {}",
        handle.agent().tag(),
        endpoint.id()
    );

    endpoint.deinit();
    handle.release();
    Ok(())
}
