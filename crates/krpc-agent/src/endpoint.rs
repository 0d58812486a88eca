use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use krpc_frame::{host_to_wire, FrameConfig, RpcFrame, DEFAULT_REPLY_TIMEOUT};
use krpc_transport::{ByteOrder, Channel, RxCallback};
use tracing::{debug, error, info, trace, warn};

use crate::agent::{Agent, AgentState, WeakAgent};
use crate::error::{KrpcError, Result};
use crate::handler::{Completion, DispatchContext, FrameHandler};

/// Longest endpoint name kept, in bytes. Longer names are cut.
pub const MAX_NAME_LEN: usize = 9;

/// Per-endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Frames allowed to wait for dispatch. `None` means unbounded.
    pub max_queued_frames: Option<usize>,
    /// Inbound frame limits.
    pub frame: FrameConfig,
    /// Default wait for [`Endpoint::call`]. Default: 5 s.
    pub reply_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_queued_frames: None,
            frame: FrameConfig::default(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

/// Counters for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    /// Messages handed over by the transport.
    pub received: u64,
    /// Frames the handler has finished with.
    pub dispatched: u64,
    /// Messages discarded instead of dispatched, including frames whose
    /// handler panicked.
    pub dropped: u64,
    /// Messages sent.
    pub sent: u64,
    /// Frames waiting for dispatch right now.
    pub queued: usize,
}

struct QueueState {
    frames: VecDeque<RpcFrame>,
    shutdown: bool,
}

/// State shared by the endpoint, its dispatch worker and the transport's
/// receive path.
struct Shared {
    name: String,
    remote_order: ByteOrder,
    max_payload: usize,
    max_queued: Option<usize>,
    queue: Mutex<QueueState>,
    ready: Condvar,
    ack: Completion,
    received: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    sent: AtomicU64,
}

impl Shared {
    fn drop_frame(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

impl RxCallback for Shared {
    fn on_receive(&self, data: &[u8], src: u32) -> krpc_transport::Result<()> {
        self.received.fetch_add(1, Ordering::Relaxed);

        let mut buf = BytesMut::from(data);
        let frame = match RpcFrame::decode_in_place(&mut buf, self.remote_order, self.max_payload)
        {
            Ok(frame) => frame,
            Err(err) => {
                self.drop_frame();
                warn!(endpoint = %self.name, src, len = data.len(), error = %err, "dropping malformed frame");
                return Ok(());
            }
        };

        let mut queue = lock(&self.queue);
        if queue.shutdown {
            self.drop_frame();
            debug!(endpoint = %self.name, src, "endpoint closing, frame dropped");
            return Ok(());
        }
        if let Some(max) = self.max_queued {
            if queue.frames.len() >= max {
                self.drop_frame();
                warn!(endpoint = %self.name, src, max, "receive queue full, frame dropped");
                return Ok(());
            }
        }
        queue.frames.push_back(frame);
        drop(queue);

        self.ready.notify_one();
        Ok(())
    }
}

/// One named logical channel to a co-processor.
///
/// Inbound frames are queued by the transport's receive path and handed to
/// the endpoint's [`FrameHandler`] by a dedicated dispatch thread, one at a
/// time and in arrival order. Outbound sends are serialized by a per-endpoint
/// send lock.
///
/// Dropping an endpoint tears it down like [`deinit`](Self::deinit).
pub struct Endpoint {
    id: u32,
    shared: Arc<Shared>,
    channel: Box<dyn Channel>,
    worker: Option<JoinHandle<()>>,
    send_lock: Mutex<()>,
    agent: WeakAgent,
    reply_timeout: Duration,
}

impl Endpoint {
    /// Open an endpoint on `agent` using the agent's endpoint configuration.
    pub fn init<H>(agent: &Agent, name: &str, handler: H) -> Result<Self>
    where
        H: FrameHandler + 'static,
    {
        Self::init_with_config(agent, name, handler, agent.endpoint_config().clone())
    }

    /// Open an endpoint with explicit configuration.
    pub fn init_with_config<H>(
        agent: &Agent,
        name: &str,
        handler: H,
        config: EndpointConfig,
    ) -> Result<Self>
    where
        H: FrameHandler + 'static,
    {
        if agent.state() != AgentState::Attached {
            return Err(KrpcError::NoDevice(format!(
                "{} on {} is detached",
                agent.tag(),
                agent.node()
            )));
        }

        let name = bound_name(name);
        let transport = agent.transport();
        let shared = Arc::new(Shared {
            name: name.clone(),
            remote_order: transport.remote_order(),
            max_payload: config.frame.max_payload_size,
            max_queued: config.max_queued_frames,
            queue: Mutex::new(QueueState {
                frames: VecDeque::new(),
                shutdown: false,
            }),
            ready: Condvar::new(),
            ack: Completion::default(),
            received: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            sent: AtomicU64::new(0),
        });

        let rx: Arc<dyn RxCallback> = shared.clone();
        let channel = transport.open(transport.name(), rx)?;
        let id = channel.addr();

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("krpc-{name}"))
            .spawn(move || dispatch_loop(worker_shared, handler, id));
        let worker = match worker {
            Ok(worker) => worker,
            Err(err) => {
                channel.close();
                return Err(KrpcError::Spawn(err));
            }
        };

        info!(
            agent = agent.tag(),
            endpoint = %name,
            id,
            order = %shared.remote_order,
            "endpoint opened"
        );

        Ok(Self {
            id,
            shared,
            channel,
            worker: Some(worker),
            send_lock: Mutex::new(()),
            agent: agent.downgrade(),
            reply_timeout: config.reply_timeout,
        })
    }

    /// Send a raw native-order frame buffer.
    ///
    /// Words are swapped when the remote's order differs from native.
    /// Transport errors are returned unchanged.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        let _guard = lock(&self.send_lock);
        self.send_locked(data)
    }

    /// Encode and send `frame`.
    pub fn send_frame(&self, frame: &RpcFrame) -> Result<()> {
        let buf = frame.to_wire(ByteOrder::native())?;
        self.send(&buf)
    }

    /// Send `request` and wait for the handler to complete the reply,
    /// using the configured reply timeout.
    pub fn call(&self, request: &RpcFrame) -> Result<RpcFrame> {
        self.call_timeout(request, self.reply_timeout)
    }

    /// Send `request` and wait up to `timeout` for the reply.
    ///
    /// The send lock is held until the reply arrives, so one endpoint has at
    /// most one call in flight. On timeout the link's ring buffer state is
    /// dumped.
    pub fn call_timeout(&self, request: &RpcFrame, timeout: Duration) -> Result<RpcFrame> {
        if self.worker.as_ref().map_or(true, JoinHandle::is_finished) {
            return Err(KrpcError::EndpointClosed(self.shared.name.clone()));
        }
        let wire = request.to_wire(ByteOrder::native())?;

        let _guard = lock(&self.send_lock);
        self.shared.ack.reinit();
        self.send_locked(&wire)?;

        match self.shared.ack.wait_timeout(timeout) {
            Some(reply) => {
                trace!(endpoint = %self.shared.name, header = ?reply.header, "reply received");
                Ok(reply)
            }
            None => {
                warn!(
                    endpoint = %self.shared.name,
                    id = self.id,
                    procedure = request.header.procedure_id,
                    ?timeout,
                    "rpc timed out"
                );
                if let Some(agent) = self.agent.upgrade() {
                    agent.dump_ring_buffer_info();
                }
                Err(KrpcError::Timeout(timeout))
            }
        }
    }

    /// Tear the endpoint down.
    ///
    /// A dispatch in progress finishes first; frames still queued are
    /// discarded. The transport channel is closed last.
    pub fn deinit(mut self) {
        self.shutdown();
    }

    /// Transport address of this endpoint.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn remote_order(&self) -> ByteOrder {
        self.shared.remote_order
    }

    /// The owning agent, if it is still alive.
    pub fn agent(&self) -> Option<Agent> {
        self.agent.upgrade()
    }

    pub fn stats(&self) -> EndpointStats {
        let queued = lock(&self.shared.queue).frames.len();
        EndpointStats {
            received: self.shared.received.load(Ordering::Relaxed),
            dispatched: self.shared.dispatched.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            sent: self.shared.sent.load(Ordering::Relaxed),
            queued,
        }
    }

    fn send_locked(&self, data: &[u8]) -> Result<()> {
        let mut buf = BytesMut::from(data);
        host_to_wire(&mut buf, self.shared.remote_order)?;
        self.channel.send(&buf)?;
        self.shared.sent.fetch_add(1, Ordering::Relaxed);
        trace!(endpoint = %self.shared.name, id = self.id, len = buf.len(), "sent");
        Ok(())
    }

    fn shutdown(&mut self) {
        {
            let mut queue = lock(&self.shared.queue);
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
        }
        self.shared.ready.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                debug!(endpoint = %self.shared.name, "teardown from dispatch thread, not joining");
            } else if worker.join().is_err() {
                warn!(endpoint = %self.shared.name, "dispatch worker panicked");
            }
        }

        self.channel.close();

        let discarded = {
            let mut queue = lock(&self.shared.queue);
            let discarded = queue.frames.len();
            queue.frames.clear();
            discarded
        };
        info!(endpoint = %self.shared.name, id = self.id, discarded, "endpoint closed");
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("name", &self.shared.name)
            .field("remote_order", &self.shared.remote_order)
            .finish()
    }
}

fn dispatch_loop<H: FrameHandler>(shared: Arc<Shared>, handler: H, id: u32) {
    let ctx = DispatchContext {
        id,
        name: &shared.name,
        ack: &shared.ack,
    };
    loop {
        let frame = {
            let mut queue = lock(&shared.queue);
            loop {
                if queue.shutdown {
                    return;
                }
                if let Some(frame) = queue.frames.pop_front() {
                    break frame;
                }
                queue = shared
                    .ready
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        debug!(
            endpoint = %shared.name,
            program = frame.header.program_id,
            version = frame.header.version_id,
            procedure = frame.header.procedure_id,
            task = frame.header.task_id,
            size = frame.header.parameter_size,
            context = frame.header.context,
            "dispatching frame"
        );
        if panic::catch_unwind(AssertUnwindSafe(|| handler.on_frame(&ctx, &frame))).is_ok() {
            shared.dispatched.fetch_add(1, Ordering::Relaxed);
        } else {
            shared.drop_frame();
            error!(
                endpoint = %shared.name,
                procedure = frame.header.procedure_id,
                task = frame.header.task_id,
                "frame handler panicked, frame dropped"
            );
        }
    }
}

fn bound_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
