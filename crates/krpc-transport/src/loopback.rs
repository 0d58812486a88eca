use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{ByteOrder, Channel, RemoteStatus, RxCallback, Transport};

/// Produces the remote's answer to one outbound message.
///
/// Receives the channel address and the message exactly as it went on the
/// wire. Returning `Some` queues the bytes back to that channel through the
/// receive thread.
pub type Responder = dyn Fn(u32, &[u8]) -> Option<Vec<u8>> + Send + Sync;

/// Configuration for a [`LoopbackTransport`].
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Link name, used as the default channel name.
    pub name: String,
    /// Byte order of the simulated co-processor.
    pub remote_order: ByteOrder,
    /// Initial remote status.
    pub status: RemoteStatus,
    /// First channel address handed out by `open`.
    pub first_addr: u32,
    /// Largest outbound message the ring buffer takes. Default: 496 bytes.
    pub max_message: usize,
    /// Outbound messages kept for [`LoopbackTransport::sent`]; older ones
    /// are forgotten. `0` disables recording. Default: 256.
    pub sent_capacity: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            name: "acpu".to_string(),
            remote_order: ByteOrder::native(),
            status: RemoteStatus::Connected,
            first_addr: 1024,
            max_message: 512 - 16,
            sent_capacity: 256,
        }
    }
}

/// One message observed on the outbound side of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub addr: u32,
    pub data: Bytes,
}

/// In-process co-processor link.
///
/// Stands in for the shared-memory ring buffer transport. Outbound messages
/// are recorded and optionally answered by a [`Responder`]; answers and
/// [`post`](Self::post)ed messages are delivered from a dedicated receive
/// thread, the way an interrupt handler would deliver them.
/// [`deliver`](Self::deliver) runs the receive path on the calling thread.
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    remote_order: ByteOrder,
    status: AtomicU32,
    next_addr: AtomicU32,
    channels: RwLock<HashMap<u32, Arc<dyn RxCallback>>>,
    max_message: usize,
    sent_capacity: usize,
    sent: Mutex<VecDeque<SentMessage>>,
    sent_total: AtomicU64,
    responder: Mutex<Option<Arc<Responder>>>,
    open_failure: Mutex<Option<String>>,
    rx_queue: Mutex<mpsc::Sender<(u32, Bytes)>>,
    ring_dumps: AtomicUsize,
}

impl LoopbackTransport {
    /// Create a link with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(LoopbackConfig::default())
    }

    /// Create a link with explicit configuration.
    pub fn with_config(config: LoopbackConfig) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<(u32, Bytes)>();
        let inner = Arc::new(Inner {
            name: config.name,
            remote_order: config.remote_order,
            status: AtomicU32::new(config.status as u32),
            next_addr: AtomicU32::new(config.first_addr),
            channels: RwLock::new(HashMap::new()),
            max_message: config.max_message,
            sent_capacity: config.sent_capacity,
            sent: Mutex::new(VecDeque::new()),
            sent_total: AtomicU64::new(0),
            responder: Mutex::new(None),
            open_failure: Mutex::new(None),
            rx_queue: Mutex::new(tx),
            ring_dumps: AtomicUsize::new(0),
        });

        let weak = Arc::downgrade(&inner);
        std::thread::Builder::new()
            .name(format!("loopback-rx-{}", inner.name))
            .spawn(move || rx_loop(weak, rx))?;

        info!(name = %inner.name, order = %inner.remote_order, "loopback link up");
        Ok(Self { inner })
    }

    /// Change the reported remote status.
    pub fn set_status(&self, status: RemoteStatus) {
        debug!(name = %self.inner.name, %status, "remote status changed");
        self.inner.status.store(status as u32, Ordering::SeqCst);
    }

    /// Install a responder that answers outbound messages.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(u32, &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        *lock(&self.inner.responder) = Some(Arc::new(responder));
    }

    /// Remove the responder; outbound messages are only recorded.
    pub fn clear_responder(&self) {
        *lock(&self.inner.responder) = None;
    }

    /// Make the next `open` call fail with `reason`.
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        *lock(&self.inner.open_failure) = Some(reason.into());
    }

    /// Run the receive path for `addr` on the calling thread.
    pub fn deliver(&self, addr: u32, data: &[u8]) -> Result<()> {
        self.inner.deliver(addr, data)
    }

    /// Queue a message for `addr` on the receive thread.
    pub fn post(&self, addr: u32, data: impl Into<Bytes>) -> Result<()> {
        self.inner.post(addr, data.into())
    }

    /// Recorded outbound messages, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.inner.sent).iter().cloned().collect()
    }

    /// Drain and return the recorded outbound messages.
    pub fn take_sent(&self) -> Vec<SentMessage> {
        lock(&self.inner.sent).drain(..).collect()
    }

    /// Messages accepted by the link since it came up, recorded or not.
    pub fn sent_total(&self) -> u64 {
        self.inner.sent_total.load(Ordering::SeqCst)
    }

    /// Addresses of the channels currently open.
    pub fn open_channels(&self) -> Vec<u32> {
        let channels = self
            .inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut addrs: Vec<u32> = channels.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    /// How many times ring buffer diagnostics were requested.
    pub fn ring_buffer_dumps(&self) -> usize {
        self.inner.ring_dumps.load(Ordering::SeqCst)
    }
}

impl Transport for LoopbackTransport {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn remote_order(&self) -> ByteOrder {
        self.inner.remote_order
    }

    fn remote_status(&self) -> RemoteStatus {
        RemoteStatus::from_raw(self.inner.status.load(Ordering::SeqCst))
            .unwrap_or(RemoteStatus::Disabled)
    }

    fn open(&self, name: &str, rx: Arc<dyn RxCallback>) -> Result<Box<dyn Channel>> {
        if let Some(reason) = lock(&self.inner.open_failure).take() {
            return Err(TransportError::Open {
                name: name.to_string(),
                reason,
            });
        }

        let addr = self.inner.next_addr.fetch_add(1, Ordering::Relaxed);
        self.inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr, rx);
        debug!(link = %self.inner.name, name, addr, "channel opened");

        Ok(Box::new(LoopbackChannel {
            addr,
            inner: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }

    fn dump_ring_buffer_info(&self) {
        self.inner.ring_dumps.fetch_add(1, Ordering::SeqCst);
        let sent = self.sent_total();
        warn!(
            link = %self.inner.name,
            status = %self.remote_status(),
            channels = ?self.open_channels(),
            sent,
            "ring buffer info"
        );
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("name", &self.inner.name)
            .field("remote_order", &self.inner.remote_order)
            .field("status", &self.remote_status())
            .finish()
    }
}

impl Inner {
    fn deliver(&self, addr: u32, data: &[u8]) -> Result<()> {
        // Held shared for the whole callback so `close` waits for it.
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        match channels.get(&addr) {
            Some(rx) => rx.on_receive(data, addr),
            None => Err(TransportError::Closed(addr)),
        }
    }

    fn post(&self, addr: u32, data: Bytes) -> Result<()> {
        lock(&self.rx_queue)
            .send((addr, data))
            .map_err(|_| TransportError::LinkDown(format!("{} receive thread gone", self.name)))
    }

    fn send(&self, addr: u32, data: &[u8]) -> Result<()> {
        match RemoteStatus::from_raw(self.status.load(Ordering::SeqCst)) {
            Some(RemoteStatus::Disconnected) | Some(RemoteStatus::Disabled) | None => {
                return Err(TransportError::LinkDown(format!(
                    "cannot send on {}, remote cpu init failed",
                    self.name
                )));
            }
            _ => {}
        }

        if data.len() > self.max_message {
            return Err(TransportError::Send {
                addr,
                reason: format!("{} bytes exceeds ring buffer limit {}", data.len(), self.max_message),
            });
        }

        let data = Bytes::copy_from_slice(data);
        self.sent_total.fetch_add(1, Ordering::SeqCst);
        if self.sent_capacity > 0 {
            let mut sent = lock(&self.sent);
            if sent.len() == self.sent_capacity {
                sent.pop_front();
            }
            sent.push_back(SentMessage {
                addr,
                data: data.clone(),
            });
        }

        let responder = lock(&self.responder).clone();
        if let Some(responder) = responder {
            if let Some(reply) = responder(addr, &data) {
                self.post(addr, Bytes::from(reply))?;
            }
        }
        Ok(())
    }
}

struct LoopbackChannel {
    addr: u32,
    inner: Arc<Inner>,
    closed: AtomicBool,
}

impl Channel for LoopbackChannel {
    fn addr(&self) -> u32 {
        self.addr
    }

    fn send(&self, data: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed(self.addr));
        }
        self.inner.send(self.addr, data)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.addr);
        debug!(link = %self.inner.name, addr = self.addr, "channel closed");
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn rx_loop(inner: Weak<Inner>, rx: mpsc::Receiver<(u32, Bytes)>) {
    while let Ok((addr, data)) = rx.recv() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if let Err(err) = inner.deliver(addr, &data) {
            debug!(addr, error = %err, "dropping message for closed channel");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::Sender;
    use std::time::Duration;

    use super::*;

    struct Forward(Mutex<Sender<(Vec<u8>, u32)>>);

    impl RxCallback for Forward {
        fn on_receive(&self, data: &[u8], src: u32) -> Result<()> {
            let _ = self.0.lock().unwrap().send((data.to_vec(), src));
            Ok(())
        }
    }

    fn forward() -> (Arc<dyn RxCallback>, mpsc::Receiver<(Vec<u8>, u32)>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Forward(Mutex::new(tx))), rx)
    }

    #[test]
    fn open_allocates_increasing_addresses() {
        let link = LoopbackTransport::new().unwrap();
        let (cb, _rx) = forward();

        let a = link.open("a", Arc::clone(&cb)).unwrap();
        let b = link.open("b", cb).unwrap();

        assert_eq!(a.addr(), 1024);
        assert_eq!(b.addr(), 1025);
        assert_eq!(link.open_channels(), vec![1024, 1025]);
    }

    #[test]
    fn open_failure_is_reported_once() {
        let link = LoopbackTransport::new().unwrap();
        let (cb, _rx) = forward();
        link.fail_next_open("no free endpoints");

        let err = link.open("audio", Arc::clone(&cb)).err().unwrap();
        assert!(matches!(err, TransportError::Open { ref reason, .. } if reason == "no free endpoints"));
        assert!(link.open("audio", cb).is_ok());
    }

    #[test]
    fn send_is_recorded_and_answered_through_rx_thread() {
        let link = LoopbackTransport::new().unwrap();
        link.set_responder(|_, data| Some(data.iter().rev().copied().collect()));
        let (cb, rx) = forward();
        let channel = link.open("audio", cb).unwrap();

        channel.send(&[1, 2, 3, 4]).unwrap();

        let (reply, src) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(reply, vec![4, 3, 2, 1]);
        assert_eq!(src, channel.addr());
        assert_eq!(
            link.sent(),
            vec![SentMessage {
                addr: channel.addr(),
                data: Bytes::from_static(&[1, 2, 3, 4]),
            }]
        );
    }

    #[test]
    fn oversized_send_is_refused() {
        let link = LoopbackTransport::new().unwrap();
        let (cb, _rx) = forward();
        let channel = link.open("audio", cb).unwrap();

        let err = channel.send(&[0; 497]).unwrap_err();
        assert!(matches!(err, TransportError::Send { addr, .. } if addr == channel.addr()));
        assert!(channel.send(&[0; 496]).is_ok());
        assert_eq!(link.sent_total(), 1);
    }

    #[test]
    fn sent_log_keeps_only_newest_messages() {
        let link = LoopbackTransport::with_config(LoopbackConfig {
            sent_capacity: 2,
            ..LoopbackConfig::default()
        })
        .unwrap();
        let (cb, _rx) = forward();
        let channel = link.open("audio", cb).unwrap();

        for byte in 1..=5u8 {
            channel.send(&[byte; 4]).unwrap();
        }

        let kept: Vec<u8> = link.sent().iter().map(|m| m.data[0]).collect();
        assert_eq!(kept, vec![4, 5]);
        assert_eq!(link.sent_total(), 5);
    }

    #[test]
    fn recording_can_be_disabled() {
        let link = LoopbackTransport::with_config(LoopbackConfig {
            sent_capacity: 0,
            ..LoopbackConfig::default()
        })
        .unwrap();
        let (cb, _rx) = forward();
        let channel = link.open("audio", cb).unwrap();

        channel.send(&[1; 4]).unwrap();

        assert!(link.sent().is_empty());
        assert_eq!(link.sent_total(), 1);
    }

    #[test]
    fn send_fails_when_remote_is_down() {
        let link = LoopbackTransport::new().unwrap();
        let (cb, _rx) = forward();
        let channel = link.open("video", cb).unwrap();

        link.set_status(RemoteStatus::Disconnected);
        let err = channel.send(&[0; 4]).unwrap_err();
        assert!(matches!(err, TransportError::LinkDown(_)));
        assert!(link.sent().is_empty());
    }

    #[test]
    fn closed_channel_rejects_send_and_delivery() {
        let link = LoopbackTransport::new().unwrap();
        let (cb, _rx) = forward();
        let channel = link.open("hifi", cb).unwrap();
        let addr = channel.addr();

        channel.close();

        assert!(matches!(channel.send(&[0; 4]), Err(TransportError::Closed(a)) if a == addr));
        assert!(matches!(link.deliver(addr, &[0; 4]), Err(TransportError::Closed(_))));
        assert!(link.open_channels().is_empty());
    }

    #[test]
    fn deliver_runs_on_calling_thread() {
        let link = LoopbackTransport::new().unwrap();
        let (cb, rx) = forward();
        let channel = link.open("kr4", cb).unwrap();

        link.deliver(channel.addr(), b"abcd").unwrap();

        let (data, _) = rx.try_recv().unwrap();
        assert_eq!(data, b"abcd");
    }

    #[test]
    fn dump_counts_requests() {
        let link = LoopbackTransport::new().unwrap();
        link.dump_ring_buffer_info();
        link.dump_ring_buffer_info();
        assert_eq!(link.ring_buffer_dumps(), 2);
    }

    #[test]
    fn remote_status_raw_mapping() {
        assert_eq!(RemoteStatus::from_raw(0), Some(RemoteStatus::Uninitialized));
        assert_eq!(RemoteStatus::from_raw(3), Some(RemoteStatus::Disabled));
        assert_eq!(RemoteStatus::from_raw(7), None);
    }
}
