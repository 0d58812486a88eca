use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use krpc_frame::RpcFrame;
use tracing::debug;

/// Consumes inbound frames for one endpoint.
///
/// Called from the endpoint's dispatch worker, one frame at a time and in
/// arrival order. Never called from the transport's receive context.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, ctx: &DispatchContext<'_>, frame: &RpcFrame);
}

impl<T: FrameHandler + ?Sized> FrameHandler for Arc<T> {
    fn on_frame(&self, ctx: &DispatchContext<'_>, frame: &RpcFrame) {
        (**self).on_frame(ctx, frame)
    }
}

/// What a handler can see of the endpoint it runs on.
pub struct DispatchContext<'a> {
    pub(crate) id: u32,
    pub(crate) name: &'a str,
    pub(crate) ack: &'a Completion,
}

impl DispatchContext<'_> {
    /// Endpoint id (transport address).
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Endpoint name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Wake the caller blocked in [`Endpoint::call`](crate::Endpoint::call)
    /// and hand it `reply`.
    pub fn complete(&self, reply: RpcFrame) {
        self.ack.complete(reply);
    }
}

/// Handler backed by a closure. See [`handler_fn`].
pub struct FnHandler<F>(F);

impl<F> FrameHandler for FnHandler<F>
where
    F: Fn(&DispatchContext<'_>, &RpcFrame) + Send + Sync,
{
    fn on_frame(&self, ctx: &DispatchContext<'_>, frame: &RpcFrame) {
        (self.0)(ctx, frame)
    }
}

/// Wrap a closure as a [`FrameHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&DispatchContext<'_>, &RpcFrame) + Send + Sync,
{
    FnHandler(f)
}

/// Completes the endpoint ack for every reply frame and ignores the rest.
///
/// This is all a notify-style consumer needs: it only ever sends requests
/// with [`Endpoint::call`](crate::Endpoint::call) and reads the reply value.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplyAck;

impl FrameHandler for ReplyAck {
    fn on_frame(&self, ctx: &DispatchContext<'_>, frame: &RpcFrame) {
        if frame.header.is_reply() {
            ctx.complete(frame.clone());
        } else {
            debug!(
                endpoint = ctx.name(),
                program = frame.header.program_id,
                "ignoring non-reply frame"
            );
        }
    }
}

/// One-shot reply slot shared by a caller and the dispatch worker.
#[derive(Default)]
pub(crate) struct Completion {
    slot: Mutex<Option<RpcFrame>>,
    done: Condvar,
}

impl Completion {
    /// Forget any reply that arrived without a waiter.
    pub(crate) fn reinit(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn complete(&self, reply: RpcFrame) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(reply);
        self.done.notify_all();
    }

    /// Wait up to `timeout` for a reply, consuming it.
    ///
    /// A timeout too large to express as a deadline waits without one.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<RpcFrame> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(reply) = slot.take() {
                return Some(reply);
            }
            let Some(deadline) = deadline else {
                slot = self.done.wait(slot).unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .done
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
