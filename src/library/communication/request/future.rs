use crate::library::communication::{RpcError, RpcResult};
use futures::channel::oneshot;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Consumer end of a request issued without a continuation
///
/// Resolves exactly once with the outcome of the request. It can be `.await`ed, checked without blocking
/// using [`try_result`](ResponseFuture::try_result) or blocked on from synchronous code with
/// [`wait`](ResponseFuture::wait). All of them consume the future once the outcome is handed out, so it
/// can not be observed twice. If the producing side vanishes without a result, the future resolves
/// with [`RpcError::Discarded`].
#[must_use = "the outcome of the request is lost unless the future is awaited or polled"]
#[derive(Debug)]
pub struct ResponseFuture {
    receiver: oneshot::Receiver<RpcResult>,
}

impl ResponseFuture {
    /// Creates a connected pair of producer and consumer
    pub(crate) fn channel() -> (impl FnOnce(RpcResult) + Send + 'static, Self) {
        let (sender, receiver) = oneshot::channel();

        let producer = move |result: RpcResult| {
            // Nobody is interested anymore if the consumer is gone
            sender.send(result).ok();
        };

        (producer, Self { receiver })
    }

    /// Returns the outcome if it is available, without blocking
    ///
    /// Hands the future back if the request is still outstanding.
    pub fn try_result(mut self) -> Result<RpcResult, Self> {
        match self.receiver.try_recv() {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(self),
            Err(oneshot::Canceled) => Ok(Err(RpcError::Discarded)),
        }
    }

    /// Blocks the current thread until the outcome is available
    ///
    /// Must not be called from within an asynchronous task, use `.await` there instead.
    pub fn wait(self) -> RpcResult {
        futures::executor::block_on(self)
    }
}

impl Future for ResponseFuture {
    type Output = RpcResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver
            .poll_unpin(cx)
            .map(|result| result.unwrap_or(Err(RpcError::Discarded)))
    }
}
