use crate::library::communication::{RpcError, RpcResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Continuation receiving the outcome of a request
pub type Callback = Box<dyn FnOnce(RpcResult) + Send>;

/// One-shot gate in front of a [`Callback`]
///
/// Several independent paths may try to resolve the same request: the response listener, a failed
/// transport operation, the expiration worker, or a client being discarded. Only the first one to call
/// [`deliver`](CompletionGuard::deliver) reaches the continuation, all later attempts are absorbed.
///
/// A guard which is dropped without ever being claimed resolves its continuation with
/// [`RpcError::Discarded`] so callers are never left waiting.
pub struct CompletionGuard {
    claimed: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

impl CompletionGuard {
    /// Wraps a continuation
    pub fn new(callback: impl FnOnce(RpcResult) + Send + 'static) -> Self {
        Self {
            claimed: AtomicBool::new(false),
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Passes `result` on to the continuation unless another result got there first
    ///
    /// Returns whether this call won.
    pub fn deliver(&self, result: RpcResult) -> bool {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(callback) = callback {
            callback(result);
        }

        true
    }

    /// Whether a result has been delivered
    pub fn is_complete(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if *self.claimed.get_mut() {
            return;
        }

        let callback = self
            .callback
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(callback) = callback {
            callback(Err(RpcError::Discarded));
        }
    }
}

impl fmt::Debug for CompletionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGuard")
            .field("complete", &self.is_complete())
            .finish()
    }
}
