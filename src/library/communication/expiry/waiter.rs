use crate::library::communication::transport::ListenHandle;
use crate::library::communication::RpcError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of the client owning a [`PendingWaiter`]
///
/// Only used to scope bulk cancellation, never for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocates the next unused identity
    pub fn next() -> Self {
        Self(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}

/// Notification invoked when a waiter is removed without a response
pub type ExpireCallback = Box<dyn FnOnce(RpcError) + Send>;

/// Outstanding request awaiting either its response or its deadline
pub struct PendingWaiter {
    deadline: Instant,
    listener: ListenHandle,
    on_expire: ExpireCallback,
    owner: OwnerId,
}

impl PendingWaiter {
    /// Creates a new waiter which expires at `deadline`
    pub fn new(
        deadline: Instant,
        listener: ListenHandle,
        on_expire: impl FnOnce(RpcError) + Send + 'static,
        owner: OwnerId,
    ) -> Self {
        Self {
            deadline,
            listener,
            on_expire: Box::new(on_expire),
            owner,
        }
    }

    /// Point in time after which the waiter is expired
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Client which created the waiter
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Unregisters the response listener and reports `reason` to the notification
    pub fn expire(self, reason: RpcError) {
        let PendingWaiter {
            listener,
            on_expire,
            ..
        } = self;

        listener.release();
        on_expire(reason);
    }
}

impl fmt::Debug for PendingWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWaiter")
            .field("deadline", &self.deadline)
            .field("listener", &self.listener)
            .field("owner", &self.owner)
            .finish()
    }
}
