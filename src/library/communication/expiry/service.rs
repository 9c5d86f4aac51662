use super::{ExpireWorker, OwnerId, PendingWaiter, WaiterKey};
use crate::library::communication::transport::ListenHandle;
use crate::library::communication::RpcError;
use std::io;
use std::sync::Arc;
use std::time::Instant;

/// Per-client handle to an [`ExpireWorker`]
///
/// All waiters enqueued through a handle are tagged with its [`OwnerId`]. Dropping the handle
/// resolves those which are still pending with [`RpcError::Discarded`] while waiters of other
/// handles sharing the same worker stay untouched.
pub struct ExpireService {
    owner: OwnerId,
    worker: Arc<ExpireWorker>,
}

impl ExpireService {
    /// Creates a handle with a fresh identity for the given worker
    pub fn new(worker: Arc<ExpireWorker>) -> Self {
        Self {
            owner: OwnerId::next(),
            worker,
        }
    }

    /// Creates a handle for the process-wide worker, starting it if required
    pub fn shared() -> io::Result<Self> {
        Ok(Self::new(ExpireWorker::shared()?))
    }

    /// Identity tagged onto all waiters of this handle
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Worker serving this handle
    pub fn worker(&self) -> &Arc<ExpireWorker> {
        &self.worker
    }

    /// Arms a deadline for a request whose response is awaited by `listener`
    ///
    /// `on_expire` is invoked with the reason if the waiter is removed without the response
    /// having arrived. See [`ExpireWorker::enqueue`] for when `None` is returned.
    pub fn enqueue(
        &self,
        deadline: Instant,
        listener: ListenHandle,
        on_expire: impl FnOnce(RpcError) + Send + 'static,
    ) -> Option<WaiterKey> {
        self.worker
            .enqueue(PendingWaiter::new(deadline, listener, on_expire, self.owner))
    }

    /// Removes a waiter whose response arrived, see [`ExpireWorker::retire`]
    pub fn retire(&self, key: WaiterKey) {
        self.worker.retire(key);
    }
}

impl Drop for ExpireService {
    fn drop(&mut self) {
        self.worker.scrub(self.owner);
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn discard_own_waiters_on_drop() {
        let worker = ExpireWorker::spawn().unwrap();
        let (tx, rx) = channel();

        let first = ExpireService::new(worker.clone());
        let second = ExpireService::new(worker.clone());
        assert_ne!(first.owner(), second.owner());

        let deadline = Instant::now() + Duration::from_secs(60);
        for (tag, service) in [(1, &first), (2, &second)] {
            let tx = tx.clone();
            service.enqueue(deadline, ListenHandle::new(|| {}), move |reason| {
                tx.send((tag, reason)).unwrap()
            });
        }

        drop(first);

        assert_eq!(rx.try_recv().unwrap(), (1, RpcError::Discarded));
        assert!(rx.try_recv().is_err());
        assert_eq!(worker.pending(), 1);

        drop(second);
        assert_eq!(rx.try_recv().unwrap(), (2, RpcError::Discarded));
    }
}
