use super::{DeadlineQueue, OwnerId, PendingWaiter, WaiterKey};
use crate::library::communication::RpcError;
use lazy_static::lazy_static;
use log::{debug, error, trace};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

const WORKER_THREAD_NAME: &str = "rpc-expire";

lazy_static! {
    static ref SHARED_WORKER: Mutex<Weak<ExpireWorker>> = Mutex::new(Weak::new());
}

struct Shared {
    queue: Mutex<DeadlineQueue>,
    wake: Condvar,
    stop: AtomicBool,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, DeadlineQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        debug!("Expiration worker started");

        let mut queue = self.queue();
        while !self.stop.load(Ordering::SeqCst) {
            let now = Instant::now();

            if let Some(waiter) = queue.pop_expired(now) {
                drop(queue);
                notify(waiter, RpcError::DeadlineExceeded);
                queue = self.queue();
                continue;
            }

            // Whatever the reason for waking up, the loop re-reads the true earliest deadline
            queue = match queue.next_deadline() {
                Some(deadline) => self
                    .wake
                    .wait_timeout(queue, deadline.saturating_duration_since(now))
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|e| e.into_inner().0),
                None => self
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }

        debug!("Expiration worker stopped");
    }
}

fn notify(waiter: PendingWaiter, reason: RpcError) {
    trace!("Expiring waiter of {}: {}", waiter.owner(), reason);

    if catch_unwind(AssertUnwindSafe(|| waiter.expire(reason))).is_err() {
        error!("Expiry notification panicked, continuing with next waiter");
    }
}

/// Background thread resolving [`PendingWaiters`](PendingWaiter) whose deadline passed
///
/// Usually there is exactly one worker per process, obtained through [`ExpireWorker::shared`].
/// It is started on first use and stops once the last reference to it is dropped. Tests or
/// embedders wanting isolation can run their own instance using [`ExpireWorker::spawn`].
///
/// When the worker stops, every waiter still in its queue is resolved with [`RpcError::ShuttingDown`].
pub struct ExpireWorker {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ExpireWorker {
    /// Starts a new, independent worker thread
    pub fn spawn() -> io::Result<Arc<Self>> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(DeadlineQueue::new()),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || thread_shared.run())?;

        Ok(Arc::new(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        }))
    }

    /// Process-wide worker, started on demand
    ///
    /// Returns the running instance if there is one. Otherwise a new worker is started
    /// which lives for as long as anybody holds on to it.
    ///
    /// A worker which has been [stopped](ExpireWorker::stop) is replaced, even if it is still
    /// referenced by older clients.
    pub fn shared() -> io::Result<Arc<Self>> {
        Self::shared_from(&SHARED_WORKER)
    }

    fn shared_from(slot: &Mutex<Weak<ExpireWorker>>) -> io::Result<Arc<Self>> {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        match slot.upgrade() {
            Some(worker) if !worker.is_stopped() => return Ok(worker),
            Some(_) => debug!("Shared expiration worker has been stopped, replacing it"),
            None => {}
        }

        let worker = Self::spawn()?;
        *slot = Arc::downgrade(&worker);
        debug!("Started shared expiration worker");

        Ok(worker)
    }

    /// Whether [`stop`](ExpireWorker::stop) has been called
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// Hands a waiter over to the worker
    ///
    /// Returns `None` if the worker has already been stopped, in which case the waiter
    /// is resolved with [`RpcError::ShuttingDown`] right away.
    pub fn enqueue(&self, waiter: PendingWaiter) -> Option<WaiterKey> {
        let mut queue = self.shared.queue();

        if self.shared.stop.load(Ordering::SeqCst) {
            drop(queue);
            waiter.expire(RpcError::ShuttingDown);
            return None;
        }

        let key = queue.insert(waiter);
        self.shared.wake.notify_one();

        Some(key)
    }

    /// Removes a waiter without notifying it, releasing its listener
    ///
    /// Used once a response has been received. Does nothing if the waiter is already gone.
    pub fn retire(&self, key: WaiterKey) {
        let waiter = {
            let mut queue = self.shared.queue();
            let waiter = queue.remove(key);
            self.shared.wake.notify_one();
            waiter
        };

        if waiter.is_some() {
            trace!("Retired waiter {:?}", key);
        }
    }

    /// Removes all waiters of `owner` and resolves them with [`RpcError::Discarded`]
    pub fn scrub(&self, owner: OwnerId) {
        let scrubbed = {
            let mut queue = self.shared.queue();
            let scrubbed = queue.remove_all(owner);
            self.shared.wake.notify_one();
            scrubbed
        };

        if !scrubbed.is_empty() {
            debug!("Discarding {} pending request(s) of {}", scrubbed.len(), owner);
        }

        for waiter in scrubbed {
            waiter.expire(RpcError::Discarded);
        }
    }

    /// Number of waiters currently tracked
    pub fn pending(&self) -> usize {
        self.shared.queue().len()
    }

    /// Stops the worker thread and resolves all remaining waiters with [`RpcError::ShuttingDown`]
    ///
    /// Waiters enqueued afterwards are rejected. Calling this more than once has no further effect.
    pub fn stop(&self) {
        {
            let _queue = self.shared.queue();
            self.shared.stop.store(true, Ordering::SeqCst);
            self.shared.wake.notify_all();
        }

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(thread) = thread {
            // A notification running on the worker may drop the last reference to it
            if thread.thread().id() == thread::current().id() {
                debug!("Expiration worker stopped from within, not joining");
            } else if thread.join().is_err() {
                error!("Expiration worker thread panicked");
            }
        }

        let stragglers = self.shared.queue().drain();
        for waiter in stragglers {
            waiter.expire(RpcError::ShuttingDown);
        }
    }
}

impl Drop for ExpireWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
