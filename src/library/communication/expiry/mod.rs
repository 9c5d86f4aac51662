//! Deadline driven expiration of pending requests
//!
//! Every request which is still waiting for its response is represented by a [`PendingWaiter`].
//! It owns the [`ListenHandle`](super::transport::ListenHandle) of the response listener and a
//! notification which is called when the waiter is removed for any reason other than a response.
//!
//! Waiters of all clients in a process are kept in a single [`DeadlineQueue`] which is served by one
//! background [`ExpireWorker`] thread. The worker sleeps until the earliest deadline passes (or it is
//! woken up by a modification of the queue) and then resolves the waiter with
//! [`RpcError::DeadlineExceeded`](super::RpcError::DeadlineExceeded).
//!
//! Clients interact with the worker through an [`ExpireService`] handle. Each handle carries a unique
//! [`OwnerId`] and removes all waiters tagged with it when dropped, leaving those of other clients
//! untouched.
//!
//! Notifications are never invoked while the queue is locked.

mod queue;
mod service;
mod waiter;
mod worker;

pub use queue::*;
pub use service::*;
pub use waiter::*;
pub use worker::*;
