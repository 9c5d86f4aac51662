//! Structures to issue requests and receive responses over a publish/subscribe transport
//!
//! The underlying transport only knows two things: how to deliver a [`Message`](message::Message)
//! and how to invoke registered [`Listeners`](transport::Listener) for incoming messages. On top of
//! that, this module realises a request and response pattern:
//!
//! 1. A listener for the expected reply is registered with the [`Transport`](transport::Transport)
//! 2. The request is sent
//! 3. A deadline is armed with the [`expiry`] subsystem
//!
//! Whichever of "response arrived", "transport failed" or "deadline passed" happens first resolves
//! the request, exactly once. The remaining events are silently absorbed by a
//! [`CompletionGuard`](request::CompletionGuard). For more details consult the [`request`] module.
//!
//! All pending deadlines of a process are served by a single background [`ExpireWorker`](expiry::ExpireWorker)
//! which is shared by every [`RpcClient`](request::RpcClient). Each client only ever cancels its own
//! requests when it is dropped.

mod error;
mod status;

pub mod expiry;
pub mod implementation;
pub mod message;
pub mod request;
pub mod transport;

pub use error::{BuildError, ClientError, RpcError, RpcResult};
pub use status::{Code, Status};
