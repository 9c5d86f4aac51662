//! Invocation of remote methods
//!
//! An [`RpcClient`] sends requests to one method and correlates incoming responses with them. Each request
//! is resolved exactly once: by its response, by a failure of the transport, when its time-to-live elapses,
//! when the client is dropped or when the expiration worker shuts down. A [`CompletionGuard`] arbitrates
//! between these paths so only the first one reaches the caller.
//!
//! Outcomes are either passed to a continuation or obtained through a [`ResponseFuture`].

mod client;
mod completion;
mod future;

pub use client::*;
pub use completion::*;
pub use future::*;
