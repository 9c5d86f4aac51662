//! This library crate contains the client side of a request-response pattern layered on top of
//! a listener based publish/subscribe transport.
//!
//! Everything lives in the [`library`] module. The [`communication`](library::communication) submodule
//! describes the transport and message contracts it consumes, the deadline driven expiration machinery
//! which resolves unanswered requests, and the [`RpcClient`](library::communication::request::RpcClient)
//! which ties both together.

#![deny(missing_docs)]

pub mod library;
