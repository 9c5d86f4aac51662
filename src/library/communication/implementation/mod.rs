//! Implementations of the [`Transport`](super::transport::Transport) trait

pub mod loopback;
