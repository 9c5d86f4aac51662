use super::message::Message;
use super::{Code, Status};
use thiserror::Error;

/// Terminal outcome of a request that did not yield a successful response
///
/// Every request resolves with either the response [`Message`] or exactly one of these.
/// None of them are retried by this crate, the caller decides what to do next.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// Transport was unable to register the response listener, nothing has been sent
    #[error("unable to register response listener")]
    RegistrationFailed(#[source] Status),
    /// Transport accepted the listener but was unable to transmit the request
    #[error("sending of request failed")]
    SendFailed(#[source] Status),
    /// Response arrived but reported a failed communication status
    #[error("remote responded with {0}")]
    Remote(Code),
    /// No matching response arrived before the time-to-live elapsed
    #[error("request expired before response received")]
    DeadlineExceeded,
    /// Client which issued the request was dropped while it was outstanding
    #[error("client for this request was discarded")]
    Discarded,
    /// Expiration worker shut down while the request was outstanding
    #[error("expiration worker shutting down")]
    ShuttingDown,
}

impl RpcError {
    /// Status code equivalent of this error
    pub fn code(&self) -> Code {
        match self {
            RpcError::RegistrationFailed(status) | RpcError::SendFailed(status) => status.code(),
            RpcError::Remote(code) => *code,
            RpcError::DeadlineExceeded => Code::DeadlineExceeded,
            RpcError::Discarded | RpcError::ShuttingDown => Code::Cancelled,
        }
    }
}

/// Outcome of a single request
pub type RpcResult = Result<Message, RpcError>;

/// Error type for building messages from a template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Requests must be sent with priority `CS4` or higher
    #[error("priority {0:?} is too low for a request")]
    PriorityTooLow(super::message::Priority),
    /// Time-to-live must be non-zero and fit into 32 bits of milliseconds
    #[error("time-to-live of {0}ms is not valid")]
    InvalidTtl(u128),
}

/// Error type for constructing an [`RpcClient`](super::request::RpcClient)
#[derive(Error, Debug)]
pub enum ClientError {
    /// Target address does not point to an RPC method
    #[error("{0} is not an rpc method address")]
    InvalidMethod(super::message::Uri),
    /// Request template could not be constructed
    #[error("invalid request template")]
    InvalidTemplate(#[from] BuildError),
    /// Shared expiration worker could not be started
    #[error("unable to start expiration worker")]
    WorkerUnavailable(#[source] std::io::Error),
}
