use std::fmt;

/// Outcome code of an operation, shared by transports and remote services
///
/// Modelled after the canonical gRPC status codes. A [`Message`](super::message::Message)
/// carries one of these as its communication status to report whether the remote
/// operation succeeded, independent of whether the message itself was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Not an error
    Ok,
    /// Operation was cancelled, typically by the caller
    Cancelled,
    /// Unknown error
    Unknown,
    /// Client specified an invalid argument
    InvalidArgument,
    /// Deadline expired before the operation could complete
    DeadlineExceeded,
    /// Requested entity was not found
    NotFound,
    /// Entity that a client attempted to create already exists
    AlreadyExists,
    /// Caller does not have permission to execute the operation
    PermissionDenied,
    /// Some resource has been exhausted
    ResourceExhausted,
    /// System is not in a state required for the operation
    FailedPrecondition,
    /// Operation was aborted
    Aborted,
    /// Operation was attempted past the valid range
    OutOfRange,
    /// Operation is not implemented or supported
    Unimplemented,
    /// Internal error
    Internal,
    /// Service is currently unavailable
    Unavailable,
    /// Unrecoverable data loss or corruption
    DataLoss,
    /// Request does not have valid authentication credentials
    Unauthenticated,
}

impl Code {
    /// Whether this code indicates success
    pub fn is_ok(&self) -> bool {
        *self == Code::Ok
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Result of a transport level operation
///
/// Returned by [`Transport`](super::transport::Transport) implementations when registering
/// listeners or sending messages fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Creates a new status from a code and a human readable message
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Status code
    pub fn code(&self) -> Code {
        self.code
    }

    /// Human readable description
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for Status {}
