//! Message model consumed from the transport
//!
//! A [`Message`] consists of [`Attributes`] describing where it comes from, where it is headed and how it
//! relates to other messages, plus an optional [`Payload`]. Requests and responses are linked through
//! the correlation identifier: a response carries the [`id`](Attributes::id) of its request as its
//! [`reqid`](Attributes::reqid).
//!
//! Messages are normally not assembled by hand but through a [`MessageBuilder`] which acts as a reusable
//! template and assigns a fresh identifier to every message it builds.

mod builder;
mod payload;
mod uri;

pub use builder::*;
pub use payload::*;
pub use uri::*;

use super::Code;
use std::time::Duration;
use uuid::Uuid;

/// Class of service of a message, `CS0` being the lowest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// No priority assigned, treated like `CS0`
    Unspecified,
    /// Low priority, no bandwidth assurance
    CS0,
    /// Standard, undifferentiated application
    CS1,
    /// Operations, administration and management
    CS2,
    /// Multimedia streaming
    CS3,
    /// Real-time interactive, minimum for requests
    CS4,
    /// Signaling
    CS5,
    /// Network control
    CS6,
}

/// Role of a message within the communication patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Published to a topic
    Publish,
    /// Sent directly to a specific consumer
    Notification,
    /// Invocation of an RPC method
    Request,
    /// Reply to a previous request
    Response,
}

/// Metadata of a [`Message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    /// Unique identifier of this message
    pub id: Uuid,
    /// Role of the message
    pub kind: MessageType,
    /// Address of the sender
    pub source: Uri,
    /// Address of the intended receiver, if any
    pub sink: Option<Uri>,
    /// Class of service
    pub priority: Priority,
    /// Duration after which the message should be considered stale
    pub ttl: Option<Duration>,
    /// Permission level the sender claims for a request
    pub permission_level: Option<u32>,
    /// Outcome of the remote operation, only set on responses
    pub commstatus: Option<Code>,
    /// Identifier of the request this message replies to
    pub reqid: Option<Uuid>,
    /// Access token accompanying a request
    pub token: Option<String>,
    /// Encoding of the payload
    pub payload_format: PayloadFormat,
}

/// Unit of exchange on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    attributes: Attributes,
    payload: Option<Vec<u8>>,
}

impl Message {
    /// Assembles a message from its parts
    pub fn new(attributes: Attributes, payload: Option<Vec<u8>>) -> Self {
        Self {
            attributes,
            payload,
        }
    }

    /// Metadata of this message
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Raw payload, if any
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Shorthand for the message identifier
    pub fn id(&self) -> Uuid {
        self.attributes.id
    }

    /// Whether the remote operation behind this message succeeded
    ///
    /// Messages without a communication status are considered successful.
    pub fn is_success(&self) -> bool {
        self.attributes.commstatus.map_or(true, |code| code.is_ok())
    }

    /// Parses a [`PayloadFormat::Json`] payload using [`serde_json::from_slice`]
    pub fn parse_json<'a, T>(&'a self) -> Result<T, serde_json::Error>
    where
        T: serde::Deserialize<'a>,
    {
        serde_json::from_slice(self.payload.as_deref().unwrap_or_default())
    }
}
