use super::{Attributes, Message, MessageType, Payload, PayloadFormat, Priority, Uri};
use crate::library::communication::{BuildError, Code};
use std::time::Duration;
use uuid::Uuid;

/// Reusable template for [`Messages`](Message)
///
/// Every call to [`build`](MessageBuilder::build) or [`build_with_payload`](MessageBuilder::build_with_payload)
/// yields a message with a freshly generated identifier while all other attributes are taken from the template.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    kind: MessageType,
    source: Uri,
    sink: Option<Uri>,
    priority: Priority,
    ttl: Option<Duration>,
    permission_level: Option<u32>,
    commstatus: Option<Code>,
    reqid: Option<Uuid>,
    token: Option<String>,
    payload_format: PayloadFormat,
}

impl MessageBuilder {
    /// Template for requests to `method`, replies are expected at `source`
    ///
    /// Requests require a priority of at least [`Priority::CS4`] and a time-to-live which is
    /// non-zero and representable as 32 bits of milliseconds.
    pub fn request(
        method: Uri,
        source: Uri,
        priority: Priority,
        ttl: Duration,
    ) -> Result<Self, BuildError> {
        if priority < Priority::CS4 {
            return Err(BuildError::PriorityTooLow(priority));
        }

        let millis = ttl.as_millis();
        if millis == 0 || millis > u128::from(u32::MAX) {
            return Err(BuildError::InvalidTtl(millis));
        }

        Ok(Self {
            kind: MessageType::Request,
            source,
            sink: Some(method),
            priority,
            ttl: Some(ttl),
            permission_level: None,
            commstatus: None,
            reqid: None,
            token: None,
            payload_format: PayloadFormat::Unspecified,
        })
    }

    /// Template for a reply to `request`
    ///
    /// Source and sink are swapped, priority and time-to-live are inherited and the
    /// request identifier is used as correlation identifier.
    pub fn response_to(request: &Message) -> Self {
        let attributes = request.attributes();
        let source = attributes
            .sink
            .clone()
            .unwrap_or_else(|| attributes.source.clone());

        Self {
            kind: MessageType::Response,
            source,
            sink: Some(attributes.source.clone()),
            priority: attributes.priority,
            ttl: attributes.ttl,
            permission_level: None,
            commstatus: None,
            reqid: Some(attributes.id),
            token: None,
            payload_format: PayloadFormat::Unspecified,
        }
    }

    /// Sets the payload format used when no explicit [`Payload`] is provided
    pub fn with_payload_format(&mut self, format: PayloadFormat) -> &mut Self {
        self.payload_format = format;
        self
    }

    /// Sets the permission level claimed by requests
    pub fn with_permission_level(&mut self, level: u32) -> &mut Self {
        self.permission_level = Some(level);
        self
    }

    /// Sets the access token passed along with requests
    pub fn with_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the communication status reported by responses
    pub fn with_commstatus(&mut self, code: Code) -> &mut Self {
        self.commstatus = Some(code);
        self
    }

    /// Time-to-live stamped onto built messages
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Builds a message without payload
    pub fn build(&self) -> Message {
        Message::new(self.attributes(self.payload_format), None)
    }

    /// Builds a message carrying `payload`, its format takes precedence over the template
    pub fn build_with_payload(&self, payload: Payload) -> Message {
        let (data, format) = payload.into_parts();
        Message::new(self.attributes(format), Some(data))
    }

    fn attributes(&self, payload_format: PayloadFormat) -> Attributes {
        Attributes {
            id: Uuid::new_v4(),
            kind: self.kind,
            source: self.source.clone(),
            sink: self.sink.clone(),
            priority: self.priority,
            ttl: self.ttl,
            permission_level: self.permission_level,
            commstatus: self.commstatus,
            reqid: self.reqid,
            token: self.token.clone(),
            payload_format,
        }
    }
}
