use serde::Serialize;

/// Encoding of the payload carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadFormat {
    /// No format specified
    Unspecified,
    /// Protobuf encoded message
    Protobuf,
    /// Protobuf message wrapped in `google.protobuf.Any`
    ProtobufWrappedInAny,
    /// JSON document
    Json,
    /// SOME/IP encoded data
    SomeIp,
    /// SOME/IP encoded data with TLV
    SomeIpTlv,
    /// Opaque bytes
    Raw,
    /// UTF-8 text
    Text,
}

impl Default for PayloadFormat {
    fn default() -> Self {
        PayloadFormat::Unspecified
    }
}

/// Opaque data attached to a message, tagged with its encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    data: Vec<u8>,
    format: PayloadFormat,
}

impl Payload {
    /// Wraps already encoded data
    pub fn new(data: impl Into<Vec<u8>>, format: PayloadFormat) -> Self {
        Self {
            data: data.into(),
            format,
        }
    }

    /// Encodes a value using [`serde_json::to_vec`]
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_vec(value)?, PayloadFormat::Json))
    }

    /// Wraps a string as [`PayloadFormat::Text`]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text.into().into_bytes(), PayloadFormat::Text)
    }

    /// Encoded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encoding of the bytes
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Splits the payload into its raw parts
    pub fn into_parts(self) -> (Vec<u8>, PayloadFormat) {
        (self.data, self.format)
    }
}
